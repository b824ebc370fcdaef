//! Test fixtures and helpers.
//!
//! Deterministic authors, signed feed chains and threads, an in-memory link
//! between two nodes, and a polling helper for tests that wait on background
//! sync tasks.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use dagsync::engine::memory;
use dagsync::{Node, PeerTasks};
use dagsync_core::{AuthorId, Keypair, MsgBuilder, MsgKey, MsgValue};
use dagsync_store::{MemoryStore, Store};

/// Timestamp of the first message in generated feeds.
pub const BASE_TIMESTAMP: i64 = 1_700_000_000_000;

/// Deterministic keypair; distinct seeds give distinct authors.
pub fn author(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

/// Create multiple authors for multi-party tests.
pub fn authors(count: usize) -> Vec<Keypair> {
    (0..count).map(|i| author(i as u8 + 1)).collect()
}

/// A correctly linked feed of `len` messages, sequence 1 first.
///
/// Message `n` is stamped `BASE_TIMESTAMP + n` and has text `#n`.
pub fn feed_chain(keypair: &Keypair, len: u64) -> Vec<MsgValue> {
    let mut out: Vec<MsgValue> = Vec::with_capacity(len as usize);
    for seq in 1..=len {
        let mut builder = MsgBuilder::new(keypair.public_key(), seq)
            .timestamp(BASE_TIMESTAMP + seq as i64)
            .text(format!("#{}", seq));
        if let Some(prev) = out.last() {
            builder = builder.previous(prev.key());
        }
        out.push(builder.sign(keypair));
    }
    out
}

/// Messages of `chain` with sequence in `from..=to`.
pub fn feed_slice(chain: &[MsgValue], from: u64, to: u64) -> Vec<MsgValue> {
    chain
        .iter()
        .filter(|v| v.sequence >= from && v.sequence <= to)
        .cloned()
        .collect()
}

/// Builds a thread whose messages are correctly placed in their authors' feeds.
pub struct ThreadBuilder {
    root: MsgValue,
    heads: HashMap<AuthorId, (u64, MsgKey)>,
}

impl ThreadBuilder {
    /// Start a thread with a root authored at `timestamp`.
    pub fn new(keypair: &Keypair, timestamp: i64, text: &str) -> Self {
        let root = MsgBuilder::new(keypair.public_key(), 1)
            .timestamp(timestamp)
            .text(text)
            .sign(keypair);
        let mut heads = HashMap::new();
        heads.insert(keypair.public_key(), (1, root.key()));
        Self { root, heads }
    }

    pub fn root(&self) -> &MsgValue {
        &self.root
    }

    /// Reply `delay_ms` after the root, answering `branch` (the root if `None`).
    pub fn reply(
        &mut self,
        keypair: &Keypair,
        delay_ms: i64,
        branch: Option<MsgKey>,
        text: &str,
    ) -> MsgValue {
        let author = keypair.public_key();
        let (sequence, previous) = match self.heads.get(&author) {
            Some((seq, key)) => (seq + 1, Some(*key)),
            None => (1, None),
        };
        let mut builder = MsgBuilder::new(author, sequence)
            .timestamp(self.root.timestamp + delay_ms)
            .root(self.root.key())
            .branch(branch.unwrap_or_else(|| self.root.key()))
            .text(text);
        if let Some(prev) = previous {
            builder = builder.previous(prev);
        }
        let value = builder.sign(keypair);
        self.heads.insert(author, (sequence, value.key()));
        value
    }
}

/// A memory store preloaded with `values`.
pub async fn store_with(values: &[MsgValue]) -> MemoryStore {
    let store = MemoryStore::new();
    for value in values {
        // MemoryStore writes cannot fail.
        let _ = store.insert_msg(value).await;
    }
    store
}

/// Connect two nodes with in-memory pipes, one per sync plugin.
///
/// Returns `(a's tasks, b's tasks)`. Must be called from within a tokio runtime.
pub fn link<S1: Store, S2: Store>(a: &Node<S1>, b: &Node<S2>) -> (PeerTasks, PeerTasks) {
    let (feed_a, feed_b) = memory::pipe(16);
    let (thread_a, thread_b) = memory::pipe(16);
    (
        a.connect(b.id(), feed_a, thread_a),
        b.connect(a.id(), feed_b, thread_b),
    )
}

/// Poll `check` every 10ms for up to five seconds. Returns its last answer.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
