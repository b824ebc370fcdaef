//! Store trait: the host message store the sync engine reads and writes.
//!
//! The engine never touches storage directly. Adapters enumerate, fetch and
//! commit messages through this contract, so any backend that can append,
//! look up and delete by key, and list by author or thread will do.

use async_trait::async_trait;
use dagsync_core::{AuthorId, Msg, MsgKey, MsgValue, Range};

use crate::error::Result;

/// Result of inserting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// The message was new and has been stored.
    Inserted(MsgKey),
    /// The exact same message is already stored (idempotent, not an error).
    AlreadyExists,
    /// A different message already occupies this author's sequence number.
    Conflict {
        /// Key of the message already stored at this position.
        existing: MsgKey,
    },
}

/// Stored extent of one author's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSummary {
    /// Lowest stored sequence number.
    pub min_sequence: u64,
    /// Highest stored sequence number.
    pub max_sequence: u64,
    /// Number of stored messages. Less than the span when the feed has holes.
    pub count: u64,
    /// Key of the message at `max_sequence`.
    pub latest: MsgKey,
}

impl FeedSummary {
    pub fn range(&self) -> Range {
        Range::new(self.min_sequence, self.max_sequence)
    }
}

/// Async interface for message persistence.
///
/// Implementations must be safe under concurrent use: many sync sessions
/// read at once, and commits from independent peer connections may race.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────
    // Message Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a message, stamping it with the local receive time.
    async fn insert_msg(&self, value: &MsgValue) -> Result<InsertResult>;

    /// Look up a message by key.
    async fn get_msg(&self, key: &MsgKey) -> Result<Option<Msg>>;

    async fn has_msg(&self, key: &MsgKey) -> Result<bool> {
        Ok(self.get_msg(key).await?.is_some())
    }

    /// Remove a message. Returns whether it was present.
    async fn delete_msg(&self, key: &MsgKey) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Feed Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Messages by `author` with sequence inside `range`, ordered by sequence.
    async fn feed_msgs(&self, author: &AuthorId, range: Range) -> Result<Vec<Msg>>;

    /// Extent of the stored feed, or `None` when nothing is held.
    async fn feed_summary(&self, author: &AuthorId) -> Result<Option<FeedSummary>>;

    /// Remove every stored message by `author`. Returns how many were removed.
    async fn delete_feed(&self, author: &AuthorId) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Thread Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Replies whose thread root is `root`, in insertion order.
    ///
    /// The root message itself is not included; fetch it with [`get_msg`](Store::get_msg).
    async fn thread_msgs(&self, root: &MsgKey) -> Result<Vec<Msg>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Every stored message, in insertion order.
    async fn all_msgs(&self) -> Result<Vec<Msg>>;

    async fn msg_count(&self) -> Result<usize>;
}
