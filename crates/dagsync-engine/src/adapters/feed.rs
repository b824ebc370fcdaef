//! Feed adapter: replicate the newest window of one author's feed.
//!
//! The log id is the author's public key and the ordering key is the
//! sequence number. A peer only fetches messages newer than what it holds,
//! at most `limit` of them, and never keeps more than `limit` per author.
//!
//! Incoming batches are accepted only if they continue the stored feed
//! without a gap, or if they are large enough to replace it outright.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use dagsync_core::{
    validate_msg, validate_msg_structure, validate_successor, AuthorId, LogId, Msg, MsgKey,
    MsgValue, Range, ValidationError,
};
use dagsync_store::{InsertResult, Store, StoreError};

use crate::adapter::LogAdapter;
use crate::config::FeedSyncConfig;
use crate::error::{CommitError, Result};
use crate::policy::bounded_window_want;

const ESTIMATE_FLOOR: u64 = 5;
const ESTIMATE_CEILING: u64 = 1000;

pub struct FeedAdapter<S> {
    store: Arc<S>,
    config: FeedSyncConfig,
    /// Serializes commits so concurrent peers cannot interleave trims and inserts.
    commit_lock: Mutex<()>,
}

impl<S: Store> FeedAdapter<S> {
    pub fn new(store: Arc<S>, config: FeedSyncConfig) -> Self {
        Self {
            store,
            config,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &FeedSyncConfig {
        &self.config
    }

    fn limit(&self) -> u64 {
        self.config.limit.max(1)
    }

    fn check_batch(&self, batch: &[MsgValue]) -> std::result::Result<(), ValidationError> {
        for value in batch {
            if self.config.validate {
                validate_msg(value)?;
            } else {
                validate_msg_structure(value)?;
            }
        }
        for pair in batch.windows(2) {
            let prev_key = pair[0].key();
            if pair[1].sequence != pair[0].sequence + 1 || pair[1].previous != Some(prev_key) {
                return Err(ValidationError::InvalidPrevious {
                    seq: pair[1].sequence,
                    expected: Some(prev_key),
                    got: pair[1].previous,
                });
            }
        }
        Ok(())
    }

    /// Delete the `count` oldest stored messages of `author`.
    async fn drop_oldest(&self, author: &AuthorId, held: Range, count: u64) -> std::result::Result<(), StoreError> {
        if count == 0 {
            return Ok(());
        }
        let oldest = self.store.feed_msgs(author, held).await?;
        for msg in oldest.iter().take(count as usize) {
            self.store.delete_msg(&msg.key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Store> LogAdapter for FeedAdapter<S> {
    async fn have_range(&self, id: &LogId) -> std::result::Result<Range, StoreError> {
        let author = AuthorId::from(*id);
        Ok(self
            .store
            .feed_summary(&author)
            .await?
            .map(|summary| summary.range())
            .unwrap_or(Range::EMPTY))
    }

    fn want_range(&self, _id: &LogId, local_have: Range, remote_have: Range) -> Result<Range> {
        Ok(bounded_window_want(local_have, remote_have, self.limit()))
    }

    fn estimate_msg_count(&self, range: Range) -> usize {
        range.len().clamp(ESTIMATE_FLOOR, ESTIMATE_CEILING) as usize
    }

    async fn msgs_in(&self, id: &LogId, range: Range) -> std::result::Result<Vec<Msg>, StoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.store.feed_msgs(&AuthorId::from(*id), range).await
    }

    async fn get_msgs(&self, keys: &[MsgKey]) -> std::result::Result<Vec<Msg>, StoreError> {
        super::fetch_by_keys(self.store.as_ref(), keys).await
    }

    async fn commit(&self, id: &LogId, msgs: Vec<MsgValue>) -> std::result::Result<(), CommitError> {
        if msgs.is_empty() {
            return Ok(());
        }
        let author = AuthorId::from(*id);
        let received = msgs.len();
        let mut batch: Vec<MsgValue> = msgs.into_iter().filter(|v| v.author == author).collect();
        if batch.len() < received {
            tracing::warn!(
                feed = %author,
                dropped = received - batch.len(),
                "dropping messages by other authors"
            );
        }
        batch.sort_by_key(|v| v.sequence);
        batch.dedup_by_key(|v| v.sequence);
        let Some(first_seq) = batch.first().map(|v| v.sequence) else {
            return Ok(());
        };

        let _guard = self.commit_lock.lock().await;
        let summary = self.store.feed_summary(&author).await?;
        let last_seq = summary.map(|s| s.max_sequence).unwrap_or(0);
        let limit = self.limit();
        let continuation = first_seq == last_seq + 1;

        if !continuation && (batch.len() as u64) < limit {
            tracing::warn!(
                feed = %author,
                first = first_seq,
                last_held = last_seq,
                count = batch.len(),
                "rejecting batch: not a continuation and smaller than the window"
            );
            return Ok(());
        }

        let mut replace = !continuation;
        if batch.len() as u64 > limit {
            let excess = batch.len() - limit as usize;
            batch.drain(..excess);
            replace = true;
        }

        if let Err(e) = self.check_batch(&batch) {
            tracing::warn!(feed = %author, error = %e, "rejecting invalid batch");
            return Ok(());
        }

        match summary {
            Some(summary) if !replace => {
                if let Some(latest) = self.store.get_msg(&summary.latest).await? {
                    if let Err(e) = validate_successor(&latest, &batch[0]) {
                        tracing::warn!(feed = %author, error = %e, "rejecting batch that forks the feed");
                        return Ok(());
                    }
                }
                let excess = (summary.count + batch.len() as u64).saturating_sub(limit);
                self.drop_oldest(&author, summary.range(), excess).await?;
            }
            Some(_) => {
                let removed = self.store.delete_feed(&author).await?;
                tracing::debug!(feed = %author, removed, "replacing stored feed");
            }
            None => {}
        }

        for value in &batch {
            if let InsertResult::Conflict { .. } = self.store.insert_msg(value).await? {
                return Err(CommitError::Conflict {
                    author,
                    sequence: value.sequence,
                });
            }
        }
        tracing::debug!(feed = %author, count = batch.len(), replace, "committed feed batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_core::{Keypair, MsgBuilder};
    use dagsync_store::MemoryStore;

    fn chain(keypair: &Keypair, upto: u64) -> Vec<MsgValue> {
        let mut out: Vec<MsgValue> = Vec::new();
        for seq in 1..=upto {
            let mut builder = MsgBuilder::new(keypair.public_key(), seq)
                .timestamp(1_000 + seq as i64)
                .text(format!("post {}", seq));
            if let Some(prev) = out.last() {
                builder = builder.previous(prev.key());
            }
            out.push(builder.sign(keypair));
        }
        out
    }

    fn slice(values: &[MsgValue], from: u64, to: u64) -> Vec<MsgValue> {
        values[(from - 1) as usize..to as usize].to_vec()
    }

    async fn adapter_with(values: &[MsgValue], limit: u64) -> FeedAdapter<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for value in values {
            store.insert_msg(value).await.unwrap();
        }
        FeedAdapter::new(store, FeedSyncConfig::default().with_limit(limit))
    }

    async fn held(adapter: &FeedAdapter<MemoryStore>, keypair: &Keypair) -> Vec<u64> {
        adapter
            .store
            .feed_msgs(&keypair.public_key(), Range::new(0, u64::MAX))
            .await
            .unwrap()
            .iter()
            .map(|m| m.sequence())
            .collect()
    }

    #[tokio::test]
    async fn test_have_range() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 8);
        let adapter = adapter_with(&values[5..], 1000).await;
        let id = LogId::from(kp.public_key());
        assert_eq!(adapter.have_range(&id).await.unwrap(), Range::new(6, 8));

        let other = LogId::from(Keypair::from_seed(&[2; 32]).public_key());
        assert!(adapter.have_range(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_estimate_is_clamped() {
        let adapter = adapter_with(&[], 1000).await;
        assert_eq!(adapter.estimate_msg_count(Range::new(1, 2)), 5);
        assert_eq!(adapter.estimate_msg_count(Range::new(1, 50)), 50);
        assert_eq!(adapter.estimate_msg_count(Range::new(1, 90_000)), 1000);
    }

    #[tokio::test]
    async fn test_continuation_is_accepted() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 10);
        let adapter = adapter_with(&slice(&values, 6, 8), 1000).await;
        let id = LogId::from(kp.public_key());

        let mut batch = slice(&values, 9, 10);
        batch.reverse();
        adapter.commit(&id, batch).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![6, 7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_gap_is_rejected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 15);
        let adapter = adapter_with(&slice(&values, 6, 8), 1000).await;
        let id = LogId::from(kp.public_key());

        adapter.commit(&id, slice(&values, 12, 15)).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![6, 7, 8]);
    }

    #[tokio::test]
    async fn test_full_window_replaces_history() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 20);
        let adapter = adapter_with(&slice(&values, 1, 3), 5).await;
        let id = LogId::from(kp.public_key());

        adapter.commit(&id, slice(&values, 10, 20)).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![16, 17, 18, 19, 20]);
    }

    #[tokio::test]
    async fn test_continuation_trims_oldest() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 7);
        let adapter = adapter_with(&slice(&values, 1, 4), 5).await;
        let id = LogId::from(kp.public_key());

        adapter.commit(&id, slice(&values, 5, 7)).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_first_batch_into_empty_feed() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 3);
        let adapter = adapter_with(&[], 1000).await;
        let id = LogId::from(kp.public_key());

        adapter.commit(&id, values).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_tampered_batch_is_rejected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 10);
        let adapter = adapter_with(&slice(&values, 1, 8), 1000).await;
        let id = LogId::from(kp.public_key());

        let mut batch = slice(&values, 9, 10);
        batch[1].content.text = "edited".into();
        adapter.commit(&id, batch).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fork_is_rejected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 8);
        let adapter = adapter_with(&values, 1000).await;
        let id = LogId::from(kp.public_key());

        let stray = MsgBuilder::new(kp.public_key(), 9)
            .previous(MsgKey::from_bytes([7; 32]))
            .text("fork")
            .sign(&kp);
        adapter.commit(&id, vec![stray]).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_foreign_author_is_dropped() {
        let kp = Keypair::from_seed(&[1; 32]);
        let other = Keypair::from_seed(&[2; 32]);
        let mine = chain(&kp, 2);
        let theirs = chain(&other, 1);
        let adapter = adapter_with(&[], 1000).await;
        let id = LogId::from(kp.public_key());

        let mut batch = mine.clone();
        batch.extend(theirs);
        adapter.commit(&id, batch).await.unwrap();
        assert_eq!(held(&adapter, &kp).await, vec![1, 2]);
        assert!(held(&adapter, &other).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let adapter = adapter_with(&[], 1000).await;
        let id = LogId::from_bytes([3; 32]);
        adapter.commit(&id, Vec::new()).await.unwrap();
        assert_eq!(adapter.store.msg_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_msgs_skips_missing() {
        let kp = Keypair::from_seed(&[1; 32]);
        let values = chain(&kp, 2);
        let adapter = adapter_with(&values, 1000).await;
        let found = adapter
            .get_msgs(&[values[0].key(), MsgKey::from_bytes([0; 32]), values[1].key()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }
}
