//! Thread adapter: merge every reply to one root message.
//!
//! The log id is the root message key. A message's position in the thread is
//! its elapsed time since the root, in milliseconds, taken from the earlier of
//! its claimed timestamp and the time it was received locally. Replies that
//! claim to precede their root fall outside every range.

use std::sync::Arc;

use async_trait::async_trait;

use dagsync_core::{validate_msg, validate_msg_structure, LogId, Msg, MsgKey, MsgValue, Range};
use dagsync_store::{InsertResult, Store, StoreError};

use crate::adapter::LogAdapter;
use crate::config::ThreadSyncConfig;
use crate::error::{CommitError, Result};
use crate::policy::symmetric_want;

pub struct ThreadAdapter<S> {
    store: Arc<S>,
    config: ThreadSyncConfig,
}

/// Milliseconds between the root and `msg`, or `None` if `msg` predates it.
fn elapsed(msg: &Msg, root_timestamp: i64) -> Option<u64> {
    let at = msg.received_at.min(msg.value.timestamp);
    u64::try_from(at.checked_sub(root_timestamp)?).ok()
}

impl<S: Store> ThreadAdapter<S> {
    pub fn new(store: Arc<S>, config: ThreadSyncConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ThreadSyncConfig {
        &self.config
    }

    fn belongs(root: &MsgKey, value: &MsgValue) -> bool {
        value.content.root.as_ref() == Some(root) || value.key() == *root
    }
}

#[async_trait]
impl<S: Store> LogAdapter for ThreadAdapter<S> {
    async fn have_range(&self, id: &LogId) -> std::result::Result<Range, StoreError> {
        let root_key = MsgKey::from(*id);
        let Some(root) = self.store.get_msg(&root_key).await? else {
            return Ok(Range::EMPTY);
        };
        let latest = self
            .store
            .thread_msgs(&root_key)
            .await?
            .iter()
            .filter_map(|reply| elapsed(reply, root.value.timestamp))
            .max()
            .unwrap_or(0);
        Ok(Range::new(0, latest))
    }

    fn want_range(&self, _id: &LogId, local_have: Range, remote_have: Range) -> Result<Range> {
        symmetric_want(local_have, remote_have)
    }

    fn estimate_msg_count(&self, range: Range) -> usize {
        let width = (range.max.saturating_sub(range.min) / 10) as usize;
        width.clamp(self.config.estimate_floor, self.config.estimate_ceiling.max(self.config.estimate_floor))
    }

    async fn msgs_in(&self, id: &LogId, range: Range) -> std::result::Result<Vec<Msg>, StoreError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let root_key = MsgKey::from(*id);
        let Some(root) = self.store.get_msg(&root_key).await? else {
            return Ok(Vec::new());
        };
        let root_timestamp = root.value.timestamp;
        let mut out = Vec::new();
        if range.contains(0) {
            out.push(root);
        }
        out.extend(
            self.store
                .thread_msgs(&root_key)
                .await?
                .into_iter()
                .filter(|reply| elapsed(reply, root_timestamp).is_some_and(|t| range.contains(t))),
        );
        Ok(out)
    }

    async fn get_msgs(&self, keys: &[MsgKey]) -> std::result::Result<Vec<Msg>, StoreError> {
        super::fetch_by_keys(self.store.as_ref(), keys).await
    }

    async fn commit(&self, id: &LogId, msgs: Vec<MsgValue>) -> std::result::Result<(), CommitError> {
        let root = MsgKey::from(*id);
        let mut batch: Vec<MsgValue> = msgs
            .into_iter()
            .filter(|value| {
                let ok = Self::belongs(&root, value);
                if !ok {
                    tracing::warn!(thread = %root, author = %value.author, "dropping message from another thread");
                }
                ok
            })
            .collect();
        batch.sort_by_key(|v| v.timestamp);

        let mut inserted = 0usize;
        for value in &batch {
            let checked = if self.config.validate {
                validate_msg(value)
            } else {
                validate_msg_structure(value)
            };
            if let Err(e) = checked {
                tracing::warn!(thread = %root, error = %e, "dropping invalid reply");
                continue;
            }
            match self.store.insert_msg(value).await? {
                InsertResult::Inserted(_) => inserted += 1,
                InsertResult::AlreadyExists => {}
                InsertResult::Conflict { existing } => {
                    tracing::warn!(
                        thread = %root,
                        author = %value.author,
                        sequence = value.sequence,
                        existing = %existing,
                        "skipping reply that conflicts with a stored message"
                    );
                }
            }
        }
        tracing::debug!(thread = %root, received = batch.len(), inserted, "committed thread batch");
        Ok(())
    }
}
