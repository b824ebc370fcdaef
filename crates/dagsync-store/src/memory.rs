//! In-memory implementation of the Store trait.
//!
//! Mainly for tests. Same semantics as SQLite, nothing persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use dagsync_core::{now_millis, AuthorId, Msg, MsgKey, MsgValue, Range};

use crate::error::Result;
use crate::traits::{FeedSummary, InsertResult, Store};

/// In-memory store. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Messages by key, with their insertion counter.
    msgs: HashMap<MsgKey, (u64, Msg)>,

    /// Insertion order: counter -> key.
    order: BTreeMap<u64, MsgKey>,

    /// Feed index: author -> sequence -> key.
    feeds: HashMap<AuthorId, BTreeMap<u64, MsgKey>>,

    /// Thread index: root -> insertion counter -> key.
    threads: HashMap<MsgKey, BTreeMap<u64, MsgKey>>,

    next: u64,
}

impl Inner {
    fn remove(&mut self, key: &MsgKey) -> bool {
        let Some((counter, msg)) = self.msgs.remove(key) else {
            return false;
        };
        self.order.remove(&counter);
        if let Some(feed) = self.feeds.get_mut(&msg.value.author) {
            feed.remove(&msg.value.sequence);
            if feed.is_empty() {
                self.feeds.remove(&msg.value.author);
            }
        }
        if let Some(root) = msg.value.content.root {
            if let Some(thread) = self.threads.get_mut(&root) {
                thread.remove(&counter);
                if thread.is_empty() {
                    self.threads.remove(&root);
                }
            }
        }
        true
    }

    fn resolve<'a>(&self, keys: impl Iterator<Item = &'a MsgKey>) -> Vec<Msg> {
        keys.filter_map(|k| self.msgs.get(k).map(|(_, m)| m.clone()))
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_msg(&self, value: &MsgValue) -> Result<InsertResult> {
        let key = value.key();
        let mut inner = self.write();

        if inner.msgs.contains_key(&key) {
            return Ok(InsertResult::AlreadyExists);
        }
        if let Some(existing) = inner
            .feeds
            .get(&value.author)
            .and_then(|feed| feed.get(&value.sequence))
        {
            return Ok(InsertResult::Conflict {
                existing: *existing,
            });
        }

        let counter = inner.next;
        inner.next += 1;
        inner.order.insert(counter, key);
        inner
            .feeds
            .entry(value.author)
            .or_default()
            .insert(value.sequence, key);
        if let Some(root) = value.content.root {
            inner.threads.entry(root).or_default().insert(counter, key);
        }
        inner.msgs.insert(
            key,
            (
                counter,
                Msg {
                    key,
                    value: value.clone(),
                    received_at: now_millis(),
                },
            ),
        );

        Ok(InsertResult::Inserted(key))
    }

    async fn get_msg(&self, key: &MsgKey) -> Result<Option<Msg>> {
        Ok(self.read().msgs.get(key).map(|(_, m)| m.clone()))
    }

    async fn delete_msg(&self, key: &MsgKey) -> Result<bool> {
        Ok(self.write().remove(key))
    }

    async fn feed_msgs(&self, author: &AuthorId, range: Range) -> Result<Vec<Msg>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let inner = self.read();
        Ok(match inner.feeds.get(author) {
            Some(feed) => inner.resolve(feed.range(range.min..=range.max).map(|(_, k)| k)),
            None => Vec::new(),
        })
    }

    async fn feed_summary(&self, author: &AuthorId) -> Result<Option<FeedSummary>> {
        let inner = self.read();
        let Some(feed) = inner.feeds.get(author) else {
            return Ok(None);
        };
        let (Some((min, _)), Some((max, latest))) = (feed.first_key_value(), feed.last_key_value())
        else {
            return Ok(None);
        };
        Ok(Some(FeedSummary {
            min_sequence: *min,
            max_sequence: *max,
            count: feed.len() as u64,
            latest: *latest,
        }))
    }

    async fn delete_feed(&self, author: &AuthorId) -> Result<usize> {
        let mut inner = self.write();
        let keys: Vec<MsgKey> = match inner.feeds.get(author) {
            Some(feed) => feed.values().copied().collect(),
            None => return Ok(0),
        };
        Ok(keys.iter().filter(|k| inner.remove(k)).count())
    }

    async fn thread_msgs(&self, root: &MsgKey) -> Result<Vec<Msg>> {
        let inner = self.read();
        Ok(match inner.threads.get(root) {
            Some(thread) => inner.resolve(thread.values()),
            None => Vec::new(),
        })
    }

    async fn all_msgs(&self) -> Result<Vec<Msg>> {
        let inner = self.read();
        Ok(inner.resolve(inner.order.values()))
    }

    async fn msg_count(&self) -> Result<usize> {
        Ok(self.read().msgs.len())
    }
}
