//! The Node: one identity, one store, and a sync plugin per log kind.
//!
//! A node authors messages into its own feed, accepts messages from outside
//! (validated), and reconciles feeds and threads with every connected peer.
//! Feeds are reconciled by the `feedSync` plugin and threads by `threadSync`;
//! each peer connection carries one duplex channel per plugin.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use dagsync_core::{
    now_millis, validate_msg, AuthorId, Keypair, LogId, MsgBuilder, MsgKey, MsgValue,
};
use dagsync_engine::{
    Channel, FeedAdapter, FeedSyncConfig, SyncConfig, SyncPlugin, ThreadAdapter, ThreadSyncConfig,
};
use dagsync_store::{InsertResult, Store};

use crate::error::{NodeError, Result};

/// Plugin name used for feed reconciliation.
pub const FEED_SYNC: &str = "feedSync";

/// Plugin name used for thread reconciliation.
pub const THREAD_SYNC: &str = "threadSync";

/// Configuration for a [`Node`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Whether to validate messages passed to [`Node::ingest`].
    pub validate_on_ingest: bool,
    /// Stream and sketch settings shared by both plugins.
    pub sync: SyncConfig,
    pub feed_sync: FeedSyncConfig,
    pub thread_sync: ThreadSyncConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            validate_on_ingest: true,
            sync: SyncConfig::default(),
            feed_sync: FeedSyncConfig::default(),
            thread_sync: ThreadSyncConfig::default(),
        }
    }
}

/// Result of ingesting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// Message was accepted and stored.
    Accepted(MsgKey),
    /// Message was already in store (idempotent).
    Duplicate,
    /// A different message already holds the same feed position.
    Conflict { existing: MsgKey },
}

/// Stream tasks for one connected peer.
///
/// Each task resolves when its stream ends, with the error that aborted it
/// if any.
pub struct PeerTasks {
    pub feed: JoinHandle<dagsync_engine::Result<()>>,
    pub thread: JoinHandle<dagsync_engine::Result<()>>,
}

/// The main Node struct.
pub struct Node<S: Store> {
    /// The identity keypair for this node.
    keypair: Keypair,
    store: Arc<S>,
    config: NodeConfig,
    feed_sync: SyncPlugin<FeedAdapter<S>>,
    thread_sync: SyncPlugin<ThreadAdapter<S>>,
    /// Serializes local appends so sequence numbers are handed out once.
    append_lock: Mutex<()>,
}

impl<S: Store> Node<S> {
    /// Create a new node instance.
    pub fn new(keypair: Keypair, store: S, config: NodeConfig) -> Self {
        let store = Arc::new(store);
        let id = keypair.public_key();
        let feed_sync = SyncPlugin::new(
            FEED_SYNC,
            id,
            Arc::new(FeedAdapter::new(Arc::clone(&store), config.feed_sync.clone())),
            config.sync.clone(),
        );
        let thread_sync = SyncPlugin::new(
            THREAD_SYNC,
            id,
            Arc::new(ThreadAdapter::new(Arc::clone(&store), config.thread_sync.clone())),
            config.sync.clone(),
        );
        Self {
            keypair,
            store,
            config,
            feed_sync,
            thread_sync,
            append_lock: Mutex::new(()),
        }
    }

    /// The node's identity, which is also the id of its own feed.
    pub fn id(&self) -> AuthorId {
        self.keypair.public_key()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn feed_sync(&self) -> &SyncPlugin<FeedAdapter<S>> {
        &self.feed_sync
    }

    pub fn thread_sync(&self) -> &SyncPlugin<ThreadAdapter<S>> {
        &self.thread_sync
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authoring
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a top-level message to this node's feed.
    pub async fn publish(&self, text: impl Into<String>) -> Result<MsgValue> {
        self.append(text.into(), None).await
    }

    /// Append a reply to the thread started by `root`.
    ///
    /// `branch` is the message being answered directly; pass `root` itself
    /// to answer the thread's opening message.
    pub async fn reply(
        &self,
        root: MsgKey,
        branch: MsgKey,
        text: impl Into<String>,
    ) -> Result<MsgValue> {
        if let Some(stored) = self.store.get_msg(&root).await? {
            if stored.value.is_reply() {
                return Err(NodeError::InvalidOperation(format!(
                    "{} is a reply, not a thread root",
                    root
                )));
            }
        }
        self.append(text.into(), Some((root, branch))).await
    }

    async fn append(&self, text: String, thread: Option<(MsgKey, MsgKey)>) -> Result<MsgValue> {
        let _guard = self.append_lock.lock().await;
        let author = self.id();
        let head = self.store.feed_summary(&author).await?;

        let sequence = head.map_or(1, |h| h.max_sequence + 1);
        let mut builder = MsgBuilder::new(author, sequence)
            .timestamp(now_millis())
            .text(text);
        if let Some(h) = head {
            builder = builder.previous(h.latest);
        }
        if let Some((root, branch)) = thread {
            builder = builder.root(root).branch(branch);
        }
        let value = builder.sign(&self.keypair);

        match self.store.insert_msg(&value).await? {
            InsertResult::Inserted(_) | InsertResult::AlreadyExists => {
                tracing::debug!(author = %author, sequence, "appended message");
                Ok(value)
            }
            InsertResult::Conflict { existing } => Err(NodeError::Conflict {
                author,
                sequence,
                existing,
            }),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest a message from an external source.
    ///
    /// Validates and stores the message if valid.
    pub async fn ingest(&self, value: &MsgValue) -> Result<IngestResult> {
        if self.config.validate_on_ingest {
            validate_msg(value)?;
        }

        match self.store.insert_msg(value).await? {
            InsertResult::Inserted(key) => Ok(IngestResult::Accepted(key)),
            InsertResult::AlreadyExists => Ok(IngestResult::Duplicate),
            InsertResult::Conflict { existing } => {
                tracing::warn!(
                    author = %value.author,
                    sequence = value.sequence,
                    existing = %existing,
                    "fork: conflicting message at an occupied feed position"
                );
                Ok(IngestResult::Conflict { existing })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a peer. `feed` and `thread` are duplex channels to the peer's
    /// `feedSync` and `threadSync` plugins respectively.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, remote_id: AuthorId, feed: Channel, thread: Channel) -> PeerTasks {
        tracing::info!(local = %self.id(), remote = %remote_id, "peer connected");
        PeerTasks {
            feed: self.feed_sync.connect(remote_id, feed),
            thread: self.thread_sync.connect(remote_id, thread),
        }
    }

    /// Close both streams with `remote_id`.
    pub fn disconnect(&self, remote_id: &AuthorId) {
        self.feed_sync.disconnect(remote_id);
        self.thread_sync.disconnect(remote_id);
    }

    /// Reconcile `author`'s feed with every connected peer.
    pub fn request_feed(&self, author: AuthorId) {
        self.feed_sync.request(LogId::from(author));
    }

    /// Reconcile the thread started by `root` with every connected peer.
    pub fn request_thread(&self, root: MsgKey) {
        self.thread_sync.request(LogId::from(root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_core::Range;
    use dagsync_store::MemoryStore;

    fn node(seed: u8) -> Node<MemoryStore> {
        Node::new(
            Keypair::from_seed(&[seed; 32]),
            MemoryStore::new(),
            NodeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_publish_chains_feed() {
        let node = node(1);
        let first = node.publish("hello").await.unwrap();
        let second = node.publish("again").await.unwrap();

        assert_eq!(first.sequence, 1);
        assert!(first.previous.is_none());
        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous, Some(first.key()));
        assert!(validate_msg(&second).is_ok());

        let feed = node.store().feed_msgs(&node.id(), Range::new(1, 10)).await.unwrap();
        assert_eq!(feed.len(), 2);
    }

    #[tokio::test]
    async fn test_reply_sets_thread_fields() {
        let node = node(1);
        let root = node.publish("root").await.unwrap();
        let reply = node.reply(root.key(), root.key(), "re").await.unwrap();

        assert_eq!(reply.content.root, Some(root.key()));
        assert_eq!(reply.content.branch, Some(root.key()));
        assert_eq!(reply.sequence, 2);

        let replies = node.store().thread_msgs(&root.key()).await.unwrap();
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_to_reply_is_rejected() {
        let node = node(1);
        let root = node.publish("root").await.unwrap();
        let reply = node.reply(root.key(), root.key(), "re").await.unwrap();

        let err = node.reply(reply.key(), reply.key(), "re re").await.unwrap_err();
        assert!(matches!(err, NodeError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_ingest_outcomes() {
        let author = Keypair::from_seed(&[7; 32]);
        let node = node(1);
        let value = MsgBuilder::new(author.public_key(), 1).text("a").sign(&author);

        assert_eq!(
            node.ingest(&value).await.unwrap(),
            IngestResult::Accepted(value.key())
        );
        assert_eq!(node.ingest(&value).await.unwrap(), IngestResult::Duplicate);

        let fork = MsgBuilder::new(author.public_key(), 1).text("b").sign(&author);
        assert_eq!(
            node.ingest(&fork).await.unwrap(),
            IngestResult::Conflict { existing: value.key() }
        );
    }

    #[tokio::test]
    async fn test_ingest_rejects_bad_signature() {
        let author = Keypair::from_seed(&[7; 32]);
        let node = node(1);
        let mut value = MsgBuilder::new(author.public_key(), 1).text("a").sign(&author);
        value.content.text = "tampered".into();

        let err = node.ingest(&value).await.unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
        assert_eq!(node.store().msg_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_without_validation() {
        let author = Keypair::from_seed(&[7; 32]);
        let config = NodeConfig {
            validate_on_ingest: false,
            ..NodeConfig::default()
        };
        let node = Node::new(Keypair::from_seed(&[1; 32]), MemoryStore::new(), config);
        let mut value = MsgBuilder::new(author.public_key(), 1).text("a").sign(&author);
        value.content.text = "tampered".into();

        assert!(matches!(
            node.ingest(&value).await.unwrap(),
            IngestResult::Accepted(_)
        ));
    }
}
