//! # dagsync
//!
//! Peer-to-peer replication of append-only logs.
//!
//! ## Overview
//!
//! Every participant owns a signed, hash-linked **feed** of messages.
//! Messages may reply to an earlier message, forming a **thread** across many
//! feeds. Two connected nodes reconcile any feed or thread by agreeing on a
//! window of it and trading Bloom sketches until each knows what the other
//! lacks; only the missing messages cross the wire.
//!
//! ## Key Concepts
//!
//! - **Feed**: Owned by a single author. Sequence numbers start at 1 and
//!   each message links to its predecessor.
//! - **Thread**: A root message plus every reply naming it, from any author.
//! - **Fork**: Two different messages claiming the same feed position.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dagsync::{Node, NodeConfig};
//! use dagsync::core::Keypair;
//! use dagsync::engine::memory;
//! use dagsync::store::MemoryStore;
//!
//! # async fn example() {
//! let alice = Node::new(Keypair::generate(), MemoryStore::new(), NodeConfig::default());
//! let bob = Node::new(Keypair::generate(), MemoryStore::new(), NodeConfig::default());
//!
//! let (feed_a, feed_b) = memory::pipe(64);
//! let (thread_a, thread_b) = memory::pipe(64);
//! alice.connect(bob.id(), feed_a, thread_a);
//! bob.connect(alice.id(), feed_b, thread_b);
//!
//! let root = alice.publish("hello").await.unwrap();
//! bob.request_feed(alice.id());
//! bob.request_thread(root.key());
//! # }
//! ```
//!
//! ## Re-exports
//!
//! - `dagsync::core` - Core primitives (MsgValue, MsgKey, Range, etc.)
//! - `dagsync::store` - Storage abstraction and SQLite
//! - `dagsync::engine` - Reconciliation protocol and transports

pub mod error;
pub mod node;

// Re-export component crates
pub use dagsync_core as core;
pub use dagsync_engine as engine;
pub use dagsync_store as store;

pub use error::{NodeError, Result};
pub use node::{IngestResult, Node, NodeConfig, PeerTasks, FEED_SYNC, THREAD_SYNC};

// Re-export commonly used core types
pub use dagsync_core::{AuthorId, Keypair, LogId, Msg, MsgBuilder, MsgKey, MsgValue, Range};
