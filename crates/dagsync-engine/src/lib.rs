//! # dagsync engine
//!
//! Reconciles append-only logs between two untrusted peers without sending
//! what the other side already holds.
//!
//! ## Overview
//!
//! For each log the two sides first agree on a window of the log (the
//! want-range) through an adapter-specific [`LogAdapter`] policy, then run up
//! to three rounds of Bloom sketch exchange to discover which keys each side
//! lacks, and finally swap exactly those messages. Many logs are reconciled
//! at once over one connection per peer.
//!
//! ## Layers
//!
//! - [`policy`] - range negotiation, as pure functions
//! - [`sketch`] and [`algorithm`] - Bloom sketches and set difference
//! - [`session`] - the ten-phase state machine for one log
//! - [`stream`] and [`driver`] - many logs over one duplex channel
//! - [`plugin`] - one stream per connected peer
//! - [`adapters`] - feed and thread adapters over a `dagsync_store::Store`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dagsync_core::{Keypair, LogId};
//! use dagsync_engine::{memory, FeedAdapter, FeedSyncConfig, SyncConfig, SyncPlugin};
//! use dagsync_store::MemoryStore;
//!
//! # async fn example() {
//! let me = Keypair::generate();
//! let peer = Keypair::generate();
//! let store = Arc::new(MemoryStore::new());
//! let adapter = Arc::new(FeedAdapter::new(store, FeedSyncConfig::default()));
//! let plugin = SyncPlugin::new("feedSync", me.public_key(), adapter, SyncConfig::default());
//!
//! let (local_end, _remote_end) = memory::pipe(64);
//! let _task = plugin.connect(peer.public_key(), local_end);
//! plugin.request(LogId::from(peer.public_key()));
//! # }
//! ```

pub mod adapter;
pub mod adapters;
pub mod algorithm;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod messages;
pub mod plugin;
pub mod policy;
pub mod session;
pub mod sketch;
pub mod stream;
pub mod transport;

pub use adapter::LogAdapter;
pub use adapters::{FeedAdapter, ThreadAdapter};
pub use algorithm::Algorithm;
pub use codec::framed;
pub use config::{FeedSyncConfig, SketchConfig, SyncConfig, ThreadSyncConfig};
pub use driver::Control;
pub use error::{CommitError, Result, SyncError, TransportError};
pub use messages::{limits, Payload, WireMessage, FIRST_PHASE, LAST_PHASE};
pub use plugin::SyncPlugin;
pub use policy::{bounded_window_want, common_range, symmetric_want, Direction};
pub use session::{TopicState, Transition};
pub use sketch::BloomSketch;
pub use stream::{ChannelSink, Sink, SyncStream, DEFAULT_BACKLOG_LIMIT};
pub use transport::{memory, Channel, Severity};
