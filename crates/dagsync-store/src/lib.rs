//! # dagsync store
//!
//! The host message store behind the [`Store`] trait, with a persistent
//! [`SqliteStore`] and a [`MemoryStore`] for tests.
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: inserting the same message twice returns `AlreadyExists`
//! - **One message per feed position**: a different message at an occupied
//!   `(author, sequence)` returns `Conflict`
//! - **Insertion order**: `all_msgs` and `thread_msgs` return messages in the
//!   order they were stored

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{FeedSummary, InsertResult, Store};
