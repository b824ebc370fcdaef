//! # dagsync testkit
//!
//! Testing utilities for dagsync.
//!
//! - **Fixtures**: deterministic authors, linked feeds and threads, node links
//! - **Generators**: proptest strategies for property-based testing
//!
//! ```rust
//! use dagsync_testkit::fixtures::{author, feed_chain, ThreadBuilder, BASE_TIMESTAMP};
//!
//! let alice = author(1);
//! let feed = feed_chain(&alice, 10);
//! assert_eq!(feed.len(), 10);
//!
//! let mut thread = ThreadBuilder::new(&alice, BASE_TIMESTAMP, "root");
//! let reply = thread.reply(&author(2), 100, None, "hi");
//! assert_eq!(reply.content.root, Some(thread.root().key()));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    author, authors, eventually, feed_chain, feed_slice, link, store_with, ThreadBuilder,
};
