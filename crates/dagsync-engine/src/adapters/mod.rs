//! Built-in log adapters over a [`Store`].
//!
//! - [`FeedAdapter`]: one author's feed, bounded window, sequence-ordered.
//! - [`ThreadAdapter`]: one discussion thread, symmetric merge, elapsed-time ordered.

mod feed;
mod thread;

pub use feed::FeedAdapter;
pub use thread::ThreadAdapter;

use dagsync_core::{Msg, MsgKey};
use dagsync_store::{Store, StoreError};

/// Fetch stored messages by key, skipping keys that are not held.
async fn fetch_by_keys<S: Store>(store: &S, keys: &[MsgKey]) -> Result<Vec<Msg>, StoreError> {
    let mut msgs = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(msg) = store.get_msg(key).await? {
            msgs.push(msg);
        }
    }
    Ok(msgs)
}
