//! The log-specific adapter contract.
//!
//! An adapter tells the engine how one namespace of logs (author feeds,
//! discussion threads) maps onto the host store: what range is held, what
//! range to ask for, which messages sit in a range, and how to persist
//! messages fetched from a peer.

use async_trait::async_trait;

use dagsync_core::{LogId, Msg, MsgKey, MsgValue, Range};
use dagsync_store::StoreError;

use crate::error::{CommitError, Result};

#[async_trait]
pub trait LogAdapter: Send + Sync + 'static {
    /// Range of `id` held locally; empty if nothing is held.
    async fn have_range(&self, id: &LogId) -> std::result::Result<Range, StoreError>;

    /// Range to request from the peer. Must be empty whenever `remote_have`
    /// is empty.
    fn want_range(&self, id: &LogId, local_have: Range, remote_have: Range) -> Result<Range>;

    /// Sizing hint for a sketch over `range`.
    fn estimate_msg_count(&self, range: Range) -> usize;

    /// Locally held messages of `id` inside `range`, in store order.
    ///
    /// Recomputed on every call; two calls with no writes in between return
    /// the same messages in the same order.
    async fn msgs_in(&self, id: &LogId, range: Range) -> std::result::Result<Vec<Msg>, StoreError>;

    /// Look up messages by key. Keys not held locally are skipped.
    async fn get_msgs(&self, keys: &[MsgKey]) -> std::result::Result<Vec<Msg>, StoreError>;

    /// Persist messages of `id` received from a peer.
    ///
    /// May be called concurrently by streams for different peers.
    async fn commit(&self, id: &LogId, msgs: Vec<MsgValue>) -> std::result::Result<(), CommitError>;
}
