//! A sync plugin: one adapter, one stream per connected peer.
//!
//! The host creates a plugin per log namespace (for example `feedSync` for
//! author feeds and `threadSync` for threads), hands it every new peer
//! connection, and calls [`SyncPlugin::request`] for the logs it wants
//! reconciled. Requests fan out to every live stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dagsync_core::{AuthorId, LogId};

use crate::adapter::LogAdapter;
use crate::algorithm::Algorithm;
use crate::config::SyncConfig;
use crate::driver::{self, Control};
use crate::error::Result;
use crate::stream::{ChannelSink, SyncStream};
use crate::transport::Channel;

struct StreamHandle {
    remote_id: AuthorId,
    control: mpsc::UnboundedSender<Control>,
}

pub struct SyncPlugin<A> {
    name: String,
    local_id: AuthorId,
    adapter: Arc<A>,
    config: SyncConfig,
    streams: Mutex<Vec<StreamHandle>>,
}

impl<A: LogAdapter> SyncPlugin<A> {
    pub fn new(name: impl Into<String>, local_id: AuthorId, adapter: Arc<A>, config: SyncConfig) -> Self {
        Self {
            name: name.into(),
            local_id,
            adapter,
            config,
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn streams(&self) -> MutexGuard<'_, Vec<StreamHandle>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a stream with `remote_id` over `channel`.
    ///
    /// The returned task resolves when the stream ends, with the error that
    /// aborted it if any. Must be called from within a tokio runtime.
    pub fn connect(&self, remote_id: AuthorId, channel: Channel) -> JoinHandle<Result<()>> {
        let algo = Algorithm::new(Arc::clone(&self.adapter), self.config.sketch.clone());
        let stream = SyncStream::new(
            self.name.clone(),
            self.local_id,
            remote_id,
            algo,
            ChannelSink::new(channel.tx),
        );
        let (control, control_rx) = mpsc::unbounded_channel();
        self.streams().push(StreamHandle { remote_id, control });
        tokio::spawn(driver::run(stream, channel.rx, control_rx))
    }

    /// Reconcile `id` with every connected peer.
    pub fn request(&self, id: LogId) {
        self.streams()
            .retain(|handle| handle.control.send(Control::Request(id)).is_ok());
    }

    /// Reconcile `id` with one peer only.
    pub fn request_from(&self, remote_id: &AuthorId, id: LogId) -> bool {
        let mut sent = false;
        self.streams().retain(|handle| {
            if handle.remote_id != *remote_id {
                return !handle.control.is_closed();
            }
            let ok = handle.control.send(Control::Request(id)).is_ok();
            sent |= ok;
            ok
        });
        sent
    }

    /// Close every stream with `remote_id`.
    pub fn disconnect(&self, remote_id: &AuthorId) {
        self.streams().retain(|handle| {
            if handle.remote_id == *remote_id {
                let _ = handle.control.send(Control::Close);
                false
            } else {
                true
            }
        });
    }

    /// Number of live streams. Ended streams are pruned.
    pub fn stream_count(&self) -> usize {
        let mut streams = self.streams();
        streams.retain(|handle| !handle.control.is_closed());
        streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagsync_core::{Keypair, MsgBuilder};
    use dagsync_store::{MemoryStore, Store};

    use crate::adapters::FeedAdapter;
    use crate::config::FeedSyncConfig;
    use crate::transport::memory;

    fn plugin(seed: u8, store: Arc<MemoryStore>) -> SyncPlugin<FeedAdapter<MemoryStore>> {
        let adapter = Arc::new(FeedAdapter::new(store, FeedSyncConfig::default()));
        SyncPlugin::new(
            "feedSync",
            Keypair::from_seed(&[seed; 32]).public_key(),
            adapter,
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_request_reaches_connected_peer() {
        let author = Keypair::from_seed(&[9; 32]);
        let first = MsgBuilder::new(author.public_key(), 1).text("one").sign(&author);
        let store_a = Arc::new(MemoryStore::new());
        store_a.insert_msg(&first).await.unwrap();
        let store_b = Arc::new(MemoryStore::new());

        let a = plugin(1, Arc::clone(&store_a));
        let b = plugin(2, Arc::clone(&store_b));
        let (left, right) = memory::pipe(8);
        let _ta = a.connect(Keypair::from_seed(&[2; 32]).public_key(), left);
        let _tb = b.connect(Keypair::from_seed(&[1; 32]).public_key(), right);
        assert_eq!(b.stream_count(), 1);

        b.request(LogId::from(author.public_key()));
        for _ in 0..200 {
            if store_b.has_msg(&first.key()).await.unwrap() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(store_b.has_msg(&first.key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ended_streams_are_pruned() {
        let a = plugin(1, Arc::new(MemoryStore::new()));
        let peer = Keypair::from_seed(&[2; 32]).public_key();
        let (left, right) = memory::pipe(8);
        let task = a.connect(peer, left);
        assert_eq!(a.stream_count(), 1);

        drop(right);
        assert!(task.await.unwrap().is_ok());
        assert_eq!(a.stream_count(), 0);
        a.request(LogId::from_bytes([1; 32]));
        assert!(!a.request_from(&peer, LogId::from_bytes([1; 32])));
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let a = plugin(1, Arc::new(MemoryStore::new()));
        let peer = Keypair::from_seed(&[2; 32]).public_key();
        let (left, _right) = memory::pipe(8);
        let task = a.connect(peer, left);

        a.disconnect(&peer);
        assert!(task.await.unwrap().is_ok());
        assert_eq!(a.stream_count(), 0);
    }
}
