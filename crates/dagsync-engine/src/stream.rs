//! Multiplexed duplex stream: every topic reconciled with one peer.
//!
//! A [`SyncStream`] owns the [`TopicState`] of each log in flight with its
//! peer, dispatches inbound messages to them by log id, and writes their
//! replies to a [`Sink`].
//!
//! Transitions touch the store, so each one runs as a job on a `JoinSet`.
//! A topic with a job in flight is busy: further inbound messages for it are
//! queued and replayed in order once the job completes. Other topics keep
//! flowing meanwhile.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use dagsync_core::{AuthorId, LogId};

use crate::adapter::LogAdapter;
use crate::algorithm::Algorithm;
use crate::error::{Result, SyncError, TransportError};
use crate::messages::{WireMessage, FIRST_PHASE};
use crate::session::{TopicState, Transition};

/// Outbound half of a stream, with explicit back-pressure.
pub trait Sink: Send + 'static {
    /// Whether the sink wants no more writes for now.
    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Queue one message. Writes while paused are buffered, not dropped,
    /// up to an implementation-defined bound.
    fn write(&mut self, msg: WireMessage) -> std::result::Result<(), TransportError>;

    /// Push buffered messages downstream, as far as capacity allows.
    fn flush(&mut self) {}

    /// Close the sink, with the error that caused it if any.
    fn end(&mut self, err: Option<&SyncError>);
}

/// Default cap on [`ChannelSink`]'s overflow backlog.
pub const DEFAULT_BACKLOG_LIMIT: usize = 1024;

/// A [`Sink`] over a bounded channel sender.
///
/// Paused while the channel is full or the overflow backlog is not empty.
/// Each topic produces at most one reply per inbound message, so the backlog
/// grows with the number of topics active while paused. Topics the peer keeps
/// opening can still grow it, so past `backlog_limit` the write fails with
/// [`TransportError::BacklogFull`], which aborts the stream.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<WireMessage>>,
    backlog: VecDeque<WireMessage>,
    backlog_limit: usize,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<WireMessage>) -> Self {
        Self::with_backlog_limit(tx, DEFAULT_BACKLOG_LIMIT)
    }

    pub fn with_backlog_limit(tx: mpsc::Sender<WireMessage>, backlog_limit: usize) -> Self {
        Self {
            tx: Some(tx),
            backlog: VecDeque::new(),
            backlog_limit,
        }
    }

    fn buffer(&mut self, msg: WireMessage) -> std::result::Result<(), TransportError> {
        if self.backlog.len() >= self.backlog_limit {
            return Err(TransportError::BacklogFull {
                limit: self.backlog_limit,
            });
        }
        self.backlog.push_back(msg);
        Ok(())
    }

    /// A clone of the underlying sender, for waiting on capacity.
    pub fn sender(&self) -> Option<mpsc::Sender<WireMessage>> {
        self.tx.clone()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

impl Sink for ChannelSink {
    fn is_paused(&self) -> bool {
        match &self.tx {
            Some(tx) => !self.backlog.is_empty() || tx.capacity() == 0,
            None => true,
        }
    }

    fn is_ended(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }

    fn write(&mut self, msg: WireMessage) -> std::result::Result<(), TransportError> {
        let Some(tx) = &self.tx else {
            return Err(TransportError::Closed);
        };
        if !self.backlog.is_empty() {
            return self.buffer(msg);
        }
        match tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(msg)) => self.buffer(msg),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    fn flush(&mut self) {
        let Some(tx) = &self.tx else {
            return;
        };
        while let Some(msg) = self.backlog.pop_front() {
            match tx.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(msg)) => {
                    self.backlog.push_front(msg);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.backlog.clear();
                    return;
                }
            }
        }
    }

    fn end(&mut self, err: Option<&SyncError>) {
        if let Some(err) = err {
            tracing::debug!(error = %err, dropped = self.backlog.len(), "closing sink");
        }
        self.backlog.clear();
        self.tx = None;
    }
}

/// Output of one transition job.
#[derive(Debug)]
pub struct JobOutput {
    id: LogId,
    state: TopicState,
    result: Result<Transition>,
}

enum Work {
    Start,
    Inbound(WireMessage),
}

/// All topics reconciled with one peer over one connection.
pub struct SyncStream<A, K> {
    name: String,
    local_id: AuthorId,
    remote_id: AuthorId,
    algo: Algorithm<A>,
    sink: K,
    topics: HashMap<LogId, TopicState>,
    /// Requested topics not yet opened, in request order.
    requested: Vec<LogId>,
    busy: HashSet<LogId>,
    deferred: HashMap<LogId, VecDeque<WireMessage>>,
    jobs: JoinSet<JobOutput>,
    ended: bool,
    failure: Option<SyncError>,
    span: tracing::Span,
}

impl<A: LogAdapter, K: Sink> SyncStream<A, K> {
    pub fn new(
        name: impl Into<String>,
        local_id: AuthorId,
        remote_id: AuthorId,
        algo: Algorithm<A>,
        sink: K,
    ) -> Self {
        let name = name.into();
        let local = local_id.to_hex();
        let remote = remote_id.to_hex();
        let span = tracing::debug_span!(
            "sync",
            local = &local[..6],
            plugin = %name,
            remote = &remote[..6]
        );
        Self {
            name,
            local_id,
            remote_id,
            algo,
            sink,
            topics: HashMap::new(),
            requested: Vec::new(),
            busy: HashSet::new(),
            deferred: HashMap::new(),
            jobs: JoinSet::new(),
            ended: false,
            failure: None,
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remote_id(&self) -> &AuthorId {
        &self.remote_id
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Topics with reconciliation state, busy ones included.
    pub fn active_topics(&self) -> usize {
        self.topics.len() + self.busy.len()
    }

    /// Requested topics still waiting to be opened.
    pub fn pending_requests(&self) -> &[LogId] {
        &self.requested
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Ask the peer to reconcile `id`. A no-op if it is already in progress.
    pub fn request(&mut self, id: LogId) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.ended {
            return;
        }
        if self.requested.contains(&id) || self.topics.contains_key(&id) || self.busy.contains(&id) {
            tracing::debug!(topic = %id, "already requested");
            return;
        }
        self.requested.push(id);
        self.resume();
    }

    /// Downstream has capacity: flush buffered output and open pending requests.
    pub fn resume(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.ended {
            return;
        }
        self.sink.flush();
        while !self.requested.is_empty() && !self.sink.is_paused() && !self.sink.is_ended() {
            let id = self.requested.remove(0);
            if self.topics.contains_key(&id) || self.busy.contains(&id) {
                continue;
            }
            self.spawn(id, TopicState::new(), Work::Start);
        }
    }

    /// Dispatch one inbound message.
    pub fn write(&mut self, msg: WireMessage) {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.ended {
            return;
        }
        if let Err(e) = msg.validate() {
            tracing::warn!(topic = %msg.id, phase = msg.phase, error = %e, "dropping invalid message");
            return;
        }
        let id = msg.id;
        if self.busy.contains(&id) {
            self.deferred.entry(id).or_default().push_back(msg);
            return;
        }

        let mut state = self.topics.remove(&id).unwrap_or_default();
        if msg.phase == FIRST_PHASE && state.is_initiator() && state.last_sent() == FIRST_PHASE {
            // Both sides opened the same topic; the larger id answers.
            if self.local_id < self.remote_id {
                tracing::debug!(topic = %id, "both sides requested, staying initiator");
                self.topics.insert(id, state);
                return;
            }
            tracing::debug!(topic = %id, "both sides requested, answering as responder");
            state = TopicState::new();
        }

        if !state.accepts(msg.phase) {
            tracing::warn!(
                topic = %id,
                phase = msg.phase,
                last_sent = state.last_sent(),
                "dropping out-of-order message"
            );
            if state.last_sent() > 0 {
                self.topics.insert(id, state);
            }
            return;
        }
        self.spawn(id, state, Work::Inbound(msg));
    }

    fn spawn(&mut self, id: LogId, mut state: TopicState, work: Work) {
        self.busy.insert(id);
        let algo = self.algo.clone();
        let job = async move {
            let result = match work {
                Work::Start => state.start(&algo, &id).await,
                Work::Inbound(msg) => state.advance(&algo, msg).await,
            };
            JobOutput { id, state, result }
        };
        self.jobs.spawn(job.instrument(self.span.clone()));
    }

    /// Wait for the next transition job. Cancel safe.
    pub async fn next_job(&mut self) -> Option<std::result::Result<JobOutput, JoinError>> {
        self.jobs.join_next().await
    }

    /// Apply a finished job: send its output, then replay queued input.
    pub fn complete(&mut self, joined: std::result::Result<JobOutput, JoinError>) {
        if self.ended {
            return;
        }
        let output = match joined {
            Ok(output) => output,
            Err(e) => {
                self.abort(SyncError::Job(e.to_string()));
                return;
            }
        };
        let JobOutput { id, state, result } = output;
        self.busy.remove(&id);
        let span = self.span.clone();
        let _enter = span.enter();

        match result {
            Ok(Transition::Reply(msg)) => {
                self.topics.insert(id, state);
                self.send(msg);
            }
            Ok(Transition::Finish(last)) => {
                if let Some(msg) = last {
                    self.send(msg);
                }
                tracing::debug!(topic = %id, "topic reconciled");
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(topic = %id, error = %e, "aborting stream");
                self.abort(e);
                return;
            }
            Err(e) => {
                tracing::warn!(topic = %id, error = %e, "dropping message");
                if state.last_sent() > 0 {
                    self.topics.insert(id, state);
                }
            }
        }
        if self.ended {
            return;
        }
        self.replay(id);
        self.resume();
    }

    fn replay(&mut self, id: LogId) {
        let Some(mut queue) = self.deferred.remove(&id) else {
            return;
        };
        while let Some(msg) = queue.pop_front() {
            self.write(msg);
            if self.busy.contains(&id) {
                if !queue.is_empty() {
                    self.deferred.insert(id, queue);
                }
                return;
            }
        }
    }

    fn send(&mut self, msg: WireMessage) {
        if let Err(e) = self.sink.write(msg) {
            if e.severity().aborts() {
                self.abort(e.into());
            } else {
                tracing::debug!(error = %e, "peer went away");
                self.end();
            }
        }
    }

    fn teardown(&mut self) {
        self.ended = true;
        self.jobs.abort_all();
        self.topics.clear();
        self.requested.clear();
        self.busy.clear();
        self.deferred.clear();
    }

    /// Tear down on a fatal error. In-flight rounds are discarded.
    pub fn abort(&mut self, err: SyncError) {
        if self.ended {
            return;
        }
        self.teardown();
        self.sink.end(Some(&err));
        self.failure = Some(err);
    }

    /// Close normally. In-flight rounds are discarded.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.teardown();
        self.sink.end(None);
    }

    /// The error that aborted the stream, if any.
    pub fn take_failure(&mut self) -> Option<SyncError> {
        self.failure.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use dagsync_core::{Keypair, Msg, MsgKey, MsgValue, Range};
    use dagsync_store::{MemoryStore, Store, StoreError};

    use crate::adapters::FeedAdapter;
    use crate::config::{FeedSyncConfig, SketchConfig};
    use crate::error::CommitError;
    use crate::messages::Payload;

    #[derive(Default)]
    struct VecSink {
        sent: Vec<WireMessage>,
        paused: bool,
        ended: bool,
        ended_with_error: bool,
    }

    impl Sink for VecSink {
        fn is_paused(&self) -> bool {
            self.paused || self.ended
        }

        fn is_ended(&self) -> bool {
            self.ended
        }

        fn write(&mut self, msg: WireMessage) -> std::result::Result<(), TransportError> {
            if self.ended {
                return Err(TransportError::Closed);
            }
            self.sent.push(msg);
            Ok(())
        }

        fn end(&mut self, err: Option<&SyncError>) {
            self.ended = true;
            self.ended_with_error = err.is_some();
        }
    }

    type TestStream = SyncStream<FeedAdapter<MemoryStore>, VecSink>;

    fn stream(local: u8, remote: u8) -> TestStream {
        let store = Arc::new(MemoryStore::new());
        let adapter = Arc::new(FeedAdapter::new(store, FeedSyncConfig::default()));
        SyncStream::new(
            "feedSync",
            Keypair::from_seed(&[local; 32]).public_key(),
            Keypair::from_seed(&[remote; 32]).public_key(),
            Algorithm::new(adapter, SketchConfig::default()),
            VecSink::default(),
        )
    }

    async fn drain<A: LogAdapter, K: Sink>(stream: &mut SyncStream<A, K>) {
        while let Some(joined) = stream.next_job().await {
            stream.complete(joined);
        }
    }

    #[tokio::test]
    async fn test_request_is_idempotent() {
        let mut s = stream(1, 2);
        let id = LogId::from_bytes([7; 32]);
        s.request(id);
        s.request(id);
        drain(&mut s).await;
        s.request(id);
        drain(&mut s).await;

        assert_eq!(s.sink.sent.len(), 1);
        assert_eq!(s.sink.sent[0].phase, 1);
        assert_eq!(s.sink.sent[0].payload, Payload::Range(Range::EMPTY));
    }

    #[tokio::test]
    async fn test_request_while_paused_waits_for_resume() {
        let mut s = stream(1, 2);
        let id = LogId::from_bytes([7; 32]);
        s.sink.paused = true;
        s.request(id);
        assert!(!s.has_jobs());
        assert_eq!(s.pending_requests(), &[id]);

        s.sink.paused = false;
        s.resume();
        drain(&mut s).await;
        assert!(s.pending_requests().is_empty());
        assert_eq!(s.sink.sent.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_messages_are_dropped() {
        let mut s = stream(1, 2);
        let id = LogId::from_bytes([7; 32]);
        s.write(WireMessage::new(id, 11, Payload::Keys(vec![])));
        s.write(WireMessage::new(id, 5, Payload::Keys(vec![])));
        s.write(WireMessage::new(id, 8, Payload::Keys(vec![])));
        drain(&mut s).await;

        assert!(!s.is_ended());
        assert!(s.sink.sent.is_empty());
        assert_eq!(s.active_topics(), 0);
    }

    #[tokio::test]
    async fn test_peer_initiated_topic_is_created_lazily() {
        let mut s = stream(1, 2);
        let id = LogId::from_bytes([7; 32]);
        s.write(WireMessage::new(id, 1, Payload::Range(Range::new(1, 3))));
        drain(&mut s).await;

        assert_eq!(s.sink.sent.len(), 1);
        assert_eq!(s.sink.sent[0].phase, 2);
        assert_eq!(s.active_topics(), 1);
    }

    #[tokio::test]
    async fn test_empty_remote_range_finishes_topic() {
        let mut s = stream(1, 2);
        let id = LogId::from_bytes([7; 32]);
        s.write(WireMessage::new(id, 1, Payload::Range(Range::EMPTY)));
        drain(&mut s).await;

        assert_eq!(s.sink.sent.len(), 1);
        assert_eq!(s.sink.sent[0].phase, 10);
        assert_eq!(s.active_topics(), 0);
    }

    #[tokio::test]
    async fn test_dual_request_tie_break() {
        let id = LogId::from_bytes([7; 32]);
        let low = Keypair::from_seed(&[1; 32]).public_key();
        let high = Keypair::from_seed(&[2; 32]).public_key();
        let (small, large) = if low < high { (1, 2) } else { (2, 1) };

        // The side with the smaller id ignores the peer's opening.
        let mut keeper = stream(small, large);
        keeper.request(id);
        drain(&mut keeper).await;
        keeper.write(WireMessage::new(id, 1, Payload::Range(Range::EMPTY)));
        drain(&mut keeper).await;
        assert_eq!(keeper.sink.sent.len(), 1);

        // The side with the larger id answers it.
        let mut yielder = stream(large, small);
        yielder.request(id);
        drain(&mut yielder).await;
        yielder.write(WireMessage::new(id, 1, Payload::Range(Range::new(1, 2))));
        drain(&mut yielder).await;
        let phases: Vec<u8> = yielder.sink.sent.iter().map(|m| m.phase).collect();
        assert_eq!(phases, vec![1, 2]);
    }

    struct BrokenStore;

    #[async_trait]
    impl LogAdapter for BrokenStore {
        async fn have_range(&self, _id: &LogId) -> std::result::Result<Range, StoreError> {
            Ok(Range::new(1, 5))
        }

        fn want_range(&self, _id: &LogId, _local: Range, remote: Range) -> Result<Range> {
            Ok(remote)
        }

        fn estimate_msg_count(&self, _range: Range) -> usize {
            5
        }

        async fn msgs_in(&self, _id: &LogId, _range: Range) -> std::result::Result<Vec<Msg>, StoreError> {
            Err(StoreError::InvalidData("disk on fire".into()))
        }

        async fn get_msgs(&self, _keys: &[MsgKey]) -> std::result::Result<Vec<Msg>, StoreError> {
            Err(StoreError::InvalidData("disk on fire".into()))
        }

        async fn commit(&self, _id: &LogId, _msgs: Vec<MsgValue>) -> std::result::Result<(), CommitError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_fault_aborts_stream() {
        let mut s = SyncStream::new(
            "feedSync",
            Keypair::from_seed(&[1; 32]).public_key(),
            Keypair::from_seed(&[2; 32]).public_key(),
            Algorithm::new(Arc::new(BrokenStore), SketchConfig::default()),
            VecSink::default(),
        );
        let other = LogId::from_bytes([8; 32]);
        s.request(other);
        s.write(WireMessage::new(LogId::from_bytes([7; 32]), 1, Payload::Range(Range::EMPTY)));
        drain(&mut s).await;

        assert!(s.is_ended());
        assert!(s.sink.ended_with_error);
        assert!(matches!(s.take_failure(), Some(SyncError::Store(_))));
        assert_eq!(s.active_topics(), 0);
    }

    /// Feed adapter whose have-range lookups for one topic each take a gate permit.
    struct GatedFeed {
        inner: FeedAdapter<MemoryStore>,
        gated: LogId,
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl LogAdapter for GatedFeed {
        async fn have_range(&self, id: &LogId) -> std::result::Result<Range, StoreError> {
            if *id == self.gated {
                self.gate.acquire().await.unwrap().forget();
            }
            self.inner.have_range(id).await
        }

        fn want_range(&self, id: &LogId, local: Range, remote: Range) -> Result<Range> {
            self.inner.want_range(id, local, remote)
        }

        fn estimate_msg_count(&self, range: Range) -> usize {
            self.inner.estimate_msg_count(range)
        }

        async fn msgs_in(&self, id: &LogId, range: Range) -> std::result::Result<Vec<Msg>, StoreError> {
            self.inner.msgs_in(id, range).await
        }

        async fn get_msgs(&self, keys: &[MsgKey]) -> std::result::Result<Vec<Msg>, StoreError> {
            self.inner.get_msgs(keys).await
        }

        async fn commit(&self, id: &LogId, msgs: Vec<MsgValue>) -> std::result::Result<(), CommitError> {
            self.inner.commit(id, msgs).await
        }
    }

    #[tokio::test]
    async fn test_busy_topic_defers_and_replays_in_order() {
        let kp = Keypair::from_seed(&[5; 32]);
        let mut chain: Vec<MsgValue> = Vec::new();
        for seq in 1..=5 {
            let mut builder = dagsync_core::MsgBuilder::new(kp.public_key(), seq).text(format!("#{}", seq));
            if let Some(prev) = chain.last() {
                builder = builder.previous(prev.key());
            }
            chain.push(builder.sign(&kp));
        }
        let store = Arc::new(MemoryStore::new());
        for value in &chain[..3] {
            store.insert_msg(value).await.unwrap();
        }
        let slow = LogId::from(kp.public_key());
        let quick = LogId::from_bytes([9; 32]);
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let adapter = GatedFeed {
            inner: FeedAdapter::new(Arc::clone(&store), FeedSyncConfig::default()),
            gated: slow,
            gate: Arc::clone(&gate),
        };
        let mut s = SyncStream::new(
            "feedSync",
            Keypair::from_seed(&[1; 32]).public_key(),
            Keypair::from_seed(&[2; 32]).public_key(),
            Algorithm::new(Arc::new(adapter), SketchConfig::default()),
            VecSink::default(),
        );

        s.write(WireMessage::new(slow, 1, Payload::Range(Range::new(1, 5))));
        s.write(WireMessage::new(quick, 1, Payload::Range(Range::new(1, 3))));
        // Queued behind the slow topic's first round: its last batch, then a fresh opening.
        s.write(WireMessage::new(slow, 10, Payload::Msgs(chain[3..].to_vec())));
        s.write(WireMessage::new(slow, 1, Payload::Range(Range::EMPTY)));

        let joined = s.next_job().await.unwrap();
        s.complete(joined);
        assert_eq!(s.sink.sent.len(), 1);
        assert_eq!(s.sink.sent[0].id, quick);
        assert_eq!(s.active_topics(), 2);

        gate.add_permits(2);
        drain(&mut s).await;

        let slow_sent: Vec<&WireMessage> = s.sink.sent.iter().filter(|m| m.id == slow).collect();
        let phases: Vec<u8> = slow_sent.iter().map(|m| m.phase).collect();
        assert_eq!(phases, vec![2, 10]);
        // The batch was committed before the reopening was answered.
        assert_eq!(slow_sent[1].payload, Payload::Msgs(chain.clone()));
        assert!(!s.is_ended());
    }

    #[tokio::test]
    async fn test_channel_sink_buffers_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut sink = ChannelSink::new(tx);
        let id = LogId::from_bytes([7; 32]);
        assert!(!sink.is_paused());

        sink.write(WireMessage::new(id, 1, Payload::Range(Range::EMPTY))).unwrap();
        assert!(sink.is_paused());
        sink.write(WireMessage::new(id, 10, Payload::Msgs(vec![]))).unwrap();
        assert_eq!(sink.backlog_len(), 1);

        assert_eq!(rx.recv().await.unwrap().phase, 1);
        sink.flush();
        assert_eq!(sink.backlog_len(), 0);
        assert_eq!(rx.recv().await.unwrap().phase, 10);

        sink.end(None);
        assert!(sink.is_ended());
        assert!(matches!(
            sink.write(WireMessage::new(id, 1, Payload::Range(Range::EMPTY))),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_channel_sink_backlog_is_capped() {
        let (tx, _rx) = mpsc::channel(1);
        let mut sink = ChannelSink::with_backlog_limit(tx, 2);
        let id = LogId::from_bytes([7; 32]);
        let msg = || WireMessage::new(id, 10, Payload::Msgs(vec![]));

        sink.write(msg()).unwrap();
        sink.write(msg()).unwrap();
        sink.write(msg()).unwrap();
        assert_eq!(sink.backlog_len(), 2);
        let err = sink.write(msg()).unwrap_err();
        assert!(matches!(err, TransportError::BacklogFull { limit: 2 }));
        assert!(err.severity().aborts());
    }

    #[tokio::test]
    async fn test_backlog_overflow_aborts_stream() {
        let (tx, _rx) = mpsc::channel(1);
        let adapter = Arc::new(FeedAdapter::new(
            Arc::new(MemoryStore::new()),
            FeedSyncConfig::default(),
        ));
        let mut s = SyncStream::new(
            "feedSync",
            Keypair::from_seed(&[1; 32]).public_key(),
            Keypair::from_seed(&[2; 32]).public_key(),
            Algorithm::new(adapter, SketchConfig::default()),
            ChannelSink::with_backlog_limit(tx, 1),
        );
        // Three peer-opened topics, each answered with a phase 10.
        for byte in 1..=3 {
            s.write(WireMessage::new(LogId::from_bytes([byte; 32]), 1, Payload::Range(Range::EMPTY)));
        }
        drain(&mut s).await;

        assert!(s.is_ended());
        assert!(matches!(
            s.take_failure(),
            Some(SyncError::Transport(TransportError::BacklogFull { limit: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_store_backed_stream_answers_with_messages() {
        let kp = Keypair::from_seed(&[5; 32]);
        let store = Arc::new(MemoryStore::new());
        let first = dagsync_core::MsgBuilder::new(kp.public_key(), 1).text("hi").sign(&kp);
        store.insert_msg(&first).await.unwrap();
        let adapter = Arc::new(FeedAdapter::new(store, FeedSyncConfig::default()));
        let mut s = SyncStream::new(
            "feedSync",
            Keypair::from_seed(&[1; 32]).public_key(),
            Keypair::from_seed(&[2; 32]).public_key(),
            Algorithm::new(adapter, SketchConfig::default()),
            VecSink::default(),
        );

        s.write(WireMessage::new(LogId::from(kp.public_key()), 1, Payload::Range(Range::EMPTY)));
        drain(&mut s).await;
        assert_eq!(s.sink.sent[0].payload, Payload::Msgs(vec![first]));
    }
}
