//! Per-topic reconciliation state machine.
//!
//! One [`TopicState`] tracks one log between two peers. The side that asked
//! for the log (the initiator) sends the odd phases, the other side the even
//! ones:
//!
//! ```text
//! Initiator                                   Responder
//!   |-- 1  have ------------------------------->|
//!   |<-- 2  have, want -------------------------|
//!   |-- 3  want, sketch(0) -------------------->|
//!   |<-- 4  sketch(0), keys --------------------|
//!   |-- 5  sketch(1), keys -------------------->|
//!   |<-- 6  sketch(1), keys --------------------|
//!   |-- 7  sketch(2), keys -------------------->|
//!   |<-- 8  keys -------------------------------|
//!   |-- 9  msgs ------------------------------->|
//!   |<-- 10 msgs -------------------------------|
//! ```
//!
//! If either have-range is empty the exchange stops early: whoever holds
//! messages pushes everything in the window as phase 10, with no sketches.
//!
//! Each side sketches what it holds over its own want-range and diffs what
//! it holds over the peer's want-range. Sketches carry the round of the
//! phase they travel in, three rounds (0, 1, 2) at most.

use std::collections::HashSet;

use dagsync_core::{LogId, MsgKey, MsgValue, Range};

use crate::adapter::LogAdapter;
use crate::algorithm::Algorithm;
use crate::error::{Result, SyncError};
use crate::messages::{Payload, WireMessage, FIRST_PHASE, LAST_PHASE};
use crate::sketch::BloomSketch;

/// What the stream must do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Send this message and keep the topic.
    Reply(WireMessage),
    /// The exchange is over: send the final message, if any, and erase the topic.
    Finish(Option<WireMessage>),
}

/// Reconciliation state for one topic on one connection.
#[derive(Debug, Clone, Default)]
pub struct TopicState {
    pub local_have: Range,
    pub local_want: Range,
    pub remote_have: Range,
    pub remote_want: Range,
    /// Keys the peer announced it will send.
    receivable: HashSet<MsgKey>,
    /// Keys the peer probably lacks. Only grows until the topic is erased.
    sendable: HashSet<MsgKey>,
    initiated: bool,
    /// Last phase sent for this topic, 0 before any.
    last_sent: u8,
}

/// Sketch round carried by a message of `phase` (3..=7).
fn round_of(phase: u8) -> u32 {
    u32::from(phase.saturating_sub(3) / 2)
}

fn sorted(keys: &HashSet<MsgKey>) -> Vec<MsgKey> {
    let mut out: Vec<MsgKey> = keys.iter().copied().collect();
    out.sort_unstable();
    out
}

impl TopicState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initiator(&self) -> bool {
        self.initiated
    }

    pub fn last_sent(&self) -> u8 {
        self.last_sent
    }

    pub fn sendable_count(&self) -> usize {
        self.sendable.len()
    }

    pub fn receivable_count(&self) -> usize {
        self.receivable.len()
    }

    /// Whether an inbound message of `phase` can follow what was last sent.
    pub fn accepts(&self, phase: u8) -> bool {
        match self.last_sent {
            0 => phase == FIRST_PHASE,
            // The peer may answer a have-range with a short-circuit payload.
            1 | 2 => phase == self.last_sent + 1 || phase == LAST_PHASE,
            sent => phase == sent + 1,
        }
    }

    fn emit(&mut self, id: LogId, phase: u8, payload: Payload) -> Transition {
        self.last_sent = phase;
        Transition::Reply(WireMessage::new(id, phase, payload))
    }

    fn finish(&mut self, id: LogId, msgs: Vec<MsgValue>) -> Transition {
        self.last_sent = LAST_PHASE;
        Transition::Finish(Some(WireMessage::new(id, LAST_PHASE, Payload::Msgs(msgs))))
    }

    /// Open the exchange as initiator.
    pub async fn start<A: LogAdapter>(&mut self, algo: &Algorithm<A>, id: &LogId) -> Result<Transition> {
        self.local_have = algo.adapter().have_range(id).await?;
        self.initiated = true;
        tracing::debug!(topic = %id, have = ?self.local_have, "OUT phase 1: local range");
        Ok(self.emit(*id, 1, Payload::Range(self.local_have)))
    }

    /// Apply one inbound message.
    pub async fn advance<A: LogAdapter>(&mut self, algo: &Algorithm<A>, msg: WireMessage) -> Result<Transition> {
        if !self.accepts(msg.phase) {
            return Err(SyncError::Protocol(format!(
                "phase {} cannot follow phase {}",
                msg.phase, self.last_sent
            )));
        }
        let id = msg.id;
        match (msg.phase, msg.payload) {
            (1, Payload::Range(remote_have)) => self.on_remote_have(algo, id, remote_have).await,
            (2, Payload::HaveWant { have, want }) => self.on_remote_have_want(algo, id, have, want).await,
            (3, Payload::WantSketch { want, sketch }) => self.on_first_sketch(algo, id, want, sketch).await,
            (phase @ 4..=6, Payload::SketchKeys { sketch, keys }) => {
                self.on_sketch(algo, id, phase, sketch, keys).await
            }
            (7, Payload::SketchKeys { sketch, keys }) => self.on_last_sketch(algo, id, sketch, keys).await,
            (8, Payload::Keys(keys)) => self.on_final_keys(algo, id, keys).await,
            (9, Payload::Msgs(msgs)) => self.on_msgs_request(algo, id, msgs).await,
            (10, Payload::Msgs(msgs)) => self.on_msgs_response(algo, id, msgs).await,
            (phase, _) => Err(SyncError::Protocol(format!("unexpected payload for phase {}", phase))),
        }
    }

    async fn msgs_in<A: LogAdapter>(&self, algo: &Algorithm<A>, id: &LogId, range: Range) -> Result<Vec<MsgValue>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(algo
            .adapter()
            .msgs_in(id, range)
            .await?
            .into_iter()
            .map(|msg| msg.value)
            .collect())
    }

    async fn sendable_msgs<A: LogAdapter>(&self, algo: &Algorithm<A>) -> Result<Vec<MsgValue>> {
        if self.sendable.is_empty() {
            return Ok(Vec::new());
        }
        Ok(algo
            .adapter()
            .get_msgs(&sorted(&self.sendable))
            .await?
            .into_iter()
            .map(|msg| msg.value)
            .collect())
    }

    /// Phase 1 in: the initiator's have-range.
    async fn on_remote_have<A: LogAdapter>(&mut self, algo: &Algorithm<A>, id: LogId, remote_have: Range) -> Result<Transition> {
        self.remote_have = remote_have;
        if remote_have.is_empty() {
            // Send only what the empty peer would want of our log.
            let local_have = algo.adapter().have_range(&id).await?;
            let window = algo.adapter().want_range(&id, Range::EMPTY, local_have)?;
            let msgs = self.msgs_in(algo, &id, window).await?;
            tracing::debug!(topic = %id, window = ?window, count = msgs.len(), "IN phase 1: remote range empty, OUT phase 10");
            return Ok(self.finish(id, msgs));
        }

        self.local_have = algo.adapter().have_range(&id).await?;
        self.local_want = algo.adapter().want_range(&id, self.local_have, remote_have)?;
        tracing::debug!(
            topic = %id,
            remote_have = ?remote_have,
            have = ?self.local_have,
            want = ?self.local_want,
            "IN phase 1, OUT phase 2"
        );
        let payload = Payload::HaveWant {
            have: self.local_have,
            want: self.local_want,
        };
        Ok(self.emit(id, 2, payload))
    }

    /// Phase 2 in: the responder's have- and want-range.
    async fn on_remote_have_want<A: LogAdapter>(
        &mut self,
        algo: &Algorithm<A>,
        id: LogId,
        remote_have: Range,
        remote_want: Range,
    ) -> Result<Transition> {
        self.remote_have = remote_have;
        self.remote_want = remote_want;
        if remote_have.is_empty() {
            let msgs = self.msgs_in(algo, &id, remote_want).await?;
            tracing::debug!(topic = %id, count = msgs.len(), "IN phase 2: remote range empty, OUT phase 10");
            return Ok(self.finish(id, msgs));
        }

        self.local_want = algo.adapter().want_range(&id, self.local_have, remote_have)?;
        let sketch = algo.build_sketch(&id, 0, self.local_want, &self.receivable).await?;
        tracing::debug!(topic = %id, want = ?self.local_want, "IN phase 2, OUT phase 3: sketch round 0");
        let payload = Payload::WantSketch {
            want: self.local_want,
            sketch,
        };
        Ok(self.emit(id, 3, payload))
    }

    /// Phase 3 in: the initiator's want-range and first sketch.
    async fn on_first_sketch<A: LogAdapter>(
        &mut self,
        algo: &Algorithm<A>,
        id: LogId,
        remote_want: Range,
        remote_sketch: BloomSketch,
    ) -> Result<Transition> {
        self.remote_want = remote_want;
        let missing = algo.diff_against_sketch(&id, 0, remote_want, &remote_sketch).await?;
        self.sendable.extend(missing);
        let sketch = algo.build_sketch(&id, 0, self.local_want, &self.receivable).await?;
        tracing::debug!(topic = %id, sendable = self.sendable.len(), "IN phase 3, OUT phase 4: sketch round 0");
        let payload = Payload::SketchKeys {
            sketch,
            keys: sorted(&self.sendable),
        };
        Ok(self.emit(id, 4, payload))
    }

    /// Phases 4 to 6 in: diff the peer's sketch, answer with the next one.
    async fn on_sketch<A: LogAdapter>(
        &mut self,
        algo: &Algorithm<A>,
        id: LogId,
        phase: u8,
        remote_sketch: BloomSketch,
        keys: Vec<MsgKey>,
    ) -> Result<Transition> {
        self.receivable.extend(keys);
        let missing = algo
            .diff_against_sketch(&id, round_of(phase), self.remote_want, &remote_sketch)
            .await?;
        self.sendable.extend(missing);

        let next = phase + 1;
        let round = round_of(next);
        let sketch = algo.build_sketch(&id, round, self.local_want, &self.receivable).await?;
        tracing::debug!(
            topic = %id,
            sendable = self.sendable.len(),
            receivable = self.receivable.len(),
            "IN phase {}, OUT phase {}: sketch round {}",
            phase,
            next,
            round
        );
        let payload = Payload::SketchKeys {
            sketch,
            keys: sorted(&self.sendable),
        };
        Ok(self.emit(id, next, payload))
    }

    /// Phase 7 in: last diff, no further sketch.
    async fn on_last_sketch<A: LogAdapter>(
        &mut self,
        algo: &Algorithm<A>,
        id: LogId,
        remote_sketch: BloomSketch,
        keys: Vec<MsgKey>,
    ) -> Result<Transition> {
        self.receivable.extend(keys);
        let missing = algo
            .diff_against_sketch(&id, round_of(7), self.remote_want, &remote_sketch)
            .await?;
        self.sendable.extend(missing);
        tracing::debug!(topic = %id, sendable = self.sendable.len(), "IN phase 7, OUT phase 8: final keys");
        Ok(self.emit(id, 8, Payload::Keys(sorted(&self.sendable))))
    }

    /// Phase 8 in: the responder's final keys. Send ours as messages.
    async fn on_final_keys<A: LogAdapter>(&mut self, algo: &Algorithm<A>, id: LogId, keys: Vec<MsgKey>) -> Result<Transition> {
        self.receivable.extend(keys);
        let msgs = self.sendable_msgs(algo).await?;
        tracing::debug!(topic = %id, count = msgs.len(), "IN phase 8, OUT phase 9");
        Ok(self.emit(id, 9, Payload::Msgs(msgs)))
    }

    /// Phase 9 in: commit the initiator's messages, answer with ours and finish.
    async fn on_msgs_request<A: LogAdapter>(&mut self, algo: &Algorithm<A>, id: LogId, msgs: Vec<MsgValue>) -> Result<Transition> {
        tracing::debug!(topic = %id, count = msgs.len(), "IN phase 9");
        algo.adapter().commit(&id, msgs).await?;
        let ours = self.sendable_msgs(algo).await?;
        tracing::debug!(topic = %id, count = ours.len(), "OUT phase 10");
        Ok(self.finish(id, ours))
    }

    /// Phase 10 in: commit and finish.
    async fn on_msgs_response<A: LogAdapter>(&mut self, algo: &Algorithm<A>, id: LogId, msgs: Vec<MsgValue>) -> Result<Transition> {
        tracing::debug!(topic = %id, count = msgs.len(), "IN phase 10");
        algo.adapter().commit(&id, msgs).await?;
        self.last_sent = LAST_PHASE;
        Ok(Transition::Finish(None))
    }
}
