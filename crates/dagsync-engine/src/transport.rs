//! Duplex transport between two sync streams.
//!
//! A [`Channel`] is one end of an ordered, reliable, bidirectional message
//! pipe. Outbound messages go through a bounded sender, whose capacity is the
//! stream's back-pressure signal. Inbound messages arrive already decoded,
//! with transport faults reported in-band so the driver can grade them by
//! [`Severity`].
//!
//! The transport must not reorder or duplicate messages.

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::messages::WireMessage;

/// How serious a transport fault is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Normal churn: resets, EOF, a peer without the plugin.
    Benign = 1,
    /// Timeouts and skipped frames.
    Minor = 2,
    /// Anything that leaves the connection in an unknown state.
    Severe = 3,
}

impl Severity {
    /// At or above this level the stream is aborted.
    pub const ABORT_THRESHOLD: Severity = Severity::Severe;

    pub fn aborts(self) -> bool {
        self >= Self::ABORT_THRESHOLD
    }
}

/// One end of a duplex message pipe.
#[derive(Debug)]
pub struct Channel {
    pub tx: mpsc::Sender<WireMessage>,
    pub rx: mpsc::Receiver<Result<WireMessage, TransportError>>,
}

/// An in-process pipe for tests and same-process peers.
pub mod memory {
    use super::*;

    /// Two linked channel ends. What one end sends, the other receives.
    ///
    /// Each direction buffers up to `capacity` messages. Must be called from
    /// within a tokio runtime: one forwarding task runs per direction, and
    /// exits once either end is dropped.
    pub fn pipe(capacity: usize) -> (Channel, Channel) {
        let (a_tx, a_out) = mpsc::channel(capacity.max(1));
        let (b_tx, b_out) = mpsc::channel(capacity.max(1));
        let (a_in, a_rx) = mpsc::channel(capacity.max(1));
        let (b_in, b_rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(forward(a_out, b_in));
        tokio::spawn(forward(b_out, a_in));

        (
            Channel { tx: a_tx, rx: a_rx },
            Channel { tx: b_tx, rx: b_rx },
        )
    }

    async fn forward(
        mut from: mpsc::Receiver<WireMessage>,
        to: mpsc::Sender<Result<WireMessage, TransportError>>,
    ) {
        while let Some(msg) = from.recv().await {
            if to.send(Ok(msg)).await.is_err() {
                break;
            }
        }
    }
}
