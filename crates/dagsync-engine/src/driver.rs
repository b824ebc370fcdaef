//! Event loop driving one [`SyncStream`] over a [`ChannelSink`].
//!
//! The loop waits on four sources at once: inbound messages from the peer,
//! local control requests, finished transition jobs, and outbound capacity
//! while the sink is paused. Each event is handled to completion before the
//! next one is awaited.

use tokio::sync::mpsc;

use dagsync_core::LogId;

use crate::adapter::LogAdapter;
use crate::error::{Result, TransportError};
use crate::messages::WireMessage;
use crate::stream::{ChannelSink, JobOutput, Sink, SyncStream};

/// Local commands for a running stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Begin reconciling a topic with the peer.
    Request(LogId),
    /// Close the stream.
    Close,
}

enum Event {
    Job(std::result::Result<JobOutput, tokio::task::JoinError>),
    Ready(bool),
    Control(Option<Control>),
    Inbound(Option<std::result::Result<WireMessage, TransportError>>),
}

async fn capacity(tx: Option<&mpsc::Sender<WireMessage>>) -> bool {
    match tx {
        Some(tx) => tx.reserve().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Run `stream` until the peer goes away, the stream is closed, or it fails.
///
/// Returns the error that aborted the stream, if any.
pub async fn run<A: LogAdapter>(
    mut stream: SyncStream<A, ChannelSink>,
    mut inbound: mpsc::Receiver<std::result::Result<WireMessage, TransportError>>,
    mut control: mpsc::UnboundedReceiver<Control>,
) -> Result<()> {
    let ready_tx = stream.sink().sender();
    let mut control_open = true;
    let mut inbound_open = true;
    tracing::info!(plugin = stream.name(), remote = %stream.remote_id(), "stream opened");

    stream.resume();
    loop {
        if stream.is_ended() {
            break;
        }
        if !inbound_open && !stream.has_jobs() {
            stream.end();
            break;
        }
        let has_jobs = stream.has_jobs();
        let paused = stream.sink().is_paused();

        let event = tokio::select! {
            Some(joined) = stream.next_job(), if has_jobs => Event::Job(joined),
            ok = capacity(ready_tx.as_ref()), if paused => Event::Ready(ok),
            ctl = control.recv(), if control_open => Event::Control(ctl),
            frame = inbound.recv(), if inbound_open => Event::Inbound(frame),
            else => Event::Inbound(None),
        };

        match event {
            Event::Job(joined) => stream.complete(joined),
            Event::Ready(true) => stream.resume(),
            Event::Ready(false) => {
                tracing::debug!(plugin = stream.name(), "outbound channel closed");
                stream.end();
            }
            Event::Control(Some(Control::Request(id))) => stream.request(id),
            Event::Control(Some(Control::Close)) => stream.end(),
            Event::Control(None) => control_open = false,
            Event::Inbound(Some(Ok(msg))) => stream.write(msg),
            Event::Inbound(Some(Err(e))) => on_transport_error(&mut stream, e),
            Event::Inbound(None) => {
                tracing::debug!(plugin = stream.name(), "peer closed the stream");
                inbound_open = false;
            }
        }
    }
    drop(ready_tx);

    match stream.take_failure() {
        Some(err) => {
            tracing::info!(plugin = stream.name(), remote = %stream.remote_id(), error = %err, "stream aborted");
            Err(err)
        }
        None => {
            tracing::info!(plugin = stream.name(), remote = %stream.remote_id(), "stream closed");
            Ok(())
        }
    }
}

fn on_transport_error<A: LogAdapter>(stream: &mut SyncStream<A, ChannelSink>, err: TransportError) {
    if err.is_frame_error() {
        tracing::warn!(plugin = stream.name(), error = %err, "skipping bad frame");
        return;
    }
    if let TransportError::MethodMissing(_) = err {
        tracing::warn!(plugin = stream.name(), remote = %stream.remote_id(), "{}", err);
        stream.end();
        return;
    }
    if err.severity().aborts() {
        tracing::error!(plugin = stream.name(), error = %err, "transport failed");
        stream.abort(err.into());
    } else {
        tracing::debug!(plugin = stream.name(), error = %err, "transport closed");
        stream.end();
    }
}
