//! Error types for the sync engine.
//!
//! Errors are split by who is at fault. Protocol violations by the peer are
//! logged and dropped; everything that leaves a session in an unknown state
//! (store faults, commit faults, broken range contracts, severe transport
//! errors) is fatal and tears the stream down.

use std::io;

use thiserror::Error;

use dagsync_core::AuthorId;
use dagsync_store::StoreError;

use crate::transport::Severity;

/// Errors raised by the duplex transport underneath a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer does not expose this sync plugin.
    #[error("peer does not support {0}")]
    MethodMissing(String),

    /// A frame arrived that could not be decoded. The frame is skipped.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A frame announced a length above the configured limit. The frame is skipped.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// Outbound messages piled up past the sink's backlog limit.
    #[error("outbound backlog exceeded {limit} messages")]
    BacklogFull { limit: usize },

    #[error("channel closed")]
    Closed,
}

impl TransportError {
    /// How serious this error is.
    ///
    /// Connection resets, aborts, broken pipes and EOF are the normal noise
    /// of peers coming and going. Timeouts and bad frames are minor. A
    /// backlog overflow, like anything else, is severe.
    pub fn severity(&self) -> Severity {
        match self {
            TransportError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::NotConnected => Severity::Benign,
                io::ErrorKind::TimedOut => Severity::Minor,
                _ => Severity::Severe,
            },
            TransportError::MethodMissing(_) | TransportError::Closed => Severity::Benign,
            TransportError::Malformed(_) | TransportError::FrameTooLarge { .. } => Severity::Minor,
            TransportError::BacklogFull { .. } => Severity::Severe,
        }
    }

    /// True for bad frames: the connection is still usable after skipping them.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            TransportError::Malformed(_) | TransportError::FrameTooLarge { .. }
        )
    }
}

/// Errors raised while persisting received messages.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("store rejected write: {0}")]
    Store(#[from] StoreError),

    /// A different message already occupies this feed position.
    #[error("feed {author} already holds a different message at sequence {sequence}")]
    Conflict { author: AuthorId, sequence: u64 },
}

/// Errors that can occur during sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed phase or payload from the peer.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A peer reported a range that the adapter's strategy forbids.
    #[error("range contract violated: {0}")]
    RangeContract(String),

    /// Store lookup failed while materializing messages.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A background job panicked or was cancelled.
    #[error("job failed: {0}")]
    Job(String),
}

impl SyncError {
    /// Whether this error must abort the stream.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Protocol(_) => false,
            SyncError::Transport(e) => e.severity() >= Severity::Severe,
            SyncError::RangeContract(_)
            | SyncError::Store(_)
            | SyncError::Commit(_)
            | SyncError::Job(_) => true,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
