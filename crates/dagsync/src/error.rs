//! Error types for the node facade.

use dagsync_core::{AuthorId, MsgKey, ValidationError};
use dagsync_engine::{CommitError, SyncError};
use dagsync_store::StoreError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    /// Conflict detected (different message at same feed position).
    #[error("conflict in feed {author} at sequence {sequence}: existing message {existing}")]
    Conflict {
        author: AuthorId,
        sequence: u64,
        existing: MsgKey,
    },

    /// Operation not permitted on current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
