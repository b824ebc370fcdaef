//! Error types for dagsync core.

use thiserror::Error;

use crate::types::MsgKey;

/// Errors raised while encoding, decoding or signing messages.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for untrusted message values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("sequence numbers start at 1, got 0")]
    ZeroSequence,

    #[error("invalid previous link at sequence {seq}: expected {expected:?}, got {got:?}")]
    InvalidPrevious {
        seq: u64,
        expected: Option<MsgKey>,
        got: Option<MsgKey>,
    },

    #[error("reply branch set without a thread root")]
    BranchWithoutRoot,

    #[error("message text exceeds {max} bytes")]
    TextTooLong { max: usize },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::MalformedMessage(msg) | CoreError::DecodingError(msg) => {
                ValidationError::StructuralError(msg)
            }
        }
    }
}
