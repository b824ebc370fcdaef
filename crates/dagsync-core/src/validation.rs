//! Validation of untrusted message values.
//!
//! Peers are untrusted: every value received over the wire is checked here
//! before it is written to a store.

use crate::canonical::signing_bytes;
use crate::error::ValidationError;
use crate::msg::{Msg, MsgValue};

/// Upper bound on message text, in bytes.
pub const MAX_TEXT_LEN: usize = 8192;

/// Check structural rules and the author's signature.
pub fn validate_msg(value: &MsgValue) -> Result<(), ValidationError> {
    validate_msg_structure(value)?;
    value
        .author
        .verify(&signing_bytes(value), &value.signature)
        .map_err(|_| ValidationError::SignatureFailed)
}

/// Structural checks only; the signature is not verified.
pub fn validate_msg_structure(value: &MsgValue) -> Result<(), ValidationError> {
    if value.sequence == 0 {
        return Err(ValidationError::ZeroSequence);
    }
    if value.sequence == 1 && value.previous.is_some() {
        return Err(ValidationError::InvalidPrevious {
            seq: 1,
            expected: None,
            got: value.previous,
        });
    }
    if value.content.branch.is_some() && value.content.root.is_none() {
        return Err(ValidationError::BranchWithoutRoot);
    }
    if value.content.text.len() > MAX_TEXT_LEN {
        return Err(ValidationError::TextTooLong { max: MAX_TEXT_LEN });
    }
    Ok(())
}

/// Check that `next` directly follows `prev` in the same feed.
pub fn validate_successor(prev: &Msg, next: &MsgValue) -> Result<(), ValidationError> {
    if next.author != prev.value.author {
        return Err(ValidationError::StructuralError(format!(
            "author changed mid-feed: {} then {}",
            prev.value.author, next.author
        )));
    }
    if next.sequence != prev.value.sequence + 1 || next.previous != Some(prev.key) {
        return Err(ValidationError::InvalidPrevious {
            seq: next.sequence,
            expected: Some(prev.key),
            got: next.previous,
        });
    }
    Ok(())
}
