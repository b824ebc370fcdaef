//! # dagsync core
//!
//! Pure primitives shared by every dagsync crate: identifiers, ranges, signed
//! log messages and their canonical encoding.
//!
//! This crate performs no I/O.
//!
//! ## Key Types
//!
//! - [`MsgValue`] - a signed, immutable log entry
//! - [`MsgKey`] - content address of a message (Blake3 of its canonical bytes)
//! - [`LogId`] - identifies a replicated log: an author's feed or a thread
//! - [`Range`] - inclusive interval over a log's ordering key

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod msg;
pub mod range;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, decode_msg_value, signing_bytes};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use msg::{Msg, MsgBuilder, MsgContent, MsgValue};
pub use range::Range;
pub use types::{AuthorId, LogId, MsgKey};
pub use validation::{validate_msg, validate_msg_structure, validate_successor, MAX_TEXT_LEN};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Clocks set before 1970 read as zero.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
