//! Wire messages exchanged by two sync streams.
//!
//! Every message names the log being reconciled, the protocol phase (1..=10)
//! and a phase-specific payload:
//!
//! | Phase | Payload |
//! |-------|---------|
//! | 1 | have-range |
//! | 2 | have-range and want-range |
//! | 3 | want-range and round-0 sketch |
//! | 4..=7 | sketch and sendable keys |
//! | 8 | sendable keys |
//! | 9, 10 | message values |

use serde::{Deserialize, Serialize};

use dagsync_core::{LogId, MsgKey, MsgValue, Range};

use crate::error::{Result, SyncError};
use crate::sketch::BloomSketch;

/// First protocol phase.
pub const FIRST_PHASE: u8 = 1;
/// Terminal protocol phase.
pub const LAST_PHASE: u8 = 10;

/// Message size limits.
pub mod limits {
    /// Max keys in one key list.
    pub const MAX_KEYS_PER_MESSAGE: usize = 100_000;
    /// Max message values in one payload.
    pub const MAX_MSGS_PER_MESSAGE: usize = 100_000;
    /// Max bits in a remote sketch.
    pub const MAX_SKETCH_BITS: u64 = 1 << 26;
}

/// Phase-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Range(Range),
    HaveWant { have: Range, want: Range },
    WantSketch { want: Range, sketch: BloomSketch },
    SketchKeys { sketch: BloomSketch, keys: Vec<MsgKey> },
    Keys(Vec<MsgKey>),
    Msgs(Vec<MsgValue>),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Range(_) => "range",
            Payload::HaveWant { .. } => "have+want",
            Payload::WantSketch { .. } => "want+sketch",
            Payload::SketchKeys { .. } => "sketch+keys",
            Payload::Keys(_) => "keys",
            Payload::Msgs(_) => "msgs",
        }
    }
}

/// One protocol message for one log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: LogId,
    pub phase: u8,
    pub payload: Payload,
}

impl WireMessage {
    pub fn new(id: LogId, phase: u8, payload: Payload) -> Self {
        Self { id, phase, payload }
    }

    /// Check the phase number, that the payload shape matches the phase, and
    /// size limits.
    pub fn validate(&self) -> Result<()> {
        let shape_ok = matches!(
            (self.phase, &self.payload),
            (1, Payload::Range(_))
                | (2, Payload::HaveWant { .. })
                | (3, Payload::WantSketch { .. })
                | (4..=7, Payload::SketchKeys { .. })
                | (8, Payload::Keys(_))
                | (9 | 10, Payload::Msgs(_))
        );
        if !(FIRST_PHASE..=LAST_PHASE).contains(&self.phase) {
            return Err(SyncError::Protocol(format!("unknown phase {}", self.phase)));
        }
        if !shape_ok {
            return Err(SyncError::Protocol(format!(
                "phase {} cannot carry a {} payload",
                self.phase,
                self.payload.kind()
            )));
        }

        match &self.payload {
            Payload::WantSketch { sketch, .. } => sketch.validate(limits::MAX_SKETCH_BITS)?,
            Payload::SketchKeys { sketch, keys } => {
                sketch.validate(limits::MAX_SKETCH_BITS)?;
                check_keys(keys)?;
            }
            Payload::Keys(keys) => check_keys(keys)?,
            Payload::Msgs(msgs) if msgs.len() > limits::MAX_MSGS_PER_MESSAGE => {
                return Err(SyncError::Protocol(format!("{} msgs in one payload", msgs.len())));
            }
            _ => {}
        }
        Ok(())
    }
}

fn check_keys(keys: &[MsgKey]) -> Result<()> {
    if keys.len() > limits::MAX_KEYS_PER_MESSAGE {
        return Err(SyncError::Protocol(format!("{} keys in one payload", keys.len())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SketchConfig;

    fn sketch() -> BloomSketch {
        BloomSketch::with_capacity(4, &SketchConfig::default())
    }

    #[test]
    fn test_valid_shapes() {
        let id = LogId::from_bytes([1; 32]);
        let cases = vec![
            WireMessage::new(id, 1, Payload::Range(Range::new(1, 3))),
            WireMessage::new(id, 2, Payload::HaveWant { have: Range::EMPTY, want: Range::EMPTY }),
            WireMessage::new(id, 3, Payload::WantSketch { want: Range::new(0, 9), sketch: sketch() }),
            WireMessage::new(id, 7, Payload::SketchKeys { sketch: sketch(), keys: vec![] }),
            WireMessage::new(id, 8, Payload::Keys(vec![MsgKey([2; 32])])),
            WireMessage::new(id, 10, Payload::Msgs(vec![])),
        ];
        for msg in cases {
            msg.validate().unwrap();
        }
    }

    #[test]
    fn test_unknown_phase() {
        let msg = WireMessage::new(LogId::from_bytes([1; 32]), 11, Payload::Keys(vec![]));
        let err = msg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown phase 11"));
        assert!(!err.is_fatal());

        let msg = WireMessage::new(LogId::from_bytes([1; 32]), 0, Payload::Range(Range::EMPTY));
        assert!(msg.validate().is_err());
    }

    #[test]
    fn test_mismatched_payload() {
        let msg = WireMessage::new(LogId::from_bytes([1; 32]), 8, Payload::Range(Range::EMPTY));
        assert!(matches!(msg.validate(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn test_too_many_keys() {
        let keys = vec![MsgKey([0; 32]); limits::MAX_KEYS_PER_MESSAGE + 1];
        let msg = WireMessage::new(LogId::from_bytes([1; 32]), 8, Payload::Keys(keys));
        assert!(msg.validate().is_err());
    }
}
