//! Bloom sketch over round-tagged message keys.
//!
//! Each key is hashed together with the reconciliation round, so the same key
//! produces independent bit positions in every round. A false positive in one
//! round does not repeat in the next.

use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};

use dagsync_core::MsgKey;

use crate::config::SketchConfig;
use crate::error::{Result, SyncError};

/// Most hash functions a sketch may declare.
pub const MAX_HASH_COUNT: u32 = 32;

const MIN_BITS: u64 = 64;

/// A serializable Bloom filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomSketch {
    num_bits: u64,
    hash_count: u32,
    bits: Vec<u64>,
}

impl BloomSketch {
    /// An empty sketch sized for `expected` elements.
    pub fn with_capacity(expected: usize, config: &SketchConfig) -> Self {
        let n = (expected.max(1) as f64) * config.size_factor.max(f64::MIN_POSITIVE);
        let (num_bits, hash_count) = match config.hash_count {
            Some(k) => (n.ceil() as u64, k.clamp(1, MAX_HASH_COUNT)),
            None => {
                let p = config.false_positive_rate.clamp(f64::MIN_POSITIVE, 0.5);
                let m = (-n * p.ln() / (LN_2 * LN_2)).ceil();
                let k = ((m / n) * LN_2).round() as u32;
                (m as u64, k.clamp(1, MAX_HASH_COUNT))
            }
        };
        let num_bits = num_bits.clamp(MIN_BITS, config.max_bits.max(MIN_BITS));
        Self {
            num_bits,
            hash_count,
            bits: vec![0; words_for(num_bits)],
        }
    }

    pub fn insert(&mut self, round: u32, key: &MsgKey) {
        for idx in self.positions(round, key) {
            self.bits[(idx / 64) as usize] |= 1 << (idx % 64);
        }
    }

    /// Whether `(round, key)` was probably inserted. Never false for an
    /// inserted item.
    pub fn contains(&self, round: u32, key: &MsgKey) -> bool {
        self.positions(round, key)
            .all(|idx| self.bits[(idx / 64) as usize] & (1 << (idx % 64)) != 0)
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Reject sketches whose shape is inconsistent. Only remote sketches can
    /// be malformed; local ones are always built consistent.
    pub fn validate(&self, max_bits: u64) -> Result<()> {
        if self.num_bits == 0 || self.num_bits > max_bits {
            return Err(SyncError::Protocol(format!(
                "sketch of {} bits outside 1..={}",
                self.num_bits, max_bits
            )));
        }
        if self.hash_count == 0 || self.hash_count > MAX_HASH_COUNT {
            return Err(SyncError::Protocol(format!(
                "sketch declares {} hash functions",
                self.hash_count
            )));
        }
        if self.bits.len() != words_for(self.num_bits) {
            return Err(SyncError::Protocol(format!(
                "sketch has {} words for {} bits",
                self.bits.len(),
                self.num_bits
            )));
        }
        Ok(())
    }

    /// Bit positions for one item, by double hashing a single Blake3 digest.
    fn positions(&self, round: u32, key: &MsgKey) -> impl Iterator<Item = u64> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&round.to_be_bytes());
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&bytes[..8]);
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_le_bytes(h1);
        // odd step so every position in the table is reachable
        let h2 = u64::from_le_bytes(h2) | 1;

        let m = self.num_bits;
        (0..self.hash_count as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }
}

fn words_for(bits: u64) -> usize {
    bits.div_ceil(64) as usize
}
