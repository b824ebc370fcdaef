//! Inclusive ranges over a log's ordering key.
//!
//! Feeds are ordered by sequence number, threads by milliseconds elapsed since
//! the root message. A range with `min > max` is the empty range; it is a
//! normal value, not an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An inclusive `[min, max]` interval.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub min: u64,
    pub max: u64,
}

impl Range {
    /// The canonical empty range.
    pub const EMPTY: Self = Self { min: 1, max: 0 };

    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub const fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub const fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }

    /// Number of positions covered. Zero for the empty range.
    pub const fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.max - self.min).saturating_add(1)
        }
    }

    /// Smallest range covering every value yielded by `values`.
    pub fn spanning<I: IntoIterator<Item = u64>>(values: I) -> Self {
        values.into_iter().fold(Self::EMPTY, |acc, v| {
            if acc.is_empty() {
                Self::new(v, v)
            } else {
                Self::new(acc.min.min(v), acc.max.max(v))
            }
        })
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}
