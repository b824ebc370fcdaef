//! Configuration for sync streams and the built-in adapters.
//!
//! Every struct implements `Default` and `Deserialize`, so hosts can load
//! partial JSON and fall back to defaults for missing fields.

use serde::{Deserialize, Serialize};

/// Bloom sketch sizing.
///
/// Two sizing modes are supported:
/// - **Target rate** (`hash_count: None`): the sketch is sized for
///   `size_factor × (estimate + extra keys)` elements at `false_positive_rate`,
///   and the hash count is derived from that.
/// - **Fixed hashes** (`hash_count: Some(k)`): the sketch gets
///   `size_factor × (estimate + extra keys)` bits and exactly `k` hash
///   functions; `false_positive_rate` is ignored.
///
/// A false positive withholds a message the peer lacks until the next sync,
/// so the rate trades bandwidth against sync latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub size_factor: f64,
    pub false_positive_rate: f64,
    pub hash_count: Option<u32>,
    /// Upper bound on sketch size in bits.
    pub max_bits: u64,
}

impl SketchConfig {
    /// Fixed-hash sizing: `bits_per_element` bits per expected element, `hash_count` hashes.
    pub fn fixed_hashes(bits_per_element: f64, hash_count: u32) -> Self {
        Self {
            size_factor: bits_per_element,
            hash_count: Some(hash_count),
            ..Self::default()
        }
    }

    pub fn with_size_factor(mut self, factor: f64) -> Self {
        self.size_factor = factor;
        self
    }

    pub fn with_false_positive_rate(mut self, rate: f64) -> Self {
        self.false_positive_rate = rate;
        self
    }

    pub fn with_max_bits(mut self, max_bits: u64) -> Self {
        self.max_bits = max_bits;
        self
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            size_factor: 2.0,
            false_positive_rate: 1e-5,
            hash_count: None,
            max_bits: 1 << 24,
        }
    }
}

/// Per-stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Capacity of the outbound channel before the sink reports back-pressure.
    pub channel_capacity: usize,
    pub sketch: SketchConfig,
    /// Largest frame the codec will accept, in bytes.
    pub max_frame_len: usize,
}

impl SyncConfig {
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_sketch(mut self, sketch: SketchConfig) -> Self {
        self.sketch = sketch;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Parse from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            sketch: SketchConfig::default(),
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}

/// Feed adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSyncConfig {
    /// Most messages kept per author.
    pub limit: u64,
    /// Verify signatures before committing.
    pub validate: bool,
}

impl FeedSyncConfig {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for FeedSyncConfig {
    fn default() -> Self {
        Self {
            limit: 1000,
            validate: true,
        }
    }
}

/// Thread adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadSyncConfig {
    pub estimate_floor: usize,
    pub estimate_ceiling: usize,
    /// Verify signatures before committing.
    pub validate: bool,
}

impl Default for ThreadSyncConfig {
    fn default() -> Self {
        Self {
            estimate_floor: 5,
            estimate_ceiling: 200,
            validate: true,
        }
    }
}
