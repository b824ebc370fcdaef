//! Set reconciliation over Bloom sketches.
//!
//! Stateless: round bookkeeping lives in the session. Each operation
//! enumerates the adapter's messages in a range afresh.

use std::collections::HashSet;
use std::sync::Arc;

use dagsync_core::{LogId, MsgKey, Range};

use crate::adapter::LogAdapter;
use crate::config::SketchConfig;
use crate::error::Result;
use crate::sketch::BloomSketch;

/// Elements assumed for an empty range, so extra keys still get a usable sketch.
const EMPTY_RANGE_ESTIMATE: usize = 2;

pub struct Algorithm<A> {
    adapter: Arc<A>,
    config: SketchConfig,
}

impl<A> Clone for Algorithm<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            config: self.config.clone(),
        }
    }
}

impl<A: LogAdapter> Algorithm<A> {
    pub fn new(adapter: Arc<A>, config: SketchConfig) -> Self {
        Self { adapter, config }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn estimate_count(&self, range: Range) -> usize {
        if range.is_empty() {
            EMPTY_RANGE_ESTIMATE
        } else {
            self.adapter.estimate_msg_count(range)
        }
    }

    /// Sketch of the local keys of `id` in `range`, tagged with `round`,
    /// plus every key in `extra_keys`.
    pub async fn build_sketch(
        &self,
        id: &LogId,
        round: u32,
        range: Range,
        extra_keys: &HashSet<MsgKey>,
    ) -> Result<BloomSketch> {
        let expected = self.estimate_count(range) + extra_keys.len();
        let mut sketch = BloomSketch::with_capacity(expected, &self.config);
        if !range.is_empty() {
            for msg in self.adapter.msgs_in(id, range).await? {
                sketch.insert(round, &msg.key);
            }
        }
        for key in extra_keys {
            sketch.insert(round, key);
        }
        Ok(sketch)
    }

    /// Local keys of `id` in `range` that `remote` probably lacks.
    pub async fn diff_against_sketch(
        &self,
        id: &LogId,
        round: u32,
        range: Range,
        remote: &BloomSketch,
    ) -> Result<Vec<MsgKey>> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .adapter
            .msgs_in(id, range)
            .await?
            .into_iter()
            .filter(|msg| !remote.contains(round, &msg.key))
            .map(|msg| msg.key)
            .collect())
    }
}
