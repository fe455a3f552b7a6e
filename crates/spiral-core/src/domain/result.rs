//! Run history and final results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::mode::Mode;
use super::score::Score;

/// One completed iteration of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 0-based iteration index.
    pub index: usize,
    pub score: Score,
    pub decision: Decision,
    pub mode_used: Mode,
}

/// Final outcome of one `execute` call.
///
/// # Invariants
///
/// `iterations` is never empty, its length never exceeds the configured
/// `max_iterations`, and `decision`/`score`/`mode` equal the last record's
/// `decision`/`score`/`mode_used`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub decision: Decision,
    pub score: Score,
    pub iterations: Vec<IterationRecord>,
    pub mode: Mode,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct CanonicalView<'a> {
    decision: Decision,
    score: &'a Score,
    iterations: &'a [IterationRecord],
    mode: Mode,
}

impl PipelineResult {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn processing_time_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Serialized form without the wall-clock fields. Two runs over the same
    /// event and config produce identical bytes.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&CanonicalView {
            decision: self.decision,
            score: &self.score,
            iterations: &self.iterations,
            mode: self.mode,
        })
    }
}
