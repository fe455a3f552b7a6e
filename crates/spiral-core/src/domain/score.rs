//! Per-iteration score pair.

use serde::{Deserialize, Serialize};

/// Clamp to [0, 1]. NaN maps to 0.
#[inline]
pub fn clip_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Confidence/success pair. Both values are always within [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawScore")]
pub struct Score {
    confidence: f64,
    success: f64,
}

#[derive(Deserialize)]
struct RawScore {
    confidence: f64,
    success: f64,
}

impl From<RawScore> for Score {
    fn from(raw: RawScore) -> Self {
        Score::new(raw.confidence, raw.success)
    }
}

impl Score {
    /// Build a score, clamping both components into [0, 1].
    pub fn new(confidence: f64, success: f64) -> Self {
        Self {
            confidence: clip_unit(confidence),
            success: clip_unit(success),
        }
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn success(&self) -> f64 {
        self.success
    }
}
