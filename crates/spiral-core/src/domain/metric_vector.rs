//! Numeric features derived from an event.

use serde::{Deserialize, Serialize};

/// Surface statistics of the event text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextProfile {
    pub len_chars: usize,
    pub len_words: usize,
    pub vocab: usize,
    pub avg_word_len: f64,
    /// Normalized structural complexity in [0, 1].
    pub complexity: f64,
}

/// Multiplicative adjustments derived from the event context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextFactors {
    pub confidence: f64,
    pub success: f64,
}

impl Default for ContextFactors {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            success: 1.0,
        }
    }
}

/// Deterministic features for one (event, config) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    pub fibonacci_series: Vec<u64>,
    pub entropy: f64,
    pub weighted_feature: f64,
    pub text_profile: TextProfile,
    pub context_factors: ContextFactors,
}

impl MetricVector {
    /// Name of the first non-finite float field, if any.
    pub fn first_non_finite(&self) -> Option<&'static str> {
        let fields = [
            ("entropy", self.entropy),
            ("weighted_feature", self.weighted_feature),
            ("text_profile.avg_word_len", self.text_profile.avg_word_len),
            ("text_profile.complexity", self.text_profile.complexity),
            ("context_factors.confidence", self.context_factors.confidence),
            ("context_factors.success", self.context_factors.success),
        ];
        fields
            .iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| *name)
    }
}
