//! Metric engine: deterministic numeric features from an event.
//!
//! Every function here is pure. Frequencies are accumulated in a `BTreeMap`
//! so the floating-point summation order, and therefore the exact bits of the
//! entropy, depend only on the multiset of characters.

use std::collections::{BTreeMap, HashSet};

use crate::domain::{
    Config, ContextFactors, EngineError, Event, MetricVector, TextProfile, ALPHA_SCHEDULE_LEN,
    MATRIX_WEIGHTS_LEN, MAX_FIBONACCI_N,
};

/// Entropy (bits) that maps to 1.0 after normalization: a uniform
/// distribution over 256 symbols.
pub const ENTROPY_SCALE: f64 = 8.0;

const LEADERSHIP_KEYWORDS: &[&str] = &["ceo", "leader", "executive"];

/// Derives a [`MetricVector`] from an event under a config.
pub trait MetricEngine: Send + Sync {
    fn compute(&self, event: &Event, config: &Config) -> Result<MetricVector, EngineError>;
}

/// The default metric engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardMetricEngine;

impl MetricEngine for StandardMetricEngine {
    fn compute(&self, event: &Event, config: &Config) -> Result<MetricVector, EngineError> {
        let fibonacci_series = fibonacci_series(config.max_fibonacci_n() as i64)?;
        let entropy = shannon_entropy(&event.text);
        let weighted_feature = weighted_feature(
            &fibonacci_series,
            entropy,
            config.matrix_weights(),
            config.alpha_schedule(),
        )?;

        Ok(MetricVector {
            fibonacci_series,
            entropy,
            weighted_feature,
            text_profile: text_profile(&event.text),
            context_factors: context_factors(event),
        })
    }
}

/// The first `n` Fibonacci numbers, starting F(0) = 0, F(1) = 1.
///
/// # Errors
///
/// `InvalidConfig` when `n <= 0` or when F(n - 1) would not fit in a `u64`.
pub fn fibonacci_series(n: i64) -> Result<Vec<u64>, EngineError> {
    if n <= 0 {
        return Err(EngineError::InvalidConfig(format!(
            "max_fibonacci_n must be positive, got {n}"
        )));
    }
    if n > MAX_FIBONACCI_N {
        return Err(EngineError::InvalidConfig(format!(
            "max_fibonacci_n must be <= {MAX_FIBONACCI_N}, got {n}"
        )));
    }

    let len = n as usize;
    let mut series: Vec<u64> = Vec::with_capacity(len);
    for i in 0..len {
        let term = match i {
            0 => 0,
            1 => 1,
            _ => series[i - 1].checked_add(series[i - 2]).ok_or_else(|| {
                EngineError::InvalidConfig(format!("fibonacci term {i} overflows u64"))
            })?,
        };
        series.push(term);
    }
    Ok(series)
}

/// Shannon entropy (base 2) of the character distribution of `text`.
///
/// Returns 0.0 for the empty string.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts: BTreeMap<char, usize> = BTreeMap::new();
    let mut total = 0usize;
    for ch in text.chars() {
        *counts.entry(ch).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }

    let total = total as f64;
    let mut entropy = 0.0;
    for count in counts.values() {
        let p = *count as f64 / total;
        entropy -= p * p.log2();
    }
    // A single repeated symbol yields -0.0.
    entropy.max(0.0)
}

/// Word-level statistics and a normalized complexity score.
pub fn text_profile(text: &str) -> TextProfile {
    let words: Vec<&str> = text.split_whitespace().collect();
    let len_chars = text.chars().count();
    if words.is_empty() {
        return TextProfile {
            len_chars,
            ..TextProfile::default()
        };
    }

    let len_words = words.len();
    let vocab = words.iter().collect::<HashSet<_>>().len();
    let total_word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let avg_word_len = total_word_chars as f64 / len_words as f64;

    let vocab_diversity = vocab as f64 / len_words as f64;
    let complexity = (0.5 * vocab_diversity
        + 0.3 * (avg_word_len / 10.0).min(1.0)
        + 0.2 * (len_words as f64 / 100.0).min(1.0))
    .min(1.0);

    TextProfile {
        len_chars,
        len_words,
        vocab,
        avg_word_len,
        complexity,
    }
}

/// Confidence/success multipliers from the event context.
pub fn context_factors(event: &Event) -> ContextFactors {
    let mut factors = ContextFactors::default();

    if event.context_str("source") == Some("x_platform") {
        factors.confidence *= 1.1;
        factors.success *= 1.05;
    }

    match event.context_str("media_type") {
        Some("image") => factors.success *= 1.2,
        Some("video") => factors.success *= 1.3,
        _ => {}
    }

    let mentions_leadership = |s: &str| {
        let lower = s.to_lowercase();
        LEADERSHIP_KEYWORDS.iter().any(|k| lower.contains(k))
    };
    if mentions_leadership(&event.text)
        || event.context_str("text").is_some_and(mentions_leadership)
    {
        factors.confidence *= 0.9;
    }

    factors
}

/// Blend the Fibonacci profile and normalized entropy into a scalar in [0, 1].
///
/// Six evenly spaced series terms are averaged with `matrix_weights`. Each
/// term is log-normalized, `ln(1 + F(j)) / ln(1 + F(last))`, which grows
/// roughly linearly with its position instead of collapsing to zero for every
/// term but the last. The alpha schedule then walks from pure entropy (first
/// slot) to pure matrix term (last slot).
///
/// # Errors
///
/// `InvalidConfig` on an empty series or wrong-length weight vectors.
pub fn weighted_feature(
    series: &[u64],
    entropy: f64,
    matrix_weights: &[f64],
    alpha_schedule: &[f64],
) -> Result<f64, EngineError> {
    if matrix_weights.len() != MATRIX_WEIGHTS_LEN {
        return Err(EngineError::InvalidConfig(format!(
            "matrix_weights must have exactly {MATRIX_WEIGHTS_LEN} entries, got {}",
            matrix_weights.len()
        )));
    }
    if alpha_schedule.len() != ALPHA_SCHEDULE_LEN {
        return Err(EngineError::InvalidConfig(format!(
            "alpha_schedule must have exactly {ALPHA_SCHEDULE_LEN} entries, got {}",
            alpha_schedule.len()
        )));
    }
    let Some(&last) = series.last() else {
        return Err(EngineError::InvalidConfig(
            "fibonacci series must not be empty".to_string(),
        ));
    };

    let h = (entropy / ENTROPY_SCALE).min(1.0);

    let span = series.len() - 1;
    let steps = MATRIX_WEIGHTS_LEN - 1;
    let weight_sum: f64 = matrix_weights.iter().sum();
    let matrix_term = if last == 0 || weight_sum <= 0.0 {
        0.0
    } else {
        let scale = (last as f64).ln_1p();
        let weighted: f64 = matrix_weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                // round(i * span / steps) in integer arithmetic
                let j = (2 * i * span + steps) / (2 * steps);
                w * ((series[j] as f64).ln_1p() / scale)
            })
            .sum();
        weighted / weight_sum
    };

    let alpha_sum: f64 = alpha_schedule.iter().sum();
    let blended = if alpha_sum <= 0.0 {
        0.5 * (matrix_term + h)
    } else {
        let slots = (ALPHA_SCHEDULE_LEN - 1) as f64;
        alpha_schedule
            .iter()
            .enumerate()
            .map(|(k, a)| {
                let t = k as f64 / slots;
                a * (t * matrix_term + (1.0 - t) * h)
            })
            .sum::<f64>()
            / alpha_sum
    };

    // clamp keeps NaN so the scoring engine can reject it
    Ok(blended.clamp(0.0, 1.0))
}
