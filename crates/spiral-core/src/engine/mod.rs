//! The three per-iteration engines.
//!
//! - [`metric`]: `MetricEngine`, Fibonacci series, entropy, weighted feature
//! - [`scoring`]: `ScoringEngine`, mode-weighted confidence/success
//! - [`orchestrator`]: `decide`, degradation policy, adaptive mode feedback

pub mod metric;
pub mod orchestrator;
pub mod scoring;

pub use metric::{
    context_factors, fibonacci_series, shannon_entropy, text_profile, weighted_feature,
    MetricEngine, StandardMetricEngine, ENTROPY_SCALE,
};
pub use orchestrator::{decide, decide_on_error, degradation, propose_mode, Verdict};
pub use scoring::{ScoringEngine, StandardScoringEngine};
