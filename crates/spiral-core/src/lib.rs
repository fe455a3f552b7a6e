//! Spiral Core Library
//!
//! Bounded iterative scoring pipeline: the metric engine turns an event into
//! a metric vector, the scoring engine weights it under a mode, and the
//! orchestrator decides whether to accept, reject or iterate. The executor
//! drives that loop to a guaranteed terminal decision.

pub mod batch;
pub mod config;
pub mod domain;
pub mod engine;
pub mod executor;
pub mod metrics;
pub mod obs;
pub mod store;
pub mod telemetry;

pub use batch::{run_batch, run_batch_with, BatchItem, BatchOptions, BatchReport, BatchSummary};

pub use config::{load_config, FileConfig, LogFormat, LoggingConfig, MODE_ENV_VAR};

pub use domain::{
    CancelReason, Config, ConfigBuilder, ContextFactors, Decision, DegradationPolicy, EngineError,
    Event, IterationRecord, MetricVector, Mode, PipelineResult, Result, Score, SpiralError,
    TextProfile,
};

pub use engine::{
    decide, MetricEngine, ScoringEngine, StandardMetricEngine, StandardScoringEngine, Verdict,
};

pub use executor::{execute, execute_with, Executor, RunControl};

pub use store::{
    JsonlResultStore, MemoryResultStore, ResultQuery, ResultRecord, ResultStore, StoreStats,
};

/// Crate version, reported in the `system` config section.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
