//! Domain models for the Spiral pipeline.
//!
//! Canonical definitions for the core entities:
//! - `Event`: text plus context submitted by a caller
//! - `Config`: validated, immutable run configuration
//! - `MetricVector`, `Score`, `Decision`: per-iteration engine outputs
//! - `PipelineResult`: the terminal outcome of a run

pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod metric_vector;
pub mod mode;
pub mod result;
pub mod score;

pub use config::{
    Config, ConfigBuilder, DegradationPolicy, ALPHA_SCHEDULE_LEN, MATRIX_WEIGHTS_LEN,
    MAX_FIBONACCI_N,
};
pub use decision::Decision;
pub use error::{CancelReason, EngineError, Result, SpiralError};
pub use event::Event;
pub use metric_vector::{ContextFactors, MetricVector, TextProfile};
pub use mode::{Mode, ModeCoefficients};
pub use result::{IterationRecord, PipelineResult};
pub use score::{clip_unit, Score};
