//! Error taxonomy for the Spiral pipeline.

use super::decision::Decision;
use super::result::IterationRecord;

/// Errors produced by a single engine call (metric or scoring).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("scoring error: {0}")]
    Scoring(String),
}

/// Why a run stopped before reaching a terminal decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller flipped the cancellation flag.
    Requested,
    /// The caller-supplied deadline passed.
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancellation requested"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Spiral crate errors.
#[derive(Debug, thiserror::Error)]
pub enum SpiralError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("scoring error: {0}")]
    Scoring(String),

    /// An engine failed mid-run. `history` holds every iteration that
    /// completed before `iteration`; `decision` is the orchestrator's verdict
    /// on the failure (always REJECT).
    #[error("pipeline failed at iteration {iteration} ({decision}): {source}")]
    Pipeline {
        iteration: usize,
        history: Vec<IterationRecord>,
        decision: Decision,
        #[source]
        source: EngineError,
    },

    /// The run was cancelled between iterations.
    #[error("run cancelled before iteration {iteration}: {reason}")]
    Cancelled {
        iteration: usize,
        history: Vec<IterationRecord>,
        reason: CancelReason,
    },

    #[error("config parse error: {0}")]
    ConfigParse(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task panicked or was aborted.
    #[error("task failed: {0}")]
    Task(String),
}

impl SpiralError {
    /// Iterations completed before the failure, if the error carries them.
    pub fn partial_history(&self) -> Option<&[IterationRecord]> {
        match self {
            SpiralError::Pipeline { history, .. } | SpiralError::Cancelled { history, .. } => {
                Some(history)
            }
            _ => None,
        }
    }

    /// Whether this is a cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SpiralError::Cancelled { .. })
    }
}

impl From<EngineError> for SpiralError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidConfig(msg) => SpiralError::InvalidConfig(msg),
            EngineError::Scoring(msg) => SpiralError::Scoring(msg),
        }
    }
}

impl From<serde_yaml::Error> for SpiralError {
    fn from(err: serde_yaml::Error) -> Self {
        SpiralError::ConfigParse(err.to_string())
    }
}

/// Result type for Spiral operations.
pub type Result<T> = std::result::Result<T, SpiralError>;
