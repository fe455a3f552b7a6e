//! Structured observability hooks for pipeline run lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for lifecycle events: start, iteration, finish,
//!   failure, cancellation, batch completion
//!
//! Events are emitted at `info!` level (failures at `warn!`). Output format is
//! controlled by [`crate::telemetry::init_tracing`].

use tracing::{debug, info, warn};

use crate::domain::{CancelReason, Decision, Mode};

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter(Mode::Balanced, 42);
/// // every event emitted while the guard lives carries mode and text_len
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the starting mode and text length.
    pub fn enter(mode: Mode, text_len: usize) -> Self {
        let span = tracing::info_span!("spiral.run", mode = %mode, text_len = text_len);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(mode: Mode, max_iterations: usize) {
    info!(event = "run.started", mode = %mode, max_iterations = max_iterations);
}

/// Emit event: one iteration decided.
pub fn emit_iteration_decided(
    index: usize,
    mode: Mode,
    confidence: f64,
    success: f64,
    decision: Decision,
    next_mode: Option<Mode>,
) {
    debug!(
        event = "run.iteration",
        index = index,
        mode = %mode,
        confidence = confidence,
        success = success,
        decision = %decision,
        next_mode = next_mode.map(|m| m.as_str()).unwrap_or("-"),
    );
}

/// Emit event: run finished with a terminal decision.
pub fn emit_run_finished(decision: Decision, iterations: usize, duration_ms: f64) {
    info!(
        event = "run.finished",
        decision = %decision,
        iterations = iterations,
        duration_ms = duration_ms,
    );
}

/// Emit event: an engine failed and the run was aborted (warning level).
pub fn emit_run_failed(iteration: usize, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", iteration = iteration, error = %error);
}

/// Emit event: the run was cancelled between iterations (warning level).
pub fn emit_run_cancelled(iteration: usize, reason: CancelReason) {
    warn!(event = "run.cancelled", iteration = iteration, reason = %reason);
}

/// Emit event: a batch completed.
pub fn emit_batch_finished(batch_id: &str, count: usize, failures: usize, duration_ms: f64) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        count = count,
        failures = failures,
        duration_ms = duration_ms,
    );
}
