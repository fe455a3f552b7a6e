//! Bounded iteration loop driving metric → scoring → orchestrator.
//!
//! Each step runs against the active mode's config view. The mode proposed by
//! the orchestrator is threaded into the next step as plain data; nothing is
//! shared or mutated between steps except the local history.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::instrument;

use crate::domain::{
    CancelReason, Config, Decision, EngineError, Event, IterationRecord, PipelineResult, Result,
    SpiralError,
};
use crate::engine::{
    decide, decide_on_error, MetricEngine, ScoringEngine, StandardMetricEngine,
    StandardScoringEngine,
};
use crate::metrics::METRICS;
use crate::obs::{
    emit_iteration_decided, emit_run_cancelled, emit_run_failed, emit_run_finished,
    emit_run_started, RunSpan,
};

/// Caller-owned cancellation flag plus an optional deadline.
///
/// Clones share the same flag, so one handle can be given to the executor and
/// another kept by the caller (or shared across a whole batch).
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation. Takes effect at the start of the next iteration.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Why the run must stop now, if it must.
    pub fn check(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            return Some(CancelReason::Requested);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }
}

/// Drives the bounded loop with injectable engines.
#[derive(Debug, Clone, Default)]
pub struct Executor<M = StandardMetricEngine, S = StandardScoringEngine> {
    metric: M,
    scoring: S,
}

impl Executor {
    /// Executor wired with the default engines.
    pub fn standard() -> Self {
        Self::default()
    }
}

impl<M: MetricEngine, S: ScoringEngine> Executor<M, S> {
    pub fn new(metric: M, scoring: S) -> Self {
        Self { metric, scoring }
    }

    /// Run the loop to a terminal decision.
    ///
    /// Returns the result together with the number of iterations used.
    pub fn execute(&self, event: &Event, config: &Config) -> Result<(PipelineResult, usize)> {
        self.execute_with(event, config, &RunControl::default())
    }

    /// Run the loop, polling `control` before every iteration.
    ///
    /// # Errors
    ///
    /// - `SpiralError::Pipeline`: an engine failed; carries the iteration
    ///   index and every record completed before it.
    /// - `SpiralError::Cancelled`: `control` fired; carries the partial history.
    #[instrument(skip_all, fields(max_iterations = config.max_iterations()))]
    pub fn execute_with(
        &self,
        event: &Event,
        config: &Config,
        control: &RunControl,
    ) -> Result<(PipelineResult, usize)> {
        let started = Instant::now();
        let _span = RunSpan::enter(config.mode(), event.text.chars().count());
        METRICS.inc_runs_started();
        emit_run_started(config.mode(), config.max_iterations());

        let max_iterations = config.max_iterations();
        let mut history: Vec<IterationRecord> = Vec::with_capacity(max_iterations.min(64));
        let mut active_mode = config.mode();

        for index in 0..max_iterations {
            if let Some(reason) = control.check() {
                METRICS.inc_runs_cancelled();
                emit_run_cancelled(index, reason);
                return Err(SpiralError::Cancelled {
                    iteration: index,
                    history,
                    reason,
                });
            }

            let view = config.with_mode(active_mode);
            let metrics = match self.metric.compute(event, &view) {
                Ok(m) => m,
                Err(e) => return Err(abort(index, history, e)),
            };
            let score = match self.scoring.score(&metrics, active_mode) {
                Ok(s) => s,
                Err(e) => return Err(abort(index, history, e)),
            };
            METRICS.inc_iterations();

            let verdict = decide(&score, index, &history, &view);
            let decision = if verdict.decision == Decision::Iterate && index + 1 == max_iterations
            {
                Decision::ForceAccept
            } else {
                verdict.decision
            };
            emit_iteration_decided(
                index,
                active_mode,
                score.confidence(),
                score.success(),
                decision,
                verdict.next_mode,
            );

            history.push(IterationRecord {
                index,
                score,
                decision,
                mode_used: active_mode,
            });

            if decision.is_terminal() {
                break;
            }
            if let Some(next) = verdict.next_mode {
                active_mode = next;
            }
        }

        let Some(last) = history.last().cloned() else {
            return Err(SpiralError::InvalidConfig(
                "max_iterations must be positive".to_string(),
            ));
        };
        if last.decision == Decision::ForceAccept {
            METRICS.inc_force_accepts();
        }

        let elapsed = started.elapsed();
        let iteration_count = history.len();
        let result = PipelineResult {
            decision: last.decision,
            score: last.score,
            iterations: history,
            mode: last.mode_used,
            elapsed,
            timestamp: Utc::now(),
        };
        emit_run_finished(result.decision, iteration_count, result.processing_time_ms());

        Ok((result, iteration_count))
    }
}

fn abort(index: usize, history: Vec<IterationRecord>, error: EngineError) -> SpiralError {
    let verdict = decide_on_error(&error);
    METRICS.inc_runs_failed();
    emit_run_failed(index, &verdict.reason);
    SpiralError::Pipeline {
        iteration: index,
        history,
        decision: verdict.decision,
        source: error,
    }
}

/// Run one event through the default engines.
pub fn execute(event: &Event, config: &Config) -> Result<(PipelineResult, usize)> {
    Executor::standard().execute(event, config)
}

/// Run one event through the default engines under a [`RunControl`].
pub fn execute_with(
    event: &Event,
    config: &Config,
    control: &RunControl,
) -> Result<(PipelineResult, usize)> {
    Executor::standard().execute_with(event, config, control)
}
