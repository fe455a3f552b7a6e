//! Bounded-concurrency batch execution.
//!
//! Every event runs on the blocking pool under one shared, read-only
//! [`Config`]. A semaphore caps how many runs are in flight; outcomes come back
//! in input order. A single [`RunControl`] is shared by the whole batch, so
//! cancelling it (or a `fail_fast` failure) stops the remaining runs at their
//! next iteration boundary.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use crate::domain::{Config, Event, PipelineResult, Result, SpiralError};
use crate::engine::{MetricEngine, ScoringEngine};
use crate::executor::{Executor, RunControl};
use crate::obs::emit_batch_finished;

/// Options for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Maximum number of runs in flight.
    pub max_concurrent: usize,
    /// Cancel the remaining runs as soon as one fails.
    pub fail_fast: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            fail_fast: false,
        }
    }
}

/// One input event and what became of it.
#[derive(Debug)]
pub struct BatchItem {
    pub event: Event,
    pub outcome: Result<PipelineResult>,
}

/// Aggregate statistics over a batch, derived only from the outcomes.
///
/// Means are taken over successful runs and are `0.0` when there are none.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub count: usize,
    pub succeeded: usize,
    pub failures: usize,
    pub cancelled: usize,
    pub mean_confidence: f64,
    pub mean_success: f64,
    pub total_iterations: usize,
    pub total_processing_time_ms: f64,
    /// Decision name to number of runs ending with it.
    pub decisions: BTreeMap<String, usize>,
}

impl BatchSummary {
    pub fn from_results<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a Result<PipelineResult>>,
    {
        let mut summary = BatchSummary::default();
        let mut confidence_sum = 0.0;
        let mut success_sum = 0.0;

        for outcome in outcomes {
            summary.count += 1;
            match outcome {
                Ok(result) => {
                    summary.succeeded += 1;
                    confidence_sum += result.score.confidence();
                    success_sum += result.score.success();
                    summary.total_iterations += result.iteration_count();
                    summary.total_processing_time_ms += result.processing_time_ms();
                    *summary
                        .decisions
                        .entry(result.decision.as_str().to_string())
                        .or_default() += 1;
                }
                Err(e) if e.is_cancellation() => summary.cancelled += 1,
                Err(_) => summary.failures += 1,
            }
        }

        if summary.succeeded > 0 {
            summary.mean_confidence = confidence_sum / summary.succeeded as f64;
            summary.mean_success = success_sum / summary.succeeded as f64;
        }
        summary
    }
}

/// Ordered outcomes of a batch plus their summary.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: String,
    pub items: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// Run `events` through the default engines.
pub async fn run_batch(
    events: Vec<Event>,
    config: Arc<Config>,
    options: BatchOptions,
) -> Result<BatchReport> {
    run_batch_with(
        Arc::new(Executor::standard()),
        events,
        config,
        options,
        RunControl::new(),
    )
    .await
}

/// Run `events` through `executor`, sharing `control` across every run.
///
/// # Errors
///
/// Returns `SpiralError::InvalidConfig` when `max_concurrent` is zero.
/// Per-event failures are reported in [`BatchItem::outcome`], not here.
#[instrument(skip_all, fields(events = events.len(), max_concurrent = options.max_concurrent))]
pub async fn run_batch_with<M, S>(
    executor: Arc<Executor<M, S>>,
    events: Vec<Event>,
    config: Arc<Config>,
    options: BatchOptions,
    control: RunControl,
) -> Result<BatchReport>
where
    M: MetricEngine + 'static,
    S: ScoringEngine + 'static,
{
    if options.max_concurrent == 0 {
        return Err(SpiralError::InvalidConfig(
            "max_concurrent must be positive".to_string(),
        ));
    }

    let batch_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();
    let sem = Arc::new(Semaphore::new(options.max_concurrent));

    let tasks = events.into_iter().map(|event| {
        let sem = Arc::clone(&sem);
        let executor = Arc::clone(&executor);
        let config = Arc::clone(&config);
        let control = control.clone();
        let fail_fast = options.fail_fast;

        async move {
            let _permit = match sem.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    return BatchItem {
                        event,
                        outcome: Err(SpiralError::Task(e.to_string())),
                    }
                }
            };

            let input = event.clone();
            let run_control = control.clone();
            let joined = tokio::task::spawn_blocking(move || {
                executor.execute_with(&input, &config, &run_control)
            })
            .await;

            let outcome = match joined {
                Ok(outcome) => outcome.map(|(result, _)| result),
                Err(e) => Err(SpiralError::Task(e.to_string())),
            };

            if let Err(e) = &outcome {
                if !e.is_cancellation() {
                    warn!(error = %e, "batch run failed");
                    if fail_fast {
                        control.cancel();
                    }
                }
            }

            BatchItem { event, outcome }
        }
    });

    let items: Vec<BatchItem> = futures::future::join_all(tasks).await;
    let summary = BatchSummary::from_results(items.iter().map(|item| &item.outcome));

    emit_batch_finished(
        &batch_id,
        summary.count,
        summary.failures,
        started.elapsed().as_secs_f64() * 1000.0,
    );

    Ok(BatchReport {
        batch_id,
        items,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, EngineError, IterationRecord, MetricVector, Mode, Score};
    use crate::engine::StandardMetricEngine;
    use std::time::Duration;

    struct BrokenScoring;

    impl ScoringEngine for BrokenScoring {
        fn score(&self, _metrics: &MetricVector, _mode: Mode) -> std::result::Result<Score, EngineError> {
            Err(EngineError::Scoring("entropy is NaN".to_string()))
        }
    }

    fn result(confidence: f64, success: f64, decision: Decision, iterations: usize) -> PipelineResult {
        let score = Score::new(confidence, success);
        PipelineResult {
            decision,
            score,
            iterations: (0..iterations)
                .map(|index| IterationRecord {
                    index,
                    score,
                    decision,
                    mode_used: Mode::Balanced,
                })
                .collect(),
            mode: Mode::Balanced,
            elapsed: Duration::from_millis(2),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_summary_means_over_successes() {
        let outcomes: Vec<Result<PipelineResult>> = vec![
            Ok(result(0.6, 0.8, Decision::Accept, 1)),
            Ok(result(0.8, 0.4, Decision::ForceAccept, 3)),
            Err(SpiralError::Pipeline {
                iteration: 0,
                history: Vec::new(),
                decision: Decision::Reject,
                source: EngineError::Scoring("NaN".to_string()),
            }),
        ];
        let summary = BatchSummary::from_results(&outcomes);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failures, 1);
        assert!((summary.mean_confidence - 0.7).abs() < 1e-12);
        assert!((summary.mean_success - 0.6).abs() < 1e-12);
        assert_eq!(summary.total_iterations, 4);
        assert_eq!(summary.decisions.get("ACCEPT"), Some(&1));
        assert_eq!(summary.decisions.get("FORCE_ACCEPT"), Some(&1));
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let outcomes: Vec<Result<PipelineResult>> = Vec::new();
        let summary = BatchSummary::from_results(&outcomes);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean_confidence, 0.0);
        assert!(summary.decisions.is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_keep_input_order() {
        let events: Vec<Event> = ["alpha", "beta beta", "gamma gamma gamma", "", "delta"]
            .into_iter()
            .map(Event::new)
            .collect();
        let config = Arc::new(Config::builder().max_iterations(5).build().expect("valid"));
        let report = run_batch(
            events.clone(),
            config,
            BatchOptions {
                max_concurrent: 2,
                fail_fast: false,
            },
        )
        .await
        .expect("batch");

        assert_eq!(report.items.len(), events.len());
        for (item, event) in report.items.iter().zip(&events) {
            assert_eq!(&item.event, event);
            assert!(item.outcome.is_ok());
        }
        assert_eq!(report.summary.count, 5);
        assert_eq!(report.summary.failures, 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let err = run_batch(
            vec![Event::new("x")],
            Arc::new(Config::default()),
            BatchOptions {
                max_concurrent: 0,
                fail_fast: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SpiralError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_cancelled_control_cancels_every_run() {
        let control = RunControl::new();
        control.cancel();
        let report = run_batch_with(
            Arc::new(Executor::standard()),
            vec![Event::new("a"), Event::new("b")],
            Arc::new(Config::default()),
            BatchOptions::default(),
            control,
        )
        .await
        .expect("batch");
        assert_eq!(report.summary.cancelled, 2);
        assert_eq!(report.summary.failures, 0);
    }

    #[tokio::test]
    async fn test_fail_fast_cancels_queued_runs() {
        let events: Vec<Event> = ["one", "two", "three", "four"]
            .into_iter()
            .map(Event::new)
            .collect();
        let control = RunControl::new();
        let report = run_batch_with(
            Arc::new(Executor::new(StandardMetricEngine, BrokenScoring)),
            events,
            Arc::new(Config::default()),
            BatchOptions {
                max_concurrent: 1,
                fail_fast: true,
            },
            control.clone(),
        )
        .await
        .expect("batch");

        assert_eq!(report.summary.count, 4);
        assert_eq!(report.summary.failures, 1);
        assert_eq!(report.summary.cancelled, 3);
        assert_eq!(report.summary.succeeded, 0);
        assert!(control.is_cancelled());
        assert!(matches!(
            report.items[0].outcome,
            Err(SpiralError::Pipeline { iteration: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_without_fail_fast_every_run_fails_on_its_own() {
        let report = run_batch_with(
            Arc::new(Executor::new(StandardMetricEngine, BrokenScoring)),
            vec![Event::new("one"), Event::new("two"), Event::new("three")],
            Arc::new(Config::default()),
            BatchOptions {
                max_concurrent: 1,
                fail_fast: false,
            },
            RunControl::new(),
        )
        .await
        .expect("batch");
        assert_eq!(report.summary.failures, 3);
        assert_eq!(report.summary.cancelled, 0);
    }
}
