//! Orchestrator: turns a score into a decision and an advisory next mode.
//!
//! Evaluation order is ACCEPT, then REJECT (degradation), then FORCE_ACCEPT on
//! the last permitted iteration, otherwise ITERATE. The orchestrator is
//! stateless; everything it needs arrives as arguments.

use serde::{Deserialize, Serialize};

use crate::domain::{Config, Decision, EngineError, IterationRecord, Mode, Score};

/// Success below this steers the next iteration toward verification.
pub const LOW_SUCCESS: f64 = 0.30;
/// Success above this steers the next iteration toward creative scoring.
pub const HIGH_SUCCESS: f64 = 0.90;
/// Confidence below this steers the next iteration toward verification.
pub const LOW_CONFIDENCE: f64 = 0.50;

/// Orchestrator output for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    /// Mode proposed for the next iteration. Only set on ITERATE, and only
    /// when it differs from the current mode.
    pub next_mode: Option<Mode>,
    /// Human-readable explanation.
    pub reason: String,
}

/// Decide the outcome of iteration `iteration_index`.
///
/// `history` holds the records of earlier iterations of the same run, oldest
/// first. `config` is the active view, so `config.mode()` is the mode that
/// produced `score`.
pub fn decide(
    score: &Score,
    iteration_index: usize,
    history: &[IterationRecord],
    config: &Config,
) -> Verdict {
    let confidence_ok = score.confidence() >= config.confidence_threshold();
    let success_ok = score.success() >= config.success_threshold();

    if confidence_ok && success_ok {
        return Verdict {
            decision: Decision::Accept,
            next_mode: None,
            reason: format!(
                "confidence {:.3} >= {:.3} and success {:.3} >= {:.3}",
                score.confidence(),
                config.confidence_threshold(),
                score.success(),
                config.success_threshold(),
            ),
        };
    }

    if let Some(drop) = degradation(score, history, config) {
        return Verdict {
            decision: Decision::Reject,
            next_mode: None,
            reason: format!(
                "success fell by {:.3} over the last {} iterations (margin {:.3})",
                drop,
                config.degradation().window,
                config.degradation().margin,
            ),
        };
    }

    if iteration_index + 1 >= config.max_iterations() {
        return Verdict {
            decision: Decision::ForceAccept,
            next_mode: None,
            reason: format!(
                "iteration bound {} reached without meeting thresholds",
                config.max_iterations()
            ),
        };
    }

    let current = config.mode();
    let proposed = propose_mode(score, current);
    Verdict {
        decision: Decision::Iterate,
        next_mode: (proposed != current).then_some(proposed),
        reason: format!(
            "thresholds not met (confidence {:.3}, success {:.3})",
            score.confidence(),
            score.success(),
        ),
    }
}

/// Decision for an iteration whose scoring failed: reject immediately.
pub fn decide_on_error(error: &EngineError) -> Verdict {
    Verdict {
        decision: Decision::Reject,
        next_mode: None,
        reason: format!("engine failure: {error}"),
    }
}

/// Total success drop across the trailing window when every step in it
/// strictly decreases and the drop exceeds the margin.
pub fn degradation(score: &Score, history: &[IterationRecord], config: &Config) -> Option<f64> {
    let policy = config.degradation();
    let window = policy.window;
    if window < 2 || history.len() + 1 < window {
        return None;
    }

    let trailing: Vec<f64> = history[history.len() + 1 - window..]
        .iter()
        .map(|r| r.score.success())
        .chain(std::iter::once(score.success()))
        .collect();

    let strictly_decreasing = trailing.windows(2).all(|pair| pair[1] < pair[0]);
    let drop = trailing[0] - trailing[trailing.len() - 1];
    (strictly_decreasing && drop > policy.margin).then_some(drop)
}

/// Adaptive feedback for the next iteration.
pub fn propose_mode(score: &Score, current: Mode) -> Mode {
    if score.success() < LOW_SUCCESS {
        Mode::Verification
    } else if score.success() > HIGH_SUCCESS {
        Mode::Creative
    } else if score.confidence() < LOW_CONFIDENCE {
        Mode::Verification
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DegradationPolicy;

    fn config(max_iterations: i64) -> Config {
        Config::builder()
            .max_iterations(max_iterations)
            .confidence_threshold(0.75)
            .success_threshold(0.85)
            .build()
            .expect("valid config")
    }

    fn record(index: usize, success: f64) -> IterationRecord {
        IterationRecord {
            index,
            score: Score::new(0.6, success),
            decision: Decision::Iterate,
            mode_used: Mode::Balanced,
        }
    }

    #[test]
    fn test_accept_when_both_thresholds_met() {
        let v = decide(&Score::new(0.75, 0.85), 0, &[], &config(5));
        assert_eq!(v.decision, Decision::Accept);
        assert_eq!(v.next_mode, None);
    }

    #[test]
    fn test_accept_wins_on_last_iteration() {
        let v = decide(&Score::new(0.9, 0.9), 4, &[], &config(5));
        assert_eq!(v.decision, Decision::Accept);
    }

    #[test]
    fn test_force_accept_on_last_iteration() {
        let v = decide(&Score::new(0.9, 0.1), 2, &[], &config(3));
        assert_eq!(v.decision, Decision::ForceAccept);
    }

    #[test]
    fn test_force_accept_with_single_iteration() {
        let v = decide(&Score::new(0.1, 0.1), 0, &[], &config(1));
        assert_eq!(v.decision, Decision::ForceAccept);
    }

    #[test]
    fn test_iterate_otherwise() {
        let v = decide(&Score::new(0.6, 0.6), 0, &[], &config(3));
        assert_eq!(v.decision, Decision::Iterate);
        assert_eq!(v.next_mode, None);
    }

    #[test]
    fn test_reject_on_degrading_success() {
        let history = vec![record(0, 0.70), record(1, 0.65)];
        let v = decide(&Score::new(0.6, 0.60), 2, &history, &config(10));
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn test_no_reject_when_drop_within_margin() {
        let history = vec![record(0, 0.62), record(1, 0.61)];
        let v = decide(&Score::new(0.6, 0.60), 2, &history, &config(10));
        assert_eq!(v.decision, Decision::Iterate);
    }

    #[test]
    fn test_no_reject_when_not_strictly_decreasing() {
        let history = vec![record(0, 0.80), record(1, 0.80)];
        let v = decide(&Score::new(0.6, 0.50), 2, &history, &config(10));
        assert_eq!(v.decision, Decision::Iterate);
    }

    #[test]
    fn test_no_reject_before_window_fills() {
        let history = vec![record(0, 0.80)];
        let v = decide(&Score::new(0.6, 0.50), 1, &history, &config(10));
        assert_ne!(v.decision, Decision::Reject);
    }

    #[test]
    fn test_only_trailing_window_counts() {
        // early rise is outside the window of 3
        let history = vec![record(0, 0.10), record(1, 0.80), record(2, 0.70)];
        let v = decide(&Score::new(0.6, 0.60), 3, &history, &config(10));
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn test_reject_precedes_force_accept() {
        let history = vec![record(0, 0.70), record(1, 0.65)];
        let v = decide(&Score::new(0.6, 0.60), 2, &history, &config(3));
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn test_custom_window() {
        let config = Config::builder()
            .degradation(DegradationPolicy {
                window: 2,
                margin: 0.01,
            })
            .build()
            .expect("valid config");
        let history = vec![record(0, 0.70)];
        let v = decide(&Score::new(0.6, 0.60), 1, &history, &config);
        assert_eq!(v.decision, Decision::Reject);
    }

    #[test]
    fn test_low_success_proposes_verification() {
        let cfg = config(5).with_mode(Mode::Creative);
        let v = decide(&Score::new(0.7, 0.2), 0, &[], &cfg);
        assert_eq!(v.decision, Decision::Iterate);
        assert_eq!(v.next_mode, Some(Mode::Verification));
    }

    #[test]
    fn test_high_success_proposes_creative() {
        let cfg = config(5).with_mode(Mode::Verification);
        let v = decide(&Score::new(0.6, 0.95), 0, &[], &cfg);
        assert_eq!(v.next_mode, Some(Mode::Creative));
    }

    #[test]
    fn test_low_confidence_proposes_verification() {
        assert_eq!(
            propose_mode(&Score::new(0.3, 0.6), Mode::Balanced),
            Mode::Verification
        );
        assert_eq!(
            propose_mode(&Score::new(0.6, 0.6), Mode::Creative),
            Mode::Creative
        );
    }

    #[test]
    fn test_scoring_error_maps_to_reject() {
        let v = decide_on_error(&EngineError::Scoring("NaN".to_string()));
        assert_eq!(v.decision, Decision::Reject);
        assert!(v.reason.contains("NaN"));
    }
}
