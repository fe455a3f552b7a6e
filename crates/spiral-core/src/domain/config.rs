//! Validated, immutable pipeline configuration.
//!
//! A [`Config`] can only be obtained through [`ConfigBuilder::build`] (or by
//! deserializing, which goes through the same validation), so every engine can
//! trust its invariants without re-checking ranges.

use serde::{Deserialize, Serialize};

use super::error::{Result, SpiralError};
use super::mode::Mode;

/// Required length of `matrix_weights`.
pub const MATRIX_WEIGHTS_LEN: usize = 6;
/// Required length of `alpha_schedule`.
pub const ALPHA_SCHEDULE_LEN: usize = 7;
/// Longest Fibonacci series whose last term, F(93), still fits in a `u64`.
pub const MAX_FIBONACCI_N: i64 = 94;

/// Trailing-window policy that turns a steadily falling success score into a
/// REJECT.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationPolicy {
    /// Number of trailing iterations (current one included) inspected.
    pub window: usize,
    /// Minimum total drop in success across the window.
    pub margin: f64,
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self {
            window: 3,
            margin: 0.05,
        }
    }
}

/// Immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConfigBuilder", into = "ConfigBuilder")]
pub struct Config {
    mode: Mode,
    max_iterations: usize,
    confidence_threshold: f64,
    success_threshold: f64,
    max_fibonacci_n: usize,
    matrix_weights: [f64; MATRIX_WEIGHTS_LEN],
    alpha_schedule: [f64; ALPHA_SCHEDULE_LEN],
    degradation: DegradationPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Balanced,
            max_iterations: 100,
            confidence_threshold: 0.75,
            success_threshold: 0.85,
            max_fibonacci_n: 55,
            matrix_weights: [3.0, 4.0, 7.0, 7.0, 4.0, 3.0],
            alpha_schedule: [0.10, 0.20, 0.35, 0.50, 0.35, 0.20, 0.10],
            degradation: DegradationPolicy::default(),
        }
    }
}

impl Config {
    /// Start from the defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// A copy of this config with another active mode.
    pub fn with_mode(&self, mode: Mode) -> Config {
        Config {
            mode,
            ..self.clone()
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn success_threshold(&self) -> f64 {
        self.success_threshold
    }

    pub fn max_fibonacci_n(&self) -> usize {
        self.max_fibonacci_n
    }

    pub fn matrix_weights(&self) -> &[f64] {
        &self.matrix_weights
    }

    pub fn alpha_schedule(&self) -> &[f64] {
        &self.alpha_schedule
    }

    pub fn degradation(&self) -> DegradationPolicy {
        self.degradation
    }
}

/// Unvalidated configuration fields.
///
/// Integer fields are signed so that non-positive values coming from a file or
/// a caller surface as `InvalidConfig` instead of a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigBuilder {
    pub mode: Mode,
    pub max_iterations: i64,
    pub confidence_threshold: f64,
    pub success_threshold: f64,
    pub max_fibonacci_n: i64,
    pub matrix_weights: Vec<f64>,
    pub alpha_schedule: Vec<f64>,
    pub degradation: DegradationPolicy,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Config::default().into()
    }
}

impl From<Config> for ConfigBuilder {
    fn from(config: Config) -> Self {
        Self {
            mode: config.mode,
            max_iterations: config.max_iterations as i64,
            confidence_threshold: config.confidence_threshold,
            success_threshold: config.success_threshold,
            max_fibonacci_n: config.max_fibonacci_n as i64,
            matrix_weights: config.matrix_weights.to_vec(),
            alpha_schedule: config.alpha_schedule.to_vec(),
            degradation: config.degradation,
        }
    }
}

impl TryFrom<ConfigBuilder> for Config {
    type Error = SpiralError;

    fn try_from(builder: ConfigBuilder) -> Result<Self> {
        builder.build()
    }
}

impl ConfigBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_iterations(mut self, max_iterations: i64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn max_fibonacci_n(mut self, n: i64) -> Self {
        self.max_fibonacci_n = n;
        self
    }

    pub fn matrix_weights(mut self, weights: Vec<f64>) -> Self {
        self.matrix_weights = weights;
        self
    }

    pub fn alpha_schedule(mut self, schedule: Vec<f64>) -> Self {
        self.alpha_schedule = schedule;
        self
    }

    pub fn degradation(mut self, policy: DegradationPolicy) -> Self {
        self.degradation = policy;
        self
    }

    /// Validate every field and freeze the result.
    pub fn build(self) -> Result<Config> {
        if self.max_iterations <= 0 {
            return Err(invalid(format!(
                "max_iterations must be positive, got {}",
                self.max_iterations
            )));
        }
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("success_threshold", self.success_threshold)?;

        if self.max_fibonacci_n <= 0 || self.max_fibonacci_n > MAX_FIBONACCI_N {
            return Err(invalid(format!(
                "max_fibonacci_n must be in 1..={MAX_FIBONACCI_N}, got {}",
                self.max_fibonacci_n
            )));
        }

        let matrix_weights: [f64; MATRIX_WEIGHTS_LEN] =
            self.matrix_weights.as_slice().try_into().map_err(|_| {
                invalid(format!(
                    "matrix_weights must have exactly {MATRIX_WEIGHTS_LEN} entries, got {}",
                    self.matrix_weights.len()
                ))
            })?;
        if let Some(w) = matrix_weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(invalid(format!(
                "matrix_weights must be finite and non-negative, got {w}"
            )));
        }

        let alpha_schedule: [f64; ALPHA_SCHEDULE_LEN] =
            self.alpha_schedule.as_slice().try_into().map_err(|_| {
                invalid(format!(
                    "alpha_schedule must have exactly {ALPHA_SCHEDULE_LEN} entries, got {}",
                    self.alpha_schedule.len()
                ))
            })?;
        for a in &alpha_schedule {
            check_unit("alpha_schedule entry", *a)?;
        }

        if self.degradation.window < 2 {
            return Err(invalid(format!(
                "degradation.window must be >= 2, got {}",
                self.degradation.window
            )));
        }
        if !self.degradation.margin.is_finite() || self.degradation.margin < 0.0 {
            return Err(invalid(format!(
                "degradation.margin must be finite and >= 0, got {}",
                self.degradation.margin
            )));
        }

        Ok(Config {
            mode: self.mode,
            max_iterations: self.max_iterations as usize,
            confidence_threshold: self.confidence_threshold,
            success_threshold: self.success_threshold,
            max_fibonacci_n: self.max_fibonacci_n as usize,
            matrix_weights,
            alpha_schedule,
            degradation: self.degradation,
        })
    }
}

fn invalid(msg: String) -> SpiralError {
    SpiralError::InvalidConfig(msg)
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{name} must be in [0, 1], got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::builder().build().expect("defaults validate");
        assert_eq!(config, Config::default());
        assert_eq!(config.max_iterations(), 100);
        assert_eq!(config.max_fibonacci_n(), 55);
        assert_eq!(config.degradation(), DegradationPolicy::default());
    }

    #[test]
    fn test_rejects_non_positive_iterations() {
        let err = Config::builder().max_iterations(0).build().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_rejects_thresholds_outside_unit_interval() {
        assert!(Config::builder().confidence_threshold(1.01).build().is_err());
        assert!(Config::builder().success_threshold(-0.1).build().is_err());
        assert!(Config::builder().success_threshold(f64::NAN).build().is_err());
    }

    #[test]
    fn test_rejects_bad_fibonacci_bounds() {
        assert!(Config::builder().max_fibonacci_n(0).build().is_err());
        assert!(Config::builder().max_fibonacci_n(-3).build().is_err());
        assert!(Config::builder().max_fibonacci_n(95).build().is_err());
        assert!(Config::builder().max_fibonacci_n(94).build().is_ok());
    }

    #[test]
    fn test_rejects_wrong_length_vectors() {
        let err = Config::builder()
            .matrix_weights(vec![1.0, 2.0, 3.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, SpiralError::InvalidConfig(_)));

        let err = Config::builder()
            .alpha_schedule(vec![0.1; 8])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("alpha_schedule"));
    }

    #[test]
    fn test_rejects_alpha_outside_unit_interval() {
        let mut schedule = vec![0.1; 7];
        schedule[3] = 1.5;
        assert!(Config::builder().alpha_schedule(schedule).build().is_err());
    }

    #[test]
    fn test_rejects_negative_weights() {
        let weights = vec![1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        assert!(Config::builder().matrix_weights(weights).build().is_err());
    }

    #[test]
    fn test_rejects_degenerate_degradation_window() {
        let policy = DegradationPolicy {
            window: 1,
            margin: 0.05,
        };
        assert!(Config::builder().degradation(policy).build().is_err());
    }

    #[test]
    fn test_with_mode_leaves_original_untouched() {
        let config = Config::default();
        let view = config.with_mode(Mode::Creative);
        assert_eq!(view.mode(), Mode::Creative);
        assert_eq!(config.mode(), Mode::Balanced);
        assert_eq!(view.matrix_weights(), config.matrix_weights());
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let ok: Config = serde_json::from_str(r#"{"mode": "CREATIVE", "max_iterations": 5}"#)
            .expect("valid partial config");
        assert_eq!(ok.mode(), Mode::Creative);
        assert_eq!(ok.max_iterations(), 5);

        let bad = serde_json::from_str::<Config>(r#"{"max_iterations": -1}"#);
        assert!(bad.is_err());
    }
}
