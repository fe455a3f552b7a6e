//! YAML configuration file model.
//!
//! The file layout groups settings into `system`, `pipeline`, `logging` and
//! `quantum` sections. Every key is optional; missing keys take the defaults
//! below. A [`FileConfig`] is only a parsed document: call
//! [`FileConfig::to_config`] to validate it into the immutable [`Config`]
//! the engines consume.
//!
//! ```yaml
//! pipeline:
//!   mode: CREATIVE
//!   max_iterations: 10
//! logging:
//!   level: debug
//!   format: json
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::domain::{Config, DegradationPolicy, Mode, Result, SpiralError};

/// Environment variable that overrides `pipeline.mode`.
pub const MODE_ENV_VAR: &str = "SPIRAL_MODE";

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub system: SystemSection,
    pub pipeline: PipelineSection,
    pub logging: LoggingConfig,
    pub quantum: QuantumSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    pub version: String,
    pub env: String,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            version: crate::VERSION.to_string(),
            env: "development".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub mode: Mode,
    pub max_iterations: i64,
    pub confidence_threshold: f64,
    pub success_threshold: f64,
    pub degradation: DegradationPolicy,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let config = Config::default();
        Self {
            mode: config.mode(),
            max_iterations: config.max_iterations() as i64,
            confidence_threshold: config.confidence_threshold(),
            success_threshold: config.success_threshold(),
            degradation: config.degradation(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantumSection {
    pub max_fibonacci_n: i64,
    pub matrix_weights: Vec<f64>,
    pub alpha_schedule: Vec<f64>,
}

impl Default for QuantumSection {
    fn default() -> Self {
        let config = Config::default();
        Self {
            max_fibonacci_n: config.max_fibonacci_n() as i64,
            matrix_weights: config.matrix_weights().to_vec(),
            alpha_schedule: config.alpha_schedule().to_vec(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn` or `error` (case-insensitive).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level> {
        self.level
            .parse::<Level>()
            .map_err(|_| SpiralError::InvalidConfig(format!("unknown log level: {}", self.level)))
    }

    pub fn is_json(&self) -> bool {
        self.format == LogFormat::Json
    }
}

impl FileConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SpiralError::ConfigParse(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
            .map_err(|e| SpiralError::ConfigParse(format!("{}: {e}", path.display())))
    }

    /// Like [`FileConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply a mode override such as the value of [`MODE_ENV_VAR`].
    pub fn apply_mode_override(&mut self, value: Option<&str>) -> Result<()> {
        if let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.pipeline.mode = raw.parse::<Mode>().map_err(SpiralError::InvalidConfig)?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        let mode = std::env::var(MODE_ENV_VAR).ok();
        self.apply_mode_override(mode.as_deref())
    }

    /// Validate the `pipeline` and `quantum` sections into a [`Config`].
    pub fn to_config(&self) -> Result<Config> {
        self.logging.level()?;
        Config::builder()
            .mode(self.pipeline.mode)
            .max_iterations(self.pipeline.max_iterations)
            .confidence_threshold(self.pipeline.confidence_threshold)
            .success_threshold(self.pipeline.success_threshold)
            .degradation(self.pipeline.degradation)
            .max_fibonacci_n(self.quantum.max_fibonacci_n)
            .matrix_weights(self.quantum.matrix_weights.clone())
            .alpha_schedule(self.quantum.alpha_schedule.clone())
            .build()
    }
}

/// Load `path` (defaults if missing), apply env overrides and validate.
pub fn load_config(path: &Path) -> Result<(FileConfig, Config)> {
    let mut file = FileConfig::load_or_default(path)?;
    file.apply_env_overrides()?;
    let config = file.to_config()?;
    Ok((file, config))
}
