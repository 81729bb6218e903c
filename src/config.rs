// Extraction configuration
// Analysis parameters and batch settings, loadable from a JSON file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::metrics::{LevelConfig, SpectralConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// How a batch is executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Process sources on a bounded worker pool instead of one after another
    pub parallel: bool,

    /// Worker count for parallel runs (None = available parallelism)
    pub workers: Option<usize>,

    /// Per-source time limit. Sequential sessions with a limit run on one worker.
    pub timeout_secs: Option<f64>,

    /// Directory for staged uploads (None = system temp dir)
    pub staging_dir: Option<PathBuf>,

    /// Maximum number of cached batch results (None = unbounded)
    pub cache_capacity: Option<usize>,

    /// Append a JSONL progress trace to this file
    pub trace_path: Option<PathBuf>,
}

/// Upper bound on `workers`
pub const MAX_WORKERS: usize = 1024;

impl BatchConfig {
    /// The time limit as a `Duration`. Values `validate` rejects map to None.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|limit| !limit.is_zero())
    }
}

/// Full configuration for an extraction session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub level: LevelConfig,
    pub spectral: SpectralConfig,
    pub batch: BatchConfig,
}

impl ExtractionConfig {
    /// Load and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ExtractionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level.validate().map_err(ConfigError::Invalid)?;
        self.spectral.validate().map_err(ConfigError::Invalid)?;

        if let Some(workers) = self.batch.workers {
            if !(1..=MAX_WORKERS).contains(&workers) {
                return Err(ConfigError::Invalid(format!(
                    "workers must be between 1 and {}, got {}",
                    MAX_WORKERS, workers
                )));
            }
        }
        if let Some(secs) = self.batch.timeout_secs {
            let representable = Duration::try_from_secs_f64(secs).is_ok_and(|d| !d.is_zero());
            if !(secs > 0.0 && representable) {
                return Err(ConfigError::Invalid(format!(
                    "timeout_secs must be a positive duration, got {}",
                    secs
                )));
            }
        }
        if self.batch.cache_capacity == Some(0) {
            return Err(ConfigError::Invalid(
                "cache_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
