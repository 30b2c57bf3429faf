//! Unified configuration for the rentwatch batch pipeline.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (rentwatch.toml)
//! ```toml
//! profile = "health-first"
//!
//! [resolver]
//! merge_threshold = 0.8
//!
//! [pipeline]
//! as_of = "2024-06-30"
//!
//! [publish]
//! data_dir = "/var/lib/rentwatch"
//! recent_event_limit = 20
//! ```
//!
//! Environment variables use the `RENTWATCH_` prefix with `__` between
//! sections, e.g. `RENTWATCH_RESOLVER__MERGE_THRESHOLD=0.8`.

mod defaults;
mod tuning;

pub use defaults::*;
pub use tuning::*;

use chrono::NaiveDate;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RentwatchConfig {
    /// Scoring preset used when `scoring` is not given explicitly
    pub profile: ScoringProfile,
    /// Owner resolver weights and thresholds
    pub resolver: ResolverTuning,
    /// Explicit scoring calibration; overrides `profile` when present
    pub scoring: Option<ScoringConfig>,
    /// Snapshot-level settings
    pub pipeline: PipelineConfig,
    /// Serving store and report shape
    pub publish: PublishConfig,
}

impl RentwatchConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RentwatchConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with RENTWATCH_ prefix
        figment = figment.merge(Env::prefixed("RENTWATCH_").split("__"));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: RentwatchConfig = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// The effective scoring calibration.
    pub fn scoring_config(&self) -> ScoringConfig {
        self.scoring
            .clone()
            .unwrap_or_else(|| ScoringConfig::from_profile(self.profile))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolver.validate()?;
        self.scoring_config().validate()?;
        self.publish.validate()?;
        Ok(())
    }
}

/// Snapshot-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Reference date for recency windows. Defaults to the latest date seen in
    /// the snapshot so reruns on the same snapshot agree.
    pub as_of: Option<NaiveDate>,
    /// Size of the worker pool; defaults to the number of CPU cores
    pub worker_threads: Option<usize>,
}

impl PipelineConfig {
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .filter(|threads| *threads > 0)
            .unwrap_or_else(default_worker_threads)
    }
}

/// Publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Persistent serving store directory
    pub data_dir: Option<PathBuf>,
    /// Write the generation as JSON to this file instead of a store
    pub output: Option<PathBuf>,
    /// Maximum number of recent events per building report
    pub recent_event_limit: usize,
    /// Entries per leaderboard
    pub leaderboard_size: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            output: None,
            recent_event_limit: DEFAULT_RECENT_EVENT_LIMIT,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
        }
    }
}

impl PublishConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.is_some() && self.output.is_some() {
            return Err(ConfigError::new(
                "publish.data_dir and publish.output are mutually exclusive",
            ));
        }
        Ok(())
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ScoringProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
