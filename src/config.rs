use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants;
use crate::error::{Result, TrackerError};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "TRACKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub paths: PathsConfig,
}

/// Thresholds and factors for the three cleaning stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Outlier fence width, in IQRs beyond Q1/Q3
    pub iqr_multiplier: f64,
    /// |z| below which a cleaned value counts toward the normality score
    pub normality_z: f64,
    /// Density-threshold scaling: `min_samples = max(floor, factor * ln(n + 1))`
    pub min_samples_factor: f64,
    pub min_samples_floor: usize,
    /// Fewer valid observations than this skip clustering
    pub min_valid_observations: usize,
    /// Quantile of the k-distance curve used as the eps ceiling
    pub quantile_threshold: f64,
    /// Cap on eps relative to the knee estimate
    pub max_eps_ratio: f64,
    /// Knee detection only runs on samples at least this large
    pub min_data_size_for_knee: usize,
    /// eps above `ratio * max(k-distance)` is rejected
    pub eps_safety_ratio: f64,
    /// Quantile of the k-distance curve used when eps is rejected
    pub fallback_quantile: f64,
    /// Minimum repeat count for a price to be a mode candidate
    pub mode_min_count: usize,
    /// Cleaned mean is trusted only below this scaled variance
    pub variance_gate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            normality_z: 2.0,
            min_samples_factor: 0.1,
            min_samples_floor: 5,
            min_valid_observations: 5,
            quantile_threshold: 0.95,
            max_eps_ratio: 1.5,
            min_data_size_for_knee: 20,
            eps_safety_ratio: 1.2,
            fallback_quantile: 0.9,
            mode_min_count: 5,
            variance_gate: 0.8,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("iqr_multiplier", self.iqr_multiplier),
            ("normality_z", self.normality_z),
            ("max_eps_ratio", self.max_eps_ratio),
            ("eps_safety_ratio", self.eps_safety_ratio),
            ("variance_gate", self.variance_gate),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackerError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if !(self.min_samples_factor.is_finite() && self.min_samples_factor >= 0.0) {
            return Err(TrackerError::Config(format!(
                "min_samples_factor must be non-negative, got {}",
                self.min_samples_factor
            )));
        }

        for (name, q) in [
            ("quantile_threshold", self.quantile_threshold),
            ("fallback_quantile", self.fallback_quantile),
        ] {
            if !(q > 0.0 && q <= 1.0) {
                return Err(TrackerError::Config(format!(
                    "{name} must be in (0, 1], got {q}"
                )));
            }
        }

        if self.min_samples_floor == 0 || self.mode_min_count == 0 {
            return Err(TrackerError::Config(
                "min_samples_floor and mode_min_count must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Directory layout and file naming of the daily artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub analysis_dir: PathBuf,
    pub result_dir: PathBuf,
    pub history_file: PathBuf,
    /// Regex selecting item columns in the raw scrape
    pub item_pattern: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::DATA_DIR),
            analysis_dir: PathBuf::from(constants::ANALYSIS_DIR),
            result_dir: PathBuf::from(constants::RESULT_DIR),
            history_file: PathBuf::from(constants::HISTORY_FILE),
            item_pattern: constants::ITEM_PATTERN.to_string(),
        }
    }
}

impl PathsConfig {
    pub fn raw_input(&self, date: &str) -> PathBuf {
        self.data_dir.join(constants::artifact_name(date, constants::RAW_INPUT_SUFFIX))
    }

    pub fn reshaped(&self, date: &str) -> PathBuf {
        self.data_dir.join(constants::artifact_name(date, constants::RESHAPED_SUFFIX))
    }

    pub fn iqr_table(&self, date: &str) -> PathBuf {
        self.analysis_dir.join(constants::artifact_name(date, constants::IQR_SUFFIX))
    }

    pub fn iqr_stats(&self, date: &str) -> PathBuf {
        self.analysis_dir.join(constants::artifact_name(date, constants::IQR_STATS_SUFFIX))
    }

    pub fn dbscan_table(&self, date: &str) -> PathBuf {
        self.analysis_dir.join(constants::artifact_name(date, constants::DBSCAN_SUFFIX))
    }

    pub fn dbscan_stats(&self, date: &str) -> PathBuf {
        self.analysis_dir.join(constants::artifact_name(date, constants::DBSCAN_STATS_SUFFIX))
    }

    pub fn consensus(&self, date: &str) -> PathBuf {
        self.result_dir.join(constants::artifact_name(date, constants::CONSENSUS_SUFFIX))
    }
}

impl Config {
    /// Load from an explicit path, `$TRACKER_CONFIG`, or `config.toml`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };

        if !config_path.exists() {
            if path.is_some() {
                return Err(TrackerError::MissingInput(config_path));
            }
            debug!("No config file at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| {
            TrackerError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.pipeline.validate()?;
        Ok(config)
    }
}
