use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::dbscan::dbscan;
use super::estimator::{AdaptiveParameterEstimator, DbscanParams};
use super::statistics::{self, round_significant, round_to, Standardizer};
use crate::config::PipelineConfig;
use crate::constants::STATS_PRECISION;
use crate::metrics;
use crate::types::{ColumnData, DenoiseErrorKind, DenoiseStats, ItemColumn, Observation, ObservationTable};

/// Why a column was left unclustered. The column is passed through unchanged in every case.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DenoiseError {
    #[error("{valid} valid observations, at least {required} required")]
    InsufficientData { valid: usize, required: usize },

    #[error("no usable density threshold: {0}")]
    InvalidEps(String),

    #[error("clustering failed: {0}")]
    Processing(String),
}

impl DenoiseError {
    pub fn kind(&self) -> DenoiseErrorKind {
        match self {
            DenoiseError::InsufficientData { .. } => DenoiseErrorKind::InsufficientData,
            DenoiseError::InvalidEps(_) => DenoiseErrorKind::InvalidEps,
            DenoiseError::Processing(_) => DenoiseErrorKind::ProcessingError,
        }
    }
}

/// A column after clustering, with noise points replaced by missing entries
#[derive(Debug, Clone, PartialEq)]
pub struct DenoisedColumn {
    pub values: Vec<Observation>,
    pub params: DbscanParams,
    pub n_clusters: usize,
    pub noise_ratio: f64,
    pub cleaned_mean: Option<f64>,
    pub scaled_var: Option<f64>,
}

impl DenoisedColumn {
    pub fn stats(&self, item: &str) -> DenoiseStats {
        DenoiseStats {
            item: item.to_string(),
            error: None,
            // Standardized eps can sit far below 1e-4
            eps: Some(round_significant(self.params.eps, STATS_PRECISION)),
            noise_ratio: round_to(self.noise_ratio, STATS_PRECISION),
            n_clusters: self.n_clusters,
            cleaned_mean: self.cleaned_mean.map(|m| round_to(m, STATS_PRECISION)),
            scaled_var: self.scaled_var.map(|v| round_to(v, STATS_PRECISION)),
        }
    }
}

/// Output of the denoise stage
#[derive(Debug, Clone)]
pub struct DenoiseOutput {
    pub table: ObservationTable,
    pub stats: Vec<DenoiseStats>,
}

/// Re-clusters each item's IQR-cleaned values in standardized space and drops DBSCAN noise
pub struct DbscanDenoiser {
    estimator: AdaptiveParameterEstimator,
    min_valid_observations: usize,
}

impl DbscanDenoiser {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            estimator: AdaptiveParameterEstimator::new(config),
            min_valid_observations: config.min_valid_observations,
        }
    }

    /// Cluster one column. Missing entries stay missing and keep their positions.
    pub fn denoise_column(&self, values: &[Observation]) -> Result<DenoisedColumn, DenoiseError> {
        let (positions, valid): (Vec<usize>, Vec<f64>) = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|x| (i, x)))
            .unzip();

        if valid.len() < self.min_valid_observations {
            return Err(DenoiseError::InsufficientData {
                valid: valid.len(),
                required: self.min_valid_observations,
            });
        }

        let scaler = Standardizer::fit(&valid)
            .ok_or_else(|| DenoiseError::Processing("observations are not finite".to_string()))?;
        let scaled = scaler.transform(&valid);

        let params = self
            .estimator
            .estimate(&scaled)
            .map_err(|e| DenoiseError::InvalidEps(e.to_string()))?;
        if !(params.eps > 0.0) {
            return Err(DenoiseError::InvalidEps(format!("eps = {}", params.eps)));
        }

        let clustering = dbscan(&scaled, params.eps, params.min_samples);

        let mut cleaned = values.to_vec();
        let mut retained_scaled = Vec::with_capacity(valid.len());
        let mut retained = Vec::with_capacity(valid.len());
        for (k, &pos) in positions.iter().enumerate() {
            if clustering.is_noise(k) {
                cleaned[pos] = None;
            } else {
                retained_scaled.push(scaled[k]);
                retained.push(valid[k]);
            }
        }

        let scaled_var = if retained_scaled.len() > 1 {
            statistics::population_variance(&retained_scaled)
        } else {
            None
        };

        Ok(DenoisedColumn {
            values: cleaned,
            params,
            n_clusters: clustering.n_clusters,
            noise_ratio: clustering.noise_count() as f64 / valid.len() as f64,
            cleaned_mean: statistics::mean(&retained),
            scaled_var,
        })
    }

    /// Denoise one item, folding any failure into its stats record
    pub fn denoise_item(&self, column: &ItemColumn) -> (ItemColumn, DenoiseStats) {
        let result = match &column.data {
            ColumnData::Numeric(values) => self.denoise_column(values),
            ColumnData::Text(_) => Err(DenoiseError::Processing("column is not numeric".to_string())),
        };

        match result {
            Ok(denoised) => {
                let stats = denoised.stats(&column.name);
                debug!(
                    item = %column.name,
                    eps = denoised.params.eps,
                    n_clusters = denoised.n_clusters,
                    noise_ratio = denoised.noise_ratio,
                    "Denoised column"
                );
                (ItemColumn::numeric(column.name.clone(), denoised.values), stats)
            }
            Err(e) => {
                match e {
                    DenoiseError::InsufficientData { .. } => {
                        debug!(item = %column.name, "Skipping clustering: {}", e)
                    }
                    _ => warn!(item = %column.name, "Skipping clustering: {}", e),
                }
                (column.clone(), DenoiseStats::failed(column.name.clone(), e.kind()))
            }
        }
    }

    #[instrument(skip(self, table), fields(items = table.len()))]
    pub fn denoise_table(&self, table: &ObservationTable) -> DenoiseOutput {
        let _timer = metrics::StageTimer::new("denoise");

        let (columns, stats): (Vec<ItemColumn>, Vec<DenoiseStats>) = table
            .columns()
            .par_iter()
            .map(|column| self.denoise_item(column))
            .unzip();

        for s in &stats {
            metrics::record_denoise_outcome(s.error, s.noise_ratio);
        }

        let clustered = stats.iter().filter(|s| s.is_ok()).count();
        info!(
            "Denoise stage clustered {} of {} items ({} passed through)",
            clustered,
            stats.len(),
            stats.len() - clustered
        );

        DenoiseOutput {
            table: ObservationTable::new(columns),
            stats,
        }
    }
}
