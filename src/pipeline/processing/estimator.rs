//! Data-driven DBSCAN parameters for a standardized 1-D sample.
//!
//! `min_samples` grows slowly with the sample size. `eps` comes from the
//! k-distance curve (each point's distance to its `min_samples`-th nearest
//! neighbour, the point itself included, sorted ascending): a knee estimate,
//! capped by a high quantile of the curve and by a multiple of the knee, with
//! a lower-quantile fallback when the result is unusable.

use thiserror::Error;
use tracing::debug;

use super::statistics::quantile_sorted;
use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbscanParams {
    pub eps: f64,
    pub min_samples: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("{n} points cannot supply {min_samples} neighbours each")]
    TooFewPoints { n: usize, min_samples: usize },

    #[error("sample contains non-finite values")]
    NonFinite,
}

pub struct AdaptiveParameterEstimator {
    min_samples_factor: f64,
    min_samples_floor: usize,
    quantile_threshold: f64,
    max_eps_ratio: f64,
    min_data_size_for_knee: usize,
    eps_safety_ratio: f64,
    fallback_quantile: f64,
}

impl AdaptiveParameterEstimator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            min_samples_factor: config.min_samples_factor,
            min_samples_floor: config.min_samples_floor,
            quantile_threshold: config.quantile_threshold,
            max_eps_ratio: config.max_eps_ratio,
            min_data_size_for_knee: config.min_data_size_for_knee,
            eps_safety_ratio: config.eps_safety_ratio,
            fallback_quantile: config.fallback_quantile,
        }
    }

    /// `max(floor, floor(factor * ln(n + 1)))`
    pub fn min_samples(&self, n: usize) -> usize {
        let scaled = (self.min_samples_factor * ((n + 1) as f64).ln()).floor();
        self.min_samples_floor.max(scaled as usize)
    }

    /// Estimate `(eps, min_samples)` for a standardized sample
    pub fn estimate(&self, scaled: &[f64]) -> Result<DbscanParams, EstimateError> {
        let min_samples = self.min_samples(scaled.len());
        let curve = k_distance_curve(scaled, min_samples)?;
        let eps_auto = self.knee(&curve);
        let eps = self.resolve_eps(&curve, eps_auto);

        debug!(
            n = scaled.len(),
            min_samples,
            eps_auto,
            eps,
            "Estimated density parameters"
        );

        Ok(DbscanParams { eps, min_samples })
    }

    /// Knee of a sorted k-distance curve: the value at the last index where the
    /// discrete second derivative is positive. Short curves, and curves with no
    /// such index, use the maximum k-distance.
    pub fn knee(&self, curve: &[f64]) -> f64 {
        let max_k = curve.last().copied().unwrap_or(0.0);
        if curve.len() < self.min_data_size_for_knee {
            return max_k;
        }

        let d2 = second_derivative(curve);
        match d2.iter().rposition(|v| *v > 0.0) {
            Some(idx) => curve[idx],
            None => max_k,
        }
    }

    /// Combine the knee with the quantile ceiling and ratio cap, then apply
    /// the safety check. A rejected value is replaced by the fallback quantile.
    pub fn resolve_eps(&self, curve: &[f64], eps_auto: f64) -> f64 {
        let Some(max_k) = curve.last().copied() else {
            return 0.0;
        };
        let eps_quantile = quantile_sorted(curve, self.quantile_threshold).unwrap_or(max_k);

        let eps = eps_auto
            .min(eps_quantile)
            .min(self.max_eps_ratio * eps_auto);

        let ceiling = self.eps_safety_ratio * max_k;
        let knee_unusable = !eps_auto.is_finite() || eps_auto > ceiling;
        if !(eps > 0.0) || eps > ceiling || knee_unusable {
            let fallback = quantile_sorted(curve, self.fallback_quantile).unwrap_or(max_k);
            debug!(eps_auto, eps, fallback, "eps rejected, using fallback quantile");
            return fallback;
        }
        eps
    }
}

/// Sorted distances from each point to its `k`-th nearest neighbour, the point itself counted first.
pub fn k_distance_curve(points: &[f64], k: usize) -> Result<Vec<f64>, EstimateError> {
    let n = points.len();
    if k == 0 || n < k {
        return Err(EstimateError::TooFewPoints { n, min_samples: k });
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Err(EstimateError::NonFinite);
    }

    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    // In one dimension the k nearest points of sorted[p] form a window of k
    // consecutive sorted values containing p; its radius is the k-distance.
    let mut curve: Vec<f64> = (0..n)
        .map(|p| {
            let first = p.saturating_sub(k - 1);
            let last = p.min(n - k);
            (first..=last)
                .map(|s| (sorted[p] - sorted[s]).max(sorted[s + k - 1] - sorted[p]))
                .fold(f64::INFINITY, f64::min)
        })
        .collect();

    curve.sort_by(|a, b| a.total_cmp(b));
    Ok(curve)
}

/// Unit-spacing gradient: central differences inside, one-sided at the ends
fn gradient(y: &[f64]) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut g = vec![0.0; n];
    g[0] = y[1] - y[0];
    g[n - 1] = y[n - 1] - y[n - 2];
    for i in 1..n - 1 {
        g[i] = (y[i + 1] - y[i - 1]) / 2.0;
    }
    g
}

/// Discrete second derivative, the gradient applied twice
pub fn second_derivative(curve: &[f64]) -> Vec<f64> {
    gradient(&gradient(curve))
}
