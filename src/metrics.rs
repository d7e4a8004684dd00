//! Stage metrics
//!
//! Counters and timings go through the `metrics` facade. Without an installed
//! recorder they are no-ops; `install_snapshot_recorder` installs a
//! Prometheus recorder whose rendered text is written out at the end of a run.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use crate::error::{Result, TrackerError};
use crate::types::{ConsensusTier, DenoiseErrorKind};

pub const STAGE_DURATION: &str = "tracker_stage_duration_seconds";
pub const IQR_OUTLIERS: &str = "tracker_iqr_outliers_total";
pub const DENOISE_ITEMS: &str = "tracker_denoise_items_total";
pub const DENOISE_NOISE_RATIO: &str = "tracker_denoise_noise_ratio";
pub const CONSENSUS_ITEMS: &str = "tracker_consensus_items_total";

/// A timing guard that records the stage duration when dropped
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(STAGE_DURATION, "stage" => self.stage).record(duration);
    }
}

pub fn record_iqr_outliers(item: &str, count: usize) {
    ::metrics::counter!(IQR_OUTLIERS, "item" => item.to_string()).increment(count as u64);
}

pub fn record_denoise_outcome(error: Option<DenoiseErrorKind>, noise_ratio: f64) {
    let outcome = error.map(|e| e.as_str()).unwrap_or("clustered");
    ::metrics::counter!(DENOISE_ITEMS, "outcome" => outcome).increment(1);
    if error.is_none() {
        ::metrics::histogram!(DENOISE_NOISE_RATIO).record(noise_ratio);
    }
}

pub fn record_consensus_tier(tier: ConsensusTier) {
    ::metrics::counter!(CONSENSUS_ITEMS, "tier" => tier.as_str()).increment(1);
}

/// Install a global Prometheus recorder and return the handle used to render it
pub fn install_snapshot_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TrackerError::Config(format!("Failed to install metrics recorder: {e}")))
}
