use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, instrument, warn};

use super::processing::consensus::{ConsensusReport, ConsensusSelector};
use super::processing::denoise::{DbscanDenoiser, DenoiseOutput};
use super::processing::iqr::{IqrFilter, IqrOutput};
use super::storage::ArtifactStore;
use crate::config::PipelineConfig;
use crate::error::{Result, TrackerError};
use crate::types::{ConsensusTier, DenoiseErrorKind, ObservationTable};

/// A single stage, run against the artifacts of an earlier one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Iqr,
    Denoise,
    Consensus,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Iqr => "iqr",
            Stage::Denoise => "denoise",
            Stage::Consensus => "consensus",
        }
    }
}

/// Everything one run produced, stage by stage
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_date: String,
    pub iqr: IqrOutput,
    pub denoise: DenoiseOutput,
    pub consensus: ConsensusReport,
}

/// One line of the run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub item: String,
    /// IQR outliers; `None` for columns the filter skipped
    pub noise_count: Option<usize>,
    pub denoise_error: Option<DenoiseErrorKind>,
    pub n_clusters: usize,
    pub noise_ratio: f64,
    pub tier: ConsensusTier,
    pub price: Option<i64>,
}

impl PipelineResult {
    /// One summary per item, in consensus order
    pub fn summary(&self) -> Vec<ItemSummary> {
        self.consensus
            .results
            .iter()
            .map(|result| {
                let iqr = self.iqr.stats.iter().find(|s| s.item == result.item);
                let denoise = self.denoise.stats.iter().find(|s| s.item == result.item);
                ItemSummary {
                    item: result.item.clone(),
                    noise_count: iqr.map(|s| s.noise_count),
                    denoise_error: denoise.and_then(|s| s.error),
                    n_clusters: denoise.map_or(0, |s| s.n_clusters),
                    noise_ratio: denoise.map_or(0.0, |s| s.noise_ratio),
                    tier: result.tier,
                    price: result.price,
                }
            })
            .collect()
    }
}

/// Render the summary as a fixed-width table. Unknown prices print as `unknown`.
pub fn render_summary(summary: &[ItemSummary]) -> String {
    let width = summary.iter().map(|s| s.item.len()).max().unwrap_or(4).max(4);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$}  {:>8}  {:<17}  {:>8}  {:>11}  {:<19}  {:>8}",
        "item", "outliers", "denoise", "clusters", "noise_ratio", "tier", "price"
    );
    for s in summary {
        let outliers = s.noise_count.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
        let denoise = s.denoise_error.map(|e| e.as_str()).unwrap_or("ok");
        let price = s.price.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:<17}  {:>8}  {:>11.4}  {:<19}  {:>8}",
            s.item, outliers, denoise, s.n_clusters, s.noise_ratio, s.tier.as_str(), price
        );
    }
    out
}

/// Runs the IQR filter, the DBSCAN denoiser and the consensus selector in order
pub struct Pipeline {
    config: PipelineConfig,
    iqr: IqrFilter,
    denoiser: DbscanDenoiser,
    selector: ConsensusSelector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            iqr: IqrFilter::new(&config),
            denoiser: DbscanDenoiser::new(&config),
            selector: ConsensusSelector::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages in memory
    #[instrument(skip(self, table), fields(items = table.len()))]
    pub fn run(&self, table: &ObservationTable, run_date: &str) -> Result<PipelineResult> {
        if table.is_empty() {
            return Err(TrackerError::EmptyBatch);
        }
        info!("🚀 Starting price pipeline for {} ({} items)", run_date, table.len());

        let iqr = self.iqr.filter_table(table);
        let denoise = self.denoiser.denoise_table(&iqr.table);
        let consensus = self.selector.select_table(&denoise.table, &denoise.stats, run_date);

        let unknown: Vec<&str> = consensus.unknown_items().collect();
        if !unknown.is_empty() {
            warn!("No consensus for {} items: {}", unknown.len(), unknown.join(", "));
        }
        info!("✅ Pipeline finished for {}", run_date);

        Ok(PipelineResult {
            run_date: run_date.to_string(),
            iqr,
            denoise,
            consensus,
        })
    }

    /// Run every stage from the stored observations and persist each stage's artifacts
    pub fn run_with_store(&self, run_date: &str, store: &dyn ArtifactStore) -> Result<PipelineResult> {
        let table = store.load_observations(run_date)?;
        let result = self.run(&table, run_date)?;
        store.save_iqr(run_date, &result.iqr)?;
        store.save_denoised(run_date, &result.denoise)?;
        store.save_consensus(run_date, &result.consensus)?;
        Ok(result)
    }

    /// Run one stage from the previous stage's stored artifacts
    #[instrument(skip(self, store), fields(stage = stage.as_str()))]
    pub fn run_stage(&self, stage: Stage, run_date: &str, store: &dyn ArtifactStore) -> Result<()> {
        match stage {
            Stage::Iqr => {
                let table = store.load_observations(run_date)?;
                let output = self.iqr.filter_table(&table);
                store.save_iqr(run_date, &output)
            }
            Stage::Denoise => {
                let table = store.load_iqr(run_date)?;
                let output = self.denoiser.denoise_table(&table);
                store.save_denoised(run_date, &output)
            }
            Stage::Consensus => {
                let denoised = store.load_denoised(run_date)?;
                let report = self.selector.select_table(&denoised.table, &denoised.stats, run_date);
                store.save_consensus(run_date, &report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryArtifactStore;
    use crate::types::Observation;

    fn catalog() -> ObservationTable {
        let repeated: Vec<Observation> = [vec![Some(1099.0); 6], vec![Some(1150.0), Some(1180.0), Some(4999.0)]].concat();
        ObservationTable::from_numeric(vec![
            ("i7-8700K", repeated),
            ("i3-8100", vec![Some(420.0), Some(430.0), None]),
            ("i5-7500", vec![None, None]),
        ])
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let result = pipeline.run(&ObservationTable::default(), "2025-05-06");
        assert!(matches!(result, Err(TrackerError::EmptyBatch)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            variance_gate: -1.0,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn test_run_summary() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let result = pipeline.run(&catalog(), "2025-05-06").unwrap();
        let summary = result.summary();

        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].item, "i7-8700K");
        assert_eq!(summary[0].price, Some(1099));
        assert_eq!(summary[0].tier, ConsensusTier::Mode);
        assert_eq!(summary[0].noise_count, Some(1));

        assert_eq!(summary[1].denoise_error, Some(DenoiseErrorKind::InsufficientData));
        assert_eq!(summary[1].price, Some(420));

        assert_eq!(summary[2].tier, ConsensusTier::Unknown);
        assert_eq!(summary[2].price, None);

        let rendered = render_summary(&summary);
        assert!(rendered.lines().nth(3).unwrap().contains("unknown"));
        assert!(!rendered.lines().nth(3).unwrap().trim_end().ends_with(" 0"));
    }

    #[test]
    fn test_stages_through_store_match_in_memory_run() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let store = InMemoryArtifactStore::default();
        store.save_observations("2025-05-06", &catalog()).unwrap();

        pipeline.run_stage(Stage::Iqr, "2025-05-06", &store).unwrap();
        pipeline.run_stage(Stage::Denoise, "2025-05-06", &store).unwrap();
        pipeline.run_stage(Stage::Consensus, "2025-05-06", &store).unwrap();

        let staged = store.consensus_report("2025-05-06").unwrap();
        let direct = pipeline.run(&catalog(), "2025-05-06").unwrap();
        assert_eq!(staged, direct.consensus);
    }

    #[test]
    fn test_stage_without_input_fails() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let store = InMemoryArtifactStore::default();
        assert!(matches!(
            pipeline.run_stage(Stage::Denoise, "2025-05-06", &store),
            Err(TrackerError::MissingInput(_))
        ));
    }
}
