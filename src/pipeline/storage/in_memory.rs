use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{ArtifactStore, HistoryColumn};
use crate::error::{Result, TrackerError};
use crate::pipeline::processing::consensus::ConsensusReport;
use crate::pipeline::processing::denoise::DenoiseOutput;
use crate::pipeline::processing::iqr::IqrOutput;
use crate::types::ObservationTable;

/// In-memory artifact store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    observations: Arc<Mutex<HashMap<String, ObservationTable>>>,
    iqr: Arc<Mutex<HashMap<String, IqrOutput>>>,
    denoised: Arc<Mutex<HashMap<String, DenoiseOutput>>>,
    consensus: Arc<Mutex<HashMap<String, ConsensusReport>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consensus_report(&self, date: &str) -> Option<ConsensusReport> {
        self.consensus.lock().unwrap().get(date).cloned()
    }
}

fn missing(kind: &str, date: &str) -> TrackerError {
    TrackerError::MissingInput(PathBuf::from(format!("memory://{kind}/{date}")))
}

impl ArtifactStore for InMemoryArtifactStore {
    fn load_observations(&self, date: &str) -> Result<ObservationTable> {
        let observations = self.observations.lock().unwrap();
        observations.get(date).cloned().ok_or_else(|| missing("observations", date))
    }

    fn save_observations(&self, date: &str, table: &ObservationTable) -> Result<()> {
        let mut observations = self.observations.lock().unwrap();
        observations.insert(date.to_string(), table.clone());
        debug!("Stored observations for {} ({} items)", date, table.len());
        Ok(())
    }

    fn load_iqr(&self, date: &str) -> Result<ObservationTable> {
        let iqr = self.iqr.lock().unwrap();
        iqr.get(date).map(|o| o.table.clone()).ok_or_else(|| missing("iqr", date))
    }

    fn save_iqr(&self, date: &str, output: &IqrOutput) -> Result<()> {
        let mut iqr = self.iqr.lock().unwrap();
        iqr.insert(date.to_string(), output.clone());
        debug!("Stored IQR output for {}", date);
        Ok(())
    }

    fn load_denoised(&self, date: &str) -> Result<DenoiseOutput> {
        let denoised = self.denoised.lock().unwrap();
        denoised.get(date).cloned().ok_or_else(|| missing("dbscan", date))
    }

    fn save_denoised(&self, date: &str, output: &DenoiseOutput) -> Result<()> {
        let mut denoised = self.denoised.lock().unwrap();
        denoised.insert(date.to_string(), output.clone());
        debug!("Stored denoise output for {}", date);
        Ok(())
    }

    fn load_consensus(&self, date: &str) -> Result<HistoryColumn> {
        let consensus = self.consensus.lock().unwrap();
        consensus
            .get(date)
            .map(HistoryColumn::from)
            .ok_or_else(|| missing("consensus", date))
    }

    fn save_consensus(&self, date: &str, report: &ConsensusReport) -> Result<()> {
        let mut consensus = self.consensus.lock().unwrap();
        consensus.insert(date.to_string(), report.clone());
        debug!("Stored consensus for {}", date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsensusResult, ConsensusTier};

    #[test]
    fn test_missing_artifact_is_missing_input() {
        let store = InMemoryArtifactStore::new();
        assert!(matches!(store.load_iqr("2025-05-06"), Err(TrackerError::MissingInput(_))));
    }

    #[test]
    fn test_consensus_is_exposed_as_history_column() {
        let store = InMemoryArtifactStore::new();
        let report = ConsensusReport {
            run_date: "2025-05-06".to_string(),
            results: vec![ConsensusResult::priced("i5-9400F", 650, ConsensusTier::VarianceGatedMean)],
        };
        store.save_consensus("2025-05-06", &report).unwrap();

        let column = store.load_consensus("2025-05-06").unwrap();
        assert_eq!(column.date, "2025-05-06");
        assert_eq!(column.values, vec![("i5-9400F".to_string(), Some(650))]);
        assert!(store.load_consensus("2025-05-07").is_err());
    }
}
