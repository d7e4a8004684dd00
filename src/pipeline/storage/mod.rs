// Stage artifacts: the dated CSV layout, an in-memory store for tests and demos,
// and the long-running price history

pub mod csv_store;
pub mod history;
pub mod in_memory;

pub use csv_store::CsvArtifactStore;
pub use history::{AuditReport, HistoryColumn, PriceHistory};
pub use in_memory::InMemoryArtifactStore;

use crate::error::Result;
use crate::pipeline::processing::consensus::ConsensusReport;
use crate::pipeline::processing::denoise::DenoiseOutput;
use crate::pipeline::processing::iqr::IqrOutput;
use crate::types::ObservationTable;

/// Where each stage reads its input and leaves its output, keyed by run date
pub trait ArtifactStore: Send + Sync {
    /// Reshaped observations, the input of the IQR stage
    fn load_observations(&self, date: &str) -> Result<ObservationTable>;
    fn save_observations(&self, date: &str, table: &ObservationTable) -> Result<()>;

    /// IQR-cleaned table, the input of the denoise stage
    fn load_iqr(&self, date: &str) -> Result<ObservationTable>;
    fn save_iqr(&self, date: &str, output: &IqrOutput) -> Result<()>;

    /// Denoised table and its stats, the input of the consensus stage
    fn load_denoised(&self, date: &str) -> Result<DenoiseOutput>;
    fn save_denoised(&self, date: &str, output: &DenoiseOutput) -> Result<()>;

    fn load_consensus(&self, date: &str) -> Result<HistoryColumn>;
    fn save_consensus(&self, date: &str, report: &ConsensusReport) -> Result<()>;
}
