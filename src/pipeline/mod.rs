// Price pipeline: ingestion, processing, storage, and the stage orchestrator

pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod storage;

// Re-export key types from each stage
pub use orchestrator::{render_summary, ItemSummary, Pipeline, PipelineResult, Stage};
pub use processing::consensus::{ConsensusReport, ConsensusSelector};
pub use processing::denoise::{DbscanDenoiser, DenoiseError, DenoiseOutput};
pub use processing::iqr::{IqrFilter, IqrOutput};
pub use storage::{ArtifactStore, CsvArtifactStore, InMemoryArtifactStore};
