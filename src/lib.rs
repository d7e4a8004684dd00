pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::{Config, PathsConfig, PipelineConfig};
pub use error::{Result, TrackerError};
pub use pipeline::{Pipeline, PipelineResult};
pub use types::{ColumnData, ConsensusResult, ConsensusTier, DenoiseStats, ItemColumn, ObservationTable};
