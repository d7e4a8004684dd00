use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid item pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Table in {} has no columns or no rows", .0.display())]
    EmptyTable(PathBuf),

    #[error("Observation batch has no items")]
    EmptyBatch,

    #[error("No item columns match pattern '{0}' (expected names like 'i7-8700K')")]
    NoItemColumns(String),

    #[error("Invalid cell in column '{item}' at row {row}: {message}")]
    InvalidCell {
        item: String,
        row: usize,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, TrackerError>;
