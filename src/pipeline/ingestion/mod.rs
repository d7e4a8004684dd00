// Pipeline ingestion: raw scrape files into observation tables

pub mod reshape;

pub use reshape::{reshape_raw, reshape_records};
