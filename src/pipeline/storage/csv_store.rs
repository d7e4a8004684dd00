//! CSV artifacts for every stage boundary, laid out by run date:
//! `data/<date>_output.csv`, `ana/<date>_iqr.csv`, `ana/<date>_iqr_stats.csv`,
//! `ana/<date>_dbscan.csv`, `ana/<date>_dbscan_stats.csv`, `result/<date>_od.csv`.

use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::history::HistoryColumn;
use super::ArtifactStore;
use crate::config::PathsConfig;
use crate::constants::{self, NAME_COLUMN};
use crate::error::{Result, TrackerError};
use crate::pipeline::processing::consensus::ConsensusReport;
use crate::pipeline::processing::denoise::DenoiseOutput;
use crate::pipeline::processing::iqr::IqrOutput;
use crate::pipeline::processing::statistics::round_price;
use crate::types::{ColumnStats, DenoiseStats, ItemColumn, ObservationTable};

/// Read a wide table: one column per item, one observation per row
pub fn read_observation_table(path: &Path) -> Result<ObservationTable> {
    if !path.exists() {
        return Err(TrackerError::MissingInput(path.to_path_buf()));
    }

    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(TrackerError::EmptyTable(path.to_path_buf()));
    }

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (col, column_cells) in cells.iter_mut().enumerate() {
            let cell = record.get(col).unwrap_or("");
            column_cells.push(if constants::is_missing_marker(cell) {
                None
            } else {
                Some(cell.trim().to_string())
            });
        }
    }

    if cells.first().map_or(true, |c| c.is_empty()) {
        return Err(TrackerError::EmptyTable(path.to_path_buf()));
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, column_cells)| infer_column(name, column_cells))
        .collect();

    let table = ObservationTable::new(columns);
    debug!(
        path = %path.display(),
        items = table.len(),
        rows = table.n_rows(),
        "Read observation table"
    );
    Ok(table)
}

/// A column is numeric when every present cell parses as a number
fn infer_column(name: String, cells: Vec<Option<String>>) -> ItemColumn {
    let parsed: Option<Vec<Option<f64>>> = cells
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => s.parse::<f64>().ok().map(Some),
        })
        .collect();

    match parsed {
        Some(values) => ItemColumn::numeric(name, values),
        None => ItemColumn::text(name, cells),
    }
}

pub fn write_observation_table(path: &Path, table: &ObservationTable) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(table.items())?;
    for row in 0..table.n_rows() {
        writer.write_record(table.columns().iter().map(|c| c.data.cell(row)))?;
    }
    writer.flush()?;
    debug!(path = %path.display(), items = table.len(), "Wrote observation table");
    Ok(())
}

fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_column_stats(path: &Path, stats: &[ColumnStats]) -> Result<()> {
    write_records(path, stats)
}

pub fn write_denoise_stats(path: &Path, stats: &[DenoiseStats]) -> Result<()> {
    write_records(path, stats)
}

pub fn read_denoise_stats(path: &Path) -> Result<Vec<DenoiseStats>> {
    if !path.exists() {
        return Err(TrackerError::MissingInput(path.to_path_buf()));
    }
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let stats = reader.deserialize().collect::<std::result::Result<Vec<DenoiseStats>, _>>()?;
    Ok(stats)
}

/// `name,<run date>` with one row per item; unknown consensus is an empty cell
pub fn write_consensus(path: &Path, report: &ConsensusReport) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record([NAME_COLUMN, report.run_date.as_str()])?;
    for result in &report.results {
        let price = result.price.map(|p| p.to_string()).unwrap_or_default();
        writer.write_record([result.item.as_str(), price.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a consensus file back as the column it contributes to the history
pub fn read_consensus(path: &Path) -> Result<HistoryColumn> {
    if !path.exists() {
        return Err(TrackerError::MissingInput(path.to_path_buf()));
    }
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let date = reader
        .headers()?
        .get(1)
        .map(|h| h.trim().to_string())
        .ok_or_else(|| TrackerError::EmptyTable(path.to_path_buf()))?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let item = record.get(0).unwrap_or("").trim().to_string();
        let cell = record.get(1).unwrap_or("").trim();
        let price = if constants::is_missing_marker(cell) {
            None
        } else {
            let invalid = |message: String| TrackerError::InvalidCell {
                item: item.clone(),
                row: row + 1,
                message,
            };
            let parsed = cell.parse::<f64>().map_err(|e| invalid(e.to_string()))?;
            Some(round_price(parsed).ok_or_else(|| invalid(format!("'{cell}' is not a whole-currency price")))?)
        };
        values.push((item, price));
    }

    Ok(HistoryColumn { date, values })
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Artifact store backed by the dated CSV layout of [`PathsConfig`]
pub struct CsvArtifactStore {
    paths: PathsConfig,
}

impl CsvArtifactStore {
    pub fn new(paths: PathsConfig) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }
}

impl ArtifactStore for CsvArtifactStore {
    fn load_observations(&self, date: &str) -> Result<ObservationTable> {
        read_observation_table(&self.paths.reshaped(date))
    }

    fn save_observations(&self, date: &str, table: &ObservationTable) -> Result<()> {
        let path = self.paths.reshaped(date);
        write_observation_table(&path, table)?;
        info!("💾 Saved observations to {}", path.display());
        Ok(())
    }

    fn load_iqr(&self, date: &str) -> Result<ObservationTable> {
        read_observation_table(&self.paths.iqr_table(date))
    }

    fn save_iqr(&self, date: &str, output: &IqrOutput) -> Result<()> {
        write_observation_table(&self.paths.iqr_table(date), &output.table)?;
        write_column_stats(&self.paths.iqr_stats(date), &output.stats)?;
        info!("💾 Saved IQR artifacts to {}", self.paths.analysis_dir.display());
        Ok(())
    }

    fn load_denoised(&self, date: &str) -> Result<DenoiseOutput> {
        let table = read_observation_table(&self.paths.dbscan_table(date))?;
        let stats = read_denoise_stats(&self.paths.dbscan_stats(date))?;
        Ok(DenoiseOutput { table, stats })
    }

    fn save_denoised(&self, date: &str, output: &DenoiseOutput) -> Result<()> {
        write_observation_table(&self.paths.dbscan_table(date), &output.table)?;
        write_denoise_stats(&self.paths.dbscan_stats(date), &output.stats)?;
        info!("💾 Saved DBSCAN artifacts to {}", self.paths.analysis_dir.display());
        Ok(())
    }

    fn load_consensus(&self, date: &str) -> Result<HistoryColumn> {
        read_consensus(&self.paths.consensus(date))
    }

    fn save_consensus(&self, date: &str, report: &ConsensusReport) -> Result<()> {
        let path = self.paths.consensus(date);
        write_consensus(&path, report)?;
        info!("💾 Saved consensus to {}", path.display());
        Ok(())
    }
}
