//! The price history: one row per item, one column per run date.
//!
//! ```text
//! name,2025-05-05,2025-05-06
//! i7-8700K,1099,1089
//! i5-9400F,,650
//! ```

use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use super::csv_store::ensure_parent;
use crate::constants::{self, NAME_COLUMN};
use crate::error::{Result, TrackerError};
use crate::pipeline::processing::consensus::ConsensusReport;

/// One run's consensus as it is appended to the history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryColumn {
    pub date: String,
    pub values: Vec<(String, Option<i64>)>,
}

impl From<&ConsensusReport> for HistoryColumn {
    fn from(report: &ConsensusReport) -> Self {
        Self {
            date: report.run_date.clone(),
            values: report
                .results
                .iter()
                .map(|r| (r.item.clone(), r.price))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HistoryRow {
    name: String,
    cells: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    name_header: String,
    dates: Vec<String>,
    rows: Vec<HistoryRow>,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self {
            name_header: NAME_COLUMN.to_string(),
            dates: Vec::new(),
            rows: Vec::new(),
        }
    }
}

impl PriceHistory {
    /// Load the history; a missing file is an empty history
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let Some(name_header) = headers.get(0) else {
            return Ok(Self::default());
        };
        let dates: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let name = record.get(0).unwrap_or("").trim().to_string();
            let cells = (0..dates.len())
                .map(|i| {
                    let cell = record.get(i + 1).unwrap_or("");
                    (!constants::is_missing_marker(cell)).then(|| cell.trim().to_string())
                })
                .collect();
            rows.push(HistoryRow { name, cells });
        }

        Ok(Self {
            name_header: name_header.trim().to_string(),
            dates,
            rows,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent(path)?;
        let mut writer = WriterBuilder::new().from_path(path)?;
        writer.write_record(std::iter::once(self.name_header.as_str()).chain(self.dates.iter().map(String::as_str)))?;
        for row in &self.rows {
            let cells = row.cells.iter().map(|c| c.as_deref().unwrap_or(""));
            writer.write_record(std::iter::once(row.name.as_str()).chain(cells))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    /// Cell for an item on a date; `None` for empty or absent cells
    pub fn price(&self, item: &str, date: &str) -> Option<&str> {
        let col = self.dates.iter().position(|d| d == date)?;
        let row = self.rows.iter().find(|r| r.name == item)?;
        row.cells.get(col)?.as_deref()
    }

    /// Add a run's column, matched by item name. Re-merging a date replaces its column.
    pub fn merge(&mut self, column: &HistoryColumn) {
        let col = match self.dates.iter().position(|d| *d == column.date) {
            Some(existing) => {
                warn!("History already has {}, replacing that column", column.date);
                for row in &mut self.rows {
                    row.cells[existing] = None;
                }
                existing
            }
            None => {
                self.dates.push(column.date.clone());
                for row in &mut self.rows {
                    row.cells.push(None);
                }
                self.dates.len() - 1
            }
        };

        for (item, price) in &column.values {
            let idx = match self.rows.iter().position(|r| r.name == *item) {
                Some(idx) => idx,
                None => {
                    self.rows.push(HistoryRow {
                        name: item.clone(),
                        cells: vec![None; self.dates.len()],
                    });
                    self.rows.len() - 1
                }
            };
            self.rows[idx].cells[col] = price.map(|p| p.to_string());
        }
    }
}

/// Load, merge, and save in one step
pub fn merge_history(path: &Path, column: &HistoryColumn) -> Result<PriceHistory> {
    let mut history = PriceHistory::load(path)?;
    history.merge(column);
    history.save(path)?;
    info!(
        "📈 Merged {} prices for {} into {} ({} dates)",
        column.values.len(),
        column.date,
        path.display(),
        history.dates().len()
    );
    Ok(history)
}

/// An empty history cell, located the way a spreadsheet user would find it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyCell {
    pub item: String,
    pub column: String,
    /// 1-based line in the file, header included
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub empty_cells: Vec<EmptyCell>,
    pub dropped_columns: Vec<String>,
}

/// Report empty cells and drop date columns that are empty for every item, rewriting the file
pub fn audit_history(path: &Path) -> Result<AuditReport> {
    if !path.exists() {
        return Err(TrackerError::MissingInput(path.to_path_buf()));
    }
    let mut history = PriceHistory::load(path)?;
    let mut report = AuditReport::default();

    for (r, row) in history.rows.iter().enumerate() {
        for (c, cell) in row.cells.iter().enumerate() {
            if cell.is_none() {
                report.empty_cells.push(EmptyCell {
                    item: row.name.clone(),
                    column: history.dates[c].clone(),
                    line: r + 2,
                });
            }
        }
    }

    let keep: Vec<bool> = (0..history.dates.len())
        .map(|c| history.rows.iter().any(|row| row.cells[c].is_some()))
        .collect();

    if keep.iter().any(|k| !k) {
        report.dropped_columns = history
            .dates
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(d, _)| d.clone())
            .collect();

        history.dates = retain_by_mask(&history.dates, &keep);
        for row in &mut history.rows {
            row.cells = retain_by_mask(&row.cells, &keep);
        }
        info!("🧹 Dropping empty history columns: {}", report.dropped_columns.join(", "));
    }

    history.save(path)?;
    Ok(report)
}

fn retain_by_mask<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v.clone())
        .collect()
}
