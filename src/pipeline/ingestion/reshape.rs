//! Turns the raw scrape into an observation table.
//!
//! The scraper writes one row per listing page, and each item cell holds the
//! prices seen on that page as a list literal:
//!
//! ```text
//! page,url,i7-8700K,i5-9400F
//! 1,https://...,"[1099, 1150.0]","[650]"
//! ```
//!
//! Lists of a row are padded to the row's longest list, then every row is
//! exploded into one observation per line.

use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

use crate::constants::{self, ITEM_PATTERN};
use crate::error::{Result, TrackerError};
use crate::types::{ItemColumn, Observation, ObservationTable};

static DEFAULT_ITEM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(ITEM_PATTERN).expect("item pattern is a valid regex"));

/// Reshape a raw scrape file, keeping the columns whose cleaned header matches `pattern`
pub fn reshape_raw(path: &Path, pattern: &str) -> Result<ObservationTable> {
    if !path.exists() {
        return Err(TrackerError::MissingInput(path.to_path_buf()));
    }

    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    if headers.is_empty() {
        return Err(TrackerError::EmptyTable(path.to_path_buf()));
    }

    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(String::from).collect::<Vec<_>>()))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let table = reshape_records(&headers, &rows, pattern)?;
    info!(
        "📥 Reshaped {} raw rows from {} into {} items x {} observations",
        rows.len(),
        path.display(),
        table.len(),
        table.n_rows()
    );
    Ok(table)
}

/// Reshape rows already split into cells
pub fn reshape_records(headers: &[String], rows: &[Vec<String>], pattern: &str) -> Result<ObservationTable> {
    let compiled;
    let item_pattern: &Regex = if pattern == ITEM_PATTERN {
        &DEFAULT_ITEM_PATTERN
    } else {
        compiled = Regex::new(pattern)?;
        &compiled
    };

    let items: Vec<(usize, String)> = headers
        .iter()
        .map(|h| clean_header(h))
        .enumerate()
        .filter(|(_, name)| item_pattern.is_match(name))
        .collect();

    if items.is_empty() {
        return Err(TrackerError::NoItemColumns(pattern.to_string()));
    }
    debug!(
        items = ?items.iter().map(|(_, n)| n.as_str()).collect::<Vec<_>>(),
        "Matched item columns"
    );

    let mut columns: Vec<Vec<Observation>> = vec![Vec::new(); items.len()];
    for (row_idx, row) in rows.iter().enumerate() {
        let mut lists = Vec::with_capacity(items.len());
        for (col, name) in &items {
            let cell = row.get(*col).map(String::as_str).unwrap_or("");
            let list = parse_list_literal(cell).map_err(|message| TrackerError::InvalidCell {
                item: name.clone(),
                row: row_idx + 1,
                message,
            })?;
            lists.push(list);
        }

        let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
        for (column, mut list) in columns.iter_mut().zip(lists) {
            list.resize(longest, None);
            column.extend(list);
        }
    }

    Ok(ObservationTable::new(
        items
            .into_iter()
            .zip(columns)
            .map(|((_, name), values)| ItemColumn::numeric(name, values))
            .collect(),
    ))
}

/// Trim and drop non-ASCII characters, e.g. `" i7-8700K（盒装）"` → `"i7-8700K"`
pub fn clean_header(header: &str) -> String {
    header.trim().chars().filter(char::is_ascii).collect()
}

/// Parse a cell such as `[1299, '1350.0', None]`. An empty cell is an empty list.
pub fn parse_list_literal(cell: &str) -> std::result::Result<Vec<Observation>, String> {
    let cell = cell.trim();
    if constants::is_missing_marker(cell) {
        return Ok(Vec::new());
    }

    let inner = cell
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("expected a list literal, got '{cell}'"))?
        .trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let tokens: Vec<&str> = inner.split(',').map(str::trim).collect();
    // A single trailing comma is allowed: `[1299,]`
    let tokens = match tokens.split_last() {
        Some((last, rest)) if last.is_empty() && !rest.is_empty() => rest,
        _ => &tokens[..],
    };

    tokens
        .iter()
        .map(|token| {
            let value = strip_quotes(token);
            if token.is_empty() {
                Err("empty list element".to_string())
            } else if constants::is_missing_marker(value) {
                Ok(None)
            } else {
                value
                    .parse::<f64>()
                    .map(|v| Some(v).filter(|x| !x.is_nan()))
                    .map_err(|_| format!("'{value}' is not a number"))
            }
        })
        .collect()
}

fn strip_quotes(token: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = token.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner.trim();
        }
    }
    token
}
