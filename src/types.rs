use serde::{Deserialize, Serialize};
use std::fmt;

/// One price observation; `None` is a missing entry
pub type Observation = Option<f64>;

/// Values of one item column.
///
/// Columns whose cells all parse as numbers are `Numeric`. Anything else is
/// kept as `Text` and passed through the stages that only understand numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Observation>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the column; text cells that do not parse become missing
    pub fn coerce_numeric(&self) -> Vec<Observation> {
        match self {
            ColumnData::Numeric(values) => values.clone(),
            ColumnData::Text(values) => values
                .iter()
                .map(|cell| cell.as_deref().and_then(|s| s.trim().parse::<f64>().ok()))
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect(),
        }
    }

    /// Number of non-missing cells
    pub fn valid_count(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.iter().filter(|v| v.is_some()).count(),
            ColumnData::Text(values) => values.iter().filter(|v| v.is_some()).count(),
        }
    }

    /// Cell rendered for a CSV artifact; missing is an empty cell
    pub fn cell(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(values) => values
                .get(row)
                .copied()
                .flatten()
                .map(format_number)
                .unwrap_or_default(),
            ColumnData::Text(values) => values.get(row).cloned().flatten().unwrap_or_default(),
        }
    }
}

/// Integral floats print without a fractional part so prices read like the scrape
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// A named item and its observations from one collection run
#[derive(Debug, Clone, PartialEq)]
pub struct ItemColumn {
    pub name: String,
    pub data: ColumnData,
}

impl ItemColumn {
    pub fn numeric(name: impl Into<String>, values: Vec<Observation>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }
}

/// Item name → ordered observations. Item order is preserved through every stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    columns: Vec<ItemColumn>,
}

impl ObservationTable {
    pub fn new(columns: Vec<ItemColumn>) -> Self {
        Self { columns }
    }

    /// Build a table of numeric columns, e.g. from a scrape already parsed in memory
    pub fn from_numeric<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Observation>)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, values)| ItemColumn::numeric(name, values))
                .collect(),
        }
    }

    pub fn columns(&self) -> &[ItemColumn] {
        &self.columns
    }

    pub fn column(&self, item: &str) -> Option<&ItemColumn> {
        self.columns.iter().find(|c| c.name == item)
    }

    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Length of the longest column
    pub fn n_rows(&self) -> usize {
        self.columns.iter().map(|c| c.data.len()).max().unwrap_or(0)
    }
}

/// Per-item result of the IQR filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    #[serde(rename = "Column")]
    pub item: String,
    /// `None` when the column had no valid observation
    #[serde(rename = "Lower_Bound")]
    pub lower_bound: Option<f64>,
    #[serde(rename = "Upper_Bound")]
    pub upper_bound: Option<f64>,
    #[serde(rename = "Mean_Cleaned")]
    pub mean_cleaned: Option<f64>,
    #[serde(rename = "Noise_Count")]
    pub noise_count: usize,
    /// Share of standardized cleaned values with |z| below the configured bound
    #[serde(rename = "Normality_Score")]
    pub normality_score: Option<f64>,
}

/// Why the denoiser left an item unclustered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenoiseErrorKind {
    InsufficientData,
    InvalidEps,
    ProcessingError,
}

impl DenoiseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenoiseErrorKind::InsufficientData => "insufficient_data",
            DenoiseErrorKind::InvalidEps => "invalid_eps",
            DenoiseErrorKind::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for DenoiseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item result of the DBSCAN denoiser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseStats {
    #[serde(rename = "column")]
    pub item: String,
    pub error: Option<DenoiseErrorKind>,
    pub eps: Option<f64>,
    pub noise_ratio: f64,
    pub n_clusters: usize,
    pub cleaned_mean: Option<f64>,
    /// Variance of the retained points in standardized space
    pub scaled_var: Option<f64>,
}

impl DenoiseStats {
    /// Stats for an item that was passed through unclustered
    pub fn failed(item: impl Into<String>, kind: DenoiseErrorKind) -> Self {
        Self {
            item: item.into(),
            error: Some(kind),
            eps: None,
            noise_ratio: 0.0,
            n_clusters: 0,
            cleaned_mean: None,
            scaled_var: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Which rule produced an item's consensus price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusTier {
    Mode,
    VarianceGatedMean,
    MinimumFallback,
    /// No observation-derived signal anywhere; surfaced as `unknown_consensus`
    Unknown,
}

impl ConsensusTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusTier::Mode => "mode",
            ConsensusTier::VarianceGatedMean => "variance_gated_mean",
            ConsensusTier::MinimumFallback => "minimum_fallback",
            ConsensusTier::Unknown => "unknown_consensus",
        }
    }
}

impl fmt::Display for ConsensusTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One representative price per item. `price` is `None` only for `ConsensusTier::Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub item: String,
    pub price: Option<i64>,
    pub tier: ConsensusTier,
}

impl ConsensusResult {
    pub fn priced(item: impl Into<String>, price: i64, tier: ConsensusTier) -> Self {
        Self {
            item: item.into(),
            price: Some(price),
            tier,
        }
    }

    pub fn unknown(item: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            price: None,
            tier: ConsensusTier::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.tier == ConsensusTier::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numeric_drops_unparseable_text() {
        let column = ColumnData::Text(vec![
            Some("1299".to_string()),
            Some("sold out".to_string()),
            None,
            Some(" 899.5 ".to_string()),
        ]);
        assert_eq!(column.coerce_numeric(), vec![Some(1299.0), None, None, Some(899.5)]);
        assert_eq!(column.valid_count(), 3);
    }

    #[test]
    fn test_table_shape() {
        let table = ObservationTable::from_numeric(vec![
            ("i5-12400F", vec![Some(799.0), None]),
            ("i7-8700K", vec![Some(1099.0), Some(1150.0), Some(1200.0)]),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.items().collect::<Vec<_>>(), vec!["i5-12400F", "i7-8700K"]);
        assert!(table.column("i9-9900K").is_none());
    }

    #[test]
    fn test_cell_rendering() {
        let column = ColumnData::Numeric(vec![Some(1299.0), None, Some(12.5)]);
        assert_eq!(column.cell(0), "1299");
        assert_eq!(column.cell(1), "");
        assert_eq!(column.cell(2), "12.5");
        assert_eq!(column.cell(7), "");
    }

    #[test]
    fn test_tier_labels() {
        assert_eq!(ConsensusTier::Unknown.to_string(), "unknown_consensus");
        assert_eq!(DenoiseErrorKind::InvalidEps.to_string(), "invalid_eps");
        assert!(ConsensusResult::unknown("i3-10100").is_unknown());
    }
}
