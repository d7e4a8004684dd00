/// Artifact naming shared by the CLI stages and the in-memory pipeline.
/// Every artifact is keyed by the run date, formatted with [`DATE_FORMAT`].

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Default directory layout
pub const DATA_DIR: &str = "data";
pub const ANALYSIS_DIR: &str = "ana";
pub const RESULT_DIR: &str = "result";
pub const HISTORY_FILE: &str = "cpu_sale.csv";

/// Item columns in the raw scrape look like `i7-8700K`
pub const ITEM_PATTERN: &str = r"^i[3579]-\d+[A-Z]*$";

// Artifact suffixes
pub const RAW_INPUT_SUFFIX: &str = "_input.csv";
pub const RESHAPED_SUFFIX: &str = "_output.csv";
pub const IQR_SUFFIX: &str = "_iqr.csv";
pub const IQR_STATS_SUFFIX: &str = "_iqr_stats.csv";
pub const DBSCAN_SUFFIX: &str = "_dbscan.csv";
pub const DBSCAN_STATS_SUFFIX: &str = "_dbscan_stats.csv";
pub const CONSENSUS_SUFFIX: &str = "_od.csv";

/// Name of the item column in consensus and history files
pub const NAME_COLUMN: &str = "name";

/// Cell spellings read as a missing observation
pub const MISSING_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "None"];

/// Precision of reported stats: decimal places, or significant figures for eps
pub const STATS_PRECISION: i32 = 4;

/// Build an artifact file name such as `2025-05-06_iqr.csv`
pub fn artifact_name(date: &str, suffix: &str) -> String {
    format!("{date}{suffix}")
}

pub fn is_missing_marker(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim())
}
