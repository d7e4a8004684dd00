use rayon::prelude::*;
use tracing::{debug, info, instrument};

use super::statistics::{self, IqrBounds};
use crate::config::PipelineConfig;
use crate::metrics;
use crate::types::{ColumnData, ColumnStats, ItemColumn, Observation, ObservationTable};

/// Output of the IQR stage: the cleaned table plus stats for every numeric item
#[derive(Debug, Clone)]
pub struct IqrOutput {
    pub table: ObservationTable,
    pub stats: Vec<ColumnStats>,
}

/// Per-column interquartile-range outlier filter.
///
/// Outliers are replaced with missing entries so every column keeps its length.
pub struct IqrFilter {
    multiplier: f64,
    normality_z: f64,
}

impl IqrFilter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            multiplier: config.iqr_multiplier,
            normality_z: config.normality_z,
        }
    }

    /// Filter one numeric column
    pub fn filter_column(&self, item: &str, values: &[Observation]) -> (Vec<Observation>, ColumnStats) {
        let valid: Vec<f64> = values.iter().flatten().copied().collect();

        let (cleaned, bounds, noise_count) = match IqrBounds::compute(&valid, self.multiplier) {
            Some(bounds) => {
                let mut noise_count = 0;
                let cleaned: Vec<Observation> = values
                    .iter()
                    .map(|v| match v {
                        Some(x) if bounds.is_outlier(*x) => {
                            noise_count += 1;
                            None
                        }
                        other => *other,
                    })
                    .collect();
                (cleaned, Some(bounds), noise_count)
            }
            None => (values.to_vec(), None, 0),
        };

        let kept: Vec<f64> = cleaned.iter().flatten().copied().collect();
        let stats = ColumnStats {
            item: item.to_string(),
            lower_bound: bounds.map(|b| b.lower),
            upper_bound: bounds.map(|b| b.upper),
            mean_cleaned: statistics::mean(&kept),
            noise_count,
            normality_score: statistics::normality_score(&kept, self.normality_z),
        };

        debug!(
            item,
            noise_count,
            retained = kept.len(),
            "IQR filtered column"
        );

        (cleaned, stats)
    }

    /// Filter every numeric column of a table. Text columns pass through without stats.
    #[instrument(skip(self, table), fields(items = table.len()))]
    pub fn filter_table(&self, table: &ObservationTable) -> IqrOutput {
        let _timer = metrics::StageTimer::new("iqr");

        let results: Vec<(ItemColumn, Option<ColumnStats>)> = table
            .columns()
            .par_iter()
            .map(|column| match &column.data {
                ColumnData::Numeric(values) => {
                    let (cleaned, stats) = self.filter_column(&column.name, values);
                    (ItemColumn::numeric(column.name.clone(), cleaned), Some(stats))
                }
                ColumnData::Text(_) => {
                    debug!(item = %column.name, "Skipping non-numeric column");
                    (column.clone(), None)
                }
            })
            .collect();

        let mut columns = Vec::with_capacity(results.len());
        let mut stats = Vec::new();
        for (column, column_stats) in results {
            if let Some(s) = column_stats {
                metrics::record_iqr_outliers(&s.item, s.noise_count);
                stats.push(s);
            }
            columns.push(column);
        }

        let total_noise: usize = stats.iter().map(|s| s.noise_count).sum();
        info!(
            "IQR stage marked {} outliers across {} numeric items",
            total_noise,
            stats.len()
        );

        IqrOutput {
            table: ObservationTable::new(columns),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> IqrFilter {
        IqrFilter::new(&PipelineConfig::default())
    }

    #[test]
    fn test_outliers_become_missing() {
        let values = vec![
            Some(100.0),
            Some(102.0),
            None,
            Some(98.0),
            Some(101.0),
            Some(5000.0),
            Some(99.0),
        ];
        let (cleaned, stats) = filter().filter_column("i5-9400F", &values);

        assert_eq!(cleaned.len(), values.len());
        assert_eq!(cleaned[5], None);
        assert_eq!(cleaned[2], None);
        assert_eq!(cleaned[0], Some(100.0));
        assert_eq!(stats.noise_count, 1);
        assert_eq!(stats.mean_cleaned, Some(100.0));
        assert!(stats.lower_bound.unwrap() < 98.0);
        assert!(stats.upper_bound.unwrap() < 5000.0);
    }

    #[test]
    fn test_infinite_quartiles_keep_finite_prices() {
        let values = vec![
            Some(f64::NEG_INFINITY),
            Some(f64::NEG_INFINITY),
            Some(500.0),
            Some(510.0),
            Some(520.0),
        ];
        let (cleaned, stats) = filter().filter_column("i5-10400", &values);

        assert_eq!(cleaned, values);
        assert_eq!(stats.noise_count, 0);
    }

    #[test]
    fn test_all_missing_column() {
        let values = vec![None, None, None];
        let (cleaned, stats) = filter().filter_column("i3-10100", &values);

        assert_eq!(cleaned, values);
        assert_eq!(stats.lower_bound, None);
        assert_eq!(stats.upper_bound, None);
        assert_eq!(stats.noise_count, 0);
        assert_eq!(stats.mean_cleaned, None);
        assert_eq!(stats.normality_score, None);
    }

    #[test]
    fn test_single_value_is_kept() {
        let (cleaned, stats) = filter().filter_column("i9-9900K", &[Some(2999.0)]);
        assert_eq!(cleaned, vec![Some(2999.0)]);
        assert_eq!(stats.noise_count, 0);
        assert_eq!(stats.normality_score, Some(1.0));
    }

    #[test]
    fn test_text_columns_pass_through_without_stats() {
        let table = ObservationTable::new(vec![
            ItemColumn::numeric("i7-8700K", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ItemColumn::text("listing_url", vec![Some("a".into()), None, Some("c".into())]),
        ]);
        let output = filter().filter_table(&table);

        assert_eq!(output.stats.len(), 1);
        assert_eq!(output.stats[0].item, "i7-8700K");
        assert_eq!(output.table.columns()[1], table.columns()[1]);
        assert_eq!(output.table.items().collect::<Vec<_>>(), vec!["i7-8700K", "listing_url"]);
    }

    #[test]
    fn test_wider_multiplier_keeps_more() {
        let values: Vec<Observation> = [10.0, 11.0, 12.0, 13.0, 14.0, 25.0].iter().map(|v| Some(*v)).collect();
        let (_, narrow) = filter().filter_column("x", &values);

        let mut config = PipelineConfig::default();
        config.iqr_multiplier = 5.0;
        let (_, wide) = IqrFilter::new(&config).filter_column("x", &values);

        assert_eq!(narrow.noise_count, 1);
        assert_eq!(wide.noise_count, 0);
    }
}
