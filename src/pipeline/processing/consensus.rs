use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use super::statistics::round_price;
use crate::config::PipelineConfig;
use crate::metrics;
use crate::types::{ColumnData, ConsensusResult, ConsensusTier, DenoiseStats, ObservationTable};

/// Consensus prices of one collection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusReport {
    /// Run date, supplied by the collector
    pub run_date: String,
    pub results: Vec<ConsensusResult>,
}

impl ConsensusReport {
    pub fn get(&self, item: &str) -> Option<&ConsensusResult> {
        self.results.iter().find(|r| r.item == item)
    }

    pub fn unknown_items(&self) -> impl Iterator<Item = &str> {
        self.results.iter().filter(|r| r.is_unknown()).map(|r| r.item.as_str())
    }
}

/// Picks one whole-currency price per item, trying in order:
///
/// 1. the most frequent exact price seen at least `mode_min_count` times
///    (ties go to the cheaper price),
/// 2. the cleaned mean, when the retained points have `scaled_var` below
///    `variance_gate`,
/// 3. the lowest numeric observation.
///
/// With no numeric observation at all the item is `ConsensusTier::Unknown`.
pub struct ConsensusSelector {
    mode_min_count: usize,
    variance_gate: f64,
}

impl ConsensusSelector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            mode_min_count: config.mode_min_count,
            variance_gate: config.variance_gate,
        }
    }

    pub fn select(&self, item: &str, data: &ColumnData, stats: Option<&DenoiseStats>) -> ConsensusResult {
        let values: Vec<f64> = data
            .coerce_numeric()
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();

        if let Some(price) = self.mode_price(&values) {
            return ConsensusResult::priced(item, price, ConsensusTier::Mode);
        }

        if let Some(price) = stats.and_then(|s| self.gated_mean(s)) {
            return ConsensusResult::priced(item, price, ConsensusTier::VarianceGatedMean);
        }

        match values.iter().copied().reduce(f64::min).and_then(round_price) {
            Some(price) => ConsensusResult::priced(item, price, ConsensusTier::MinimumFallback),
            None => {
                warn!(item, "No numeric observation left, consensus unknown");
                ConsensusResult::unknown(item)
            }
        }
    }

    /// Smallest of the most frequent values, if that frequency reaches the threshold
    fn mode_price(&self, values: &[f64]) -> Option<i64> {
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut best: Option<(f64, usize)> = None;
        let mut i = 0;
        while i < sorted.len() {
            let value = sorted[i];
            let run = sorted[i..].iter().take_while(|v| **v == value).count();
            // Ascending scan with a strict comparison keeps the cheapest of a tie
            if run >= self.mode_min_count && best.map_or(true, |(_, count)| run > count) {
                best = Some((value, run));
            }
            i += run;
        }

        best.and_then(|(value, _)| round_price(value))
    }

    fn gated_mean(&self, stats: &DenoiseStats) -> Option<i64> {
        let scaled_var = stats.scaled_var?;
        if scaled_var < self.variance_gate {
            stats.cleaned_mean.and_then(round_price)
        } else {
            None
        }
    }

    /// Consensus for every item of a denoised table
    #[instrument(skip(self, table, stats), fields(items = table.len()))]
    pub fn select_table(&self, table: &ObservationTable, stats: &[DenoiseStats], run_date: &str) -> ConsensusReport {
        let _timer = metrics::StageTimer::new("consensus");
        let by_item: HashMap<&str, &DenoiseStats> = stats.iter().map(|s| (s.item.as_str(), s)).collect();

        let results: Vec<ConsensusResult> = table
            .columns()
            .par_iter()
            .map(|column| self.select(&column.name, &column.data, by_item.get(column.name.as_str()).copied()))
            .collect();

        let mut tier_counts: HashMap<ConsensusTier, usize> = HashMap::new();
        for result in &results {
            metrics::record_consensus_tier(result.tier);
            *tier_counts.entry(result.tier).or_default() += 1;
        }
        info!(
            "Consensus for {}: {} mode, {} mean, {} minimum, {} unknown",
            run_date,
            tier_counts.get(&ConsensusTier::Mode).unwrap_or(&0),
            tier_counts.get(&ConsensusTier::VarianceGatedMean).unwrap_or(&0),
            tier_counts.get(&ConsensusTier::MinimumFallback).unwrap_or(&0),
            tier_counts.get(&ConsensusTier::Unknown).unwrap_or(&0),
        );

        ConsensusReport {
            run_date: run_date.to_string(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Observation;

    fn selector() -> ConsensusSelector {
        ConsensusSelector::new(&PipelineConfig::default())
    }

    fn numeric(values: &[f64]) -> ColumnData {
        ColumnData::Numeric(values.iter().map(|v| Some(*v)).collect())
    }

    fn stats(scaled_var: Option<f64>, cleaned_mean: Option<f64>) -> DenoiseStats {
        DenoiseStats {
            item: "i7-8700K".to_string(),
            error: None,
            eps: Some(0.2),
            noise_ratio: 0.0,
            n_clusters: 1,
            cleaned_mean,
            scaled_var,
        }
    }

    #[test]
    fn test_mode_tier() {
        let data = numeric(&[500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 700.0, 700.0]);
        let result = selector().select("i7-8700K", &data, Some(&stats(Some(2.0), Some(550.0))));
        assert_eq!(result, ConsensusResult::priced("i7-8700K", 500, ConsensusTier::Mode));
    }

    #[test]
    fn test_mode_tie_prefers_cheaper_price() {
        let mut values = vec![900.0; 5];
        values.extend([850.0; 5]);
        values.push(1000.0);
        let result = selector().select("i9-9900K", &numeric(&values), None);
        assert_eq!(result.price, Some(850));
        assert_eq!(result.tier, ConsensusTier::Mode);
    }

    #[test]
    fn test_mode_highest_count_wins_over_cheaper() {
        let mut values = vec![850.0; 5];
        values.extend([900.0; 7]);
        let result = selector().select("i9-9900K", &numeric(&values), None);
        assert_eq!(result.price, Some(900));
    }

    #[test]
    fn test_counts_below_threshold_fall_to_gated_mean() {
        let data = numeric(&[100.0, 100.0, 100.0, 150.0, 150.0, 150.0]);
        let result = selector().select("i5-6500", &data, Some(&stats(Some(0.5), Some(125.0))));
        assert_eq!(result.tier, ConsensusTier::VarianceGatedMean);
        assert_eq!(result.price, Some(125));
    }

    #[test]
    fn test_gated_mean_rounds() {
        let data = numeric(&[1.0, 2.0]);
        let result = selector().select("x", &data, Some(&stats(Some(0.1), Some(1234.6))));
        assert_eq!(result.price, Some(1235));
    }

    #[test]
    fn test_minimum_fallback() {
        let data = numeric(&[1210.4, 1180.6, 1500.0, 990.5, 1320.0]);
        let result = selector().select("i7-9700", &data, Some(&stats(Some(0.95), Some(1240.0))));
        assert_eq!(result.tier, ConsensusTier::MinimumFallback);
        assert_eq!(result.price, Some(990));
    }

    #[test]
    fn test_missing_scaled_var_skips_mean_tier() {
        let data = numeric(&[300.0, 310.0, 320.0]);
        let failed = DenoiseStats::failed("i3-9100F", crate::types::DenoiseErrorKind::InsufficientData);
        let result = selector().select("i3-9100F", &data, Some(&failed));
        assert_eq!(result.tier, ConsensusTier::MinimumFallback);
        assert_eq!(result.price, Some(300));
    }

    #[test]
    fn test_fallback_coerces_text() {
        let data = ColumnData::Text(vec![Some("n/a".to_string()), Some("899".to_string()), Some("1020.7".to_string())]);
        let result = selector().select("i5-10400", &data, None);
        assert_eq!(result.price, Some(899));
    }

    #[test]
    fn test_infinite_cells_are_ignored() {
        let data = numeric(&[f64::NEG_INFINITY, 510.0, 500.0, f64::INFINITY]);
        let result = selector().select("i5-10400", &data, None);
        assert_eq!(result, ConsensusResult::priced("i5-10400", 500, ConsensusTier::MinimumFallback));
    }

    #[test]
    fn test_unknown_is_not_zero() {
        let data = ColumnData::Numeric(vec![None, None, None]);
        let result = selector().select("i3-7100", &data, None);
        assert!(result.is_unknown());
        assert_eq!(result.price, None);
    }

    #[test]
    fn test_select_table_keeps_order_and_is_repeatable() {
        let table = ObservationTable::from_numeric(vec![
            ("b", vec![Some(10.0), Some(12.0)]),
            ("a", vec![None::<f64>, None]),
            ("c", vec![Some(5.0); 6]),
        ]);
        let first = selector().select_table(&table, &[], "2025-05-06");
        let second = selector().select_table(&table, &[], "2025-05-06");

        assert_eq!(first, second);
        assert_eq!(first.results.iter().map(|r| r.item.as_str()).collect::<Vec<_>>(), vec!["b", "a", "c"]);
        assert_eq!(first.get("c").unwrap().price, Some(5));
        assert_eq!(first.unknown_items().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_rounding_never_truncates() {
        let values: Vec<Observation> = vec![Some(99.7); 5];
        let result = selector().select("x", &ColumnData::Numeric(values), None);
        assert_eq!(result.price, Some(100));
    }
}
