use proptest::prelude::*;

use cpu_price_tracker::pipeline::{ConsensusSelector, DbscanDenoiser, IqrFilter};
use cpu_price_tracker::types::{ColumnData, Observation};
use cpu_price_tracker::{ItemColumn, ObservationTable, Pipeline, PipelineConfig};

/// Prices in whole currency units with some missing entries and repeats
fn observations() -> impl Strategy<Value = Vec<Observation>> {
    prop::collection::vec(
        prop_oneof![
            1 => Just(None),
            4 => (100u32..5000).prop_map(|p| Some(p as f64)),
            2 => Just(Some(999.0)),
        ],
        0..80,
    )
}

proptest! {
    #[test]
    fn iqr_keeps_column_length(values in observations()) {
        let filter = IqrFilter::new(&PipelineConfig::default());
        let (cleaned, stats) = filter.filter_column("i7-8700K", &values);

        prop_assert_eq!(cleaned.len(), values.len());
        let dropped = values.iter().flatten().count() - cleaned.iter().flatten().count();
        prop_assert_eq!(dropped, stats.noise_count);
    }

    #[test]
    fn denoise_ratio_and_eps_are_valid(values in observations()) {
        let denoiser = DbscanDenoiser::new(&PipelineConfig::default());
        let (column, stats) = denoiser.denoise_item(&ItemColumn::numeric("i7-8700K", values.clone()));
        prop_assert!(stats.noise_ratio >= 0.0 && stats.noise_ratio <= 1.0);
        prop_assert!(stats.error.is_some() || stats.eps.map_or(false, |eps| eps > 0.0));
        prop_assert_eq!(column.data.len(), values.len());
    }

    #[test]
    fn consensus_is_repeatable(values in observations()) {
        let config = PipelineConfig::default();
        let table = ObservationTable::from_numeric(vec![("i5-9400F", values)]);
        let pipeline = Pipeline::new(config.clone()).unwrap();
        let result = pipeline.run(&table, "2025-05-06").unwrap();

        let selector = ConsensusSelector::new(&config);
        let again = selector.select_table(&result.denoise.table, &result.denoise.stats, "2025-05-06");
        prop_assert_eq!(again, result.consensus.clone());

        let consensus = &result.consensus.results[0];
        let has_numbers = result
            .denoise
            .table
            .column("i5-9400F")
            .map(|c| matches!(&c.data, ColumnData::Numeric(v) if v.iter().any(Option::is_some)))
            .unwrap_or(false);
        prop_assert_eq!(consensus.price.is_some(), has_numbers);
    }
}
