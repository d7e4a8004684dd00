use anyhow::Result;
use std::fs;
use tempfile::tempdir;

use cpu_price_tracker::constants::ITEM_PATTERN;
use cpu_price_tracker::pipeline::ingestion::reshape_raw;
use cpu_price_tracker::pipeline::processing::estimator::AdaptiveParameterEstimator;
use cpu_price_tracker::pipeline::storage::history::{audit_history, merge_history, HistoryColumn};
use cpu_price_tracker::pipeline::{ArtifactStore, ConsensusSelector, CsvArtifactStore, DbscanDenoiser, Pipeline, Stage};
use cpu_price_tracker::types::{DenoiseErrorKind, Observation};
use cpu_price_tracker::{ColumnData, ConsensusTier, DenoiseStats, ObservationTable, PathsConfig, PipelineConfig};

const DATE: &str = "2025-05-06";

fn paths_in(root: &std::path::Path) -> PathsConfig {
    PathsConfig {
        data_dir: root.join("data"),
        analysis_dir: root.join("ana"),
        result_dir: root.join("result"),
        history_file: root.join("cpu_sale.csv"),
        ..PathsConfig::default()
    }
}

fn prices(values: &[f64]) -> Vec<Observation> {
    values.iter().map(|v| Some(*v)).collect()
}

#[test]
fn test_raw_scrape_to_history() -> Result<()> {
    let dir = tempdir()?;
    let paths = paths_in(dir.path());
    fs::create_dir_all(&paths.data_dir)?;
    fs::write(
        paths.raw_input(DATE),
        "page,url,i7-8700K,i5-9400F,i3-9100F\n\
         1,https://shop/1,\"[500, 500, 500, 500]\",\"[650]\",[]\n\
         2,https://shop/2,\"[500, 500, 700, 700]\",\"[660, 670]\",\n",
    )?;

    let table = reshape_raw(&paths.raw_input(DATE), ITEM_PATTERN)?;
    assert_eq!(table.items().collect::<Vec<_>>(), vec!["i7-8700K", "i5-9400F", "i3-9100F"]);
    assert_eq!(table.n_rows(), 8);

    let store = CsvArtifactStore::new(paths.clone());
    store.save_observations(DATE, &table)?;

    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let result = pipeline.run_with_store(DATE, &store)?;

    for artifact in [
        paths.reshaped(DATE),
        paths.iqr_table(DATE),
        paths.iqr_stats(DATE),
        paths.dbscan_table(DATE),
        paths.dbscan_stats(DATE),
        paths.consensus(DATE),
    ] {
        assert!(artifact.exists(), "missing {}", artifact.display());
    }

    // Both 700 listings sit above the upper fence
    assert_eq!(result.iqr.stats[0].noise_count, 2);
    assert_eq!(
        fs::read_to_string(paths.consensus(DATE))?,
        "name,2025-05-06\ni7-8700K,500\ni5-9400F,650\ni3-9100F,\n"
    );

    let summary = result.summary();
    assert_eq!(summary[0].tier, ConsensusTier::Mode);
    assert_eq!(summary[1].denoise_error, Some(DenoiseErrorKind::InsufficientData));
    assert_eq!(summary[1].tier, ConsensusTier::MinimumFallback);
    assert_eq!(summary[2].tier, ConsensusTier::Unknown);

    let history = merge_history(&paths.history_file, &HistoryColumn::from(&result.consensus))?;
    assert_eq!(history.price("i7-8700K", DATE), Some("500"));

    let report = audit_history(&paths.history_file)?;
    assert_eq!(report.empty_cells.len(), 1);
    assert_eq!(report.empty_cells[0].item, "i3-9100F");
    assert!(report.dropped_columns.is_empty());
    Ok(())
}

#[test]
fn test_stage_by_stage_matches_full_run() -> Result<()> {
    let dir = tempdir()?;
    let store = CsvArtifactStore::new(paths_in(dir.path()));
    let table = ObservationTable::from_numeric(vec![
        ("i7-9700", prices(&[100.0, 110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 170.0])),
        ("i9-9900K", prices(&[2450.0; 7])),
    ]);
    store.save_observations(DATE, &table)?;

    let pipeline = Pipeline::new(PipelineConfig::default())?;
    for stage in [Stage::Iqr, Stage::Denoise, Stage::Consensus] {
        pipeline.run_stage(stage, DATE, &store)?;
    }
    let staged = store.load_consensus(DATE)?;
    let direct = pipeline.run(&table, DATE)?;

    assert_eq!(staged, HistoryColumn::from(&direct.consensus));
    Ok(())
}

#[test]
fn test_missing_stage_input_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let store = CsvArtifactStore::new(paths_in(dir.path()));
    let pipeline = Pipeline::new(PipelineConfig::default())?;

    let err = pipeline.run_stage(Stage::Consensus, DATE, &store).unwrap_err();
    assert!(err.to_string().contains("not found"));
    Ok(())
}

#[test]
fn test_mode_example() -> Result<()> {
    let table = ObservationTable::from_numeric(vec![(
        "i7-8700K",
        prices(&[500.0, 500.0, 500.0, 500.0, 500.0, 500.0, 700.0, 700.0]),
    )]);
    let result = Pipeline::new(PipelineConfig::default())?.run(&table, DATE)?;
    let consensus = result.consensus.get("i7-8700K").unwrap();
    assert_eq!(consensus.price, Some(500));
    assert_eq!(consensus.tier, ConsensusTier::Mode);
    Ok(())
}

#[test]
fn test_repeats_below_threshold_use_gated_mean() {
    let selector = ConsensusSelector::new(&PipelineConfig::default());
    let data = ColumnData::Numeric(prices(&[100.0, 100.0, 100.0, 150.0, 150.0, 150.0]));
    let stats = DenoiseStats {
        item: "i5-6500".to_string(),
        error: None,
        eps: Some(0.5),
        noise_ratio: 0.0,
        n_clusters: 1,
        cleaned_mean: Some(125.0),
        scaled_var: Some(0.5),
    };

    let result = selector.select("i5-6500", &data, Some(&stats));
    assert_eq!(result.tier, ConsensusTier::VarianceGatedMean);
    assert_eq!(result.price, Some(125));
}

#[test]
fn test_distinct_singletons_fall_back_to_minimum() -> Result<()> {
    let table = ObservationTable::from_numeric(vec![(
        "i7-9700",
        prices(&[170.0, 110.0, 150.0, 100.0, 130.0, 120.0, 160.0, 140.0]),
    )]);
    let result = Pipeline::new(PipelineConfig::default())?.run(&table, DATE)?;

    let stats = &result.denoise.stats[0];
    assert!(stats.is_ok());
    assert!(stats.scaled_var.unwrap() > 0.8);

    let consensus = result.consensus.get("i7-9700").unwrap();
    assert_eq!(consensus.tier, ConsensusTier::MinimumFallback);
    assert_eq!(consensus.price, Some(100));
    Ok(())
}

#[test]
fn test_four_samples_pass_through_unchanged() {
    let denoiser = DbscanDenoiser::new(&PipelineConfig::default());
    let column = cpu_price_tracker::ItemColumn::numeric("i3-8100", prices(&[420.0, 430.0, 415.0, 445.0]));

    let (out, stats) = denoiser.denoise_item(&column);
    assert_eq!(out, column);
    assert_eq!(stats.error, Some(DenoiseErrorKind::InsufficientData));
}

#[test]
fn test_knee_beyond_safety_ratio_uses_fallback_quantile() {
    let estimator = AdaptiveParameterEstimator::new(&PipelineConfig::default());
    let curve: Vec<f64> = (1..=20).map(f64::from).collect();

    // 30 > 1.2 * 20, so the 90th percentile of the curve is used instead
    let eps = estimator.resolve_eps(&curve, 30.0);
    assert!((eps - 18.1).abs() < 1e-9);
}
