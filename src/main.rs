use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use cpu_price_tracker::config::Config;
use cpu_price_tracker::constants::DATE_FORMAT;
use cpu_price_tracker::logging;
use cpu_price_tracker::metrics;
use cpu_price_tracker::pipeline::ingestion::reshape_raw;
use cpu_price_tracker::pipeline::storage::csv_store::read_consensus;
use cpu_price_tracker::pipeline::storage::history::{audit_history, merge_history, HistoryColumn};
use cpu_price_tracker::pipeline::{render_summary, ArtifactStore, CsvArtifactStore, Pipeline, Stage};

#[derive(Parser)]
#[command(name = "cpu_price_tracker")]
#[command(about = "Daily consensus prices for a scraped CPU catalog")]
#[command(version = "0.1.0")]
struct Cli {
    /// Run date (YYYY-MM-DD); defaults to today
    #[arg(long, global = true)]
    date: Option<String>,

    /// Config file; defaults to $TRACKER_CONFIG or ./config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reshape the raw scrape into one observation per row
    Reshape,
    /// Filter IQR outliers from the reshaped observations
    Iqr,
    /// Drop density outliers from the IQR-cleaned table
    Denoise,
    /// Pick one price per item from the denoised table
    Consensus,
    /// Run iqr, denoise and consensus in one go
    Run {
        /// Append the consensus to the price history
        #[arg(long)]
        merge_history: bool,
        /// Write the per-item summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
        /// Write a Prometheus text snapshot of the run's metrics
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
    /// Append a stored consensus file to the price history
    MergeHistory,
    /// Report empty history cells and drop empty date columns
    Audit,
}

fn run_date(date: Option<String>) -> Result<String> {
    match date {
        Some(d) => {
            chrono::NaiveDate::parse_from_str(&d, DATE_FORMAT)
                .with_context(|| format!("Invalid --date '{}', expected YYYY-MM-DD", d))?;
            Ok(d)
        }
        None => Ok(chrono::Local::now().format(DATE_FORMAT).to_string()),
    }
}

fn merge_into_history(history_file: &Path, column: &HistoryColumn) -> Result<()> {
    merge_history(history_file, column)
        .with_context(|| format!("Failed to merge into {}", history_file.display()))?;
    println!("📈 Merged {} into {}", column.date, history_file.display());
    Ok(())
}

fn run_stage(config: &Config, stage: Stage, date: &str) -> Result<()> {
    let pipeline = Pipeline::new(config.pipeline.clone())?;
    let store = CsvArtifactStore::new(config.paths.clone());

    println!("🔧 Running {} stage for {}...", stage.as_str(), date);
    pipeline
        .run_stage(stage, date, &store)
        .with_context(|| format!("{} stage for {} failed", stage.as_str(), date))?;
    println!("✅ {} stage completed", stage.as_str());
    Ok(())
}

fn run_all(
    config: &Config,
    date: &str,
    merge: bool,
    summary_json: Option<PathBuf>,
    metrics_out: Option<PathBuf>,
) -> Result<()> {
    let recorder = match &metrics_out {
        Some(_) => Some(metrics::install_snapshot_recorder()?),
        None => None,
    };

    let pipeline = Pipeline::new(config.pipeline.clone())?;
    let store = CsvArtifactStore::new(config.paths.clone());

    println!("🚀 Running price pipeline for {}...", date);
    let result = pipeline
        .run_with_store(date, &store)
        .with_context(|| format!("Pipeline run for {} failed", date))?;

    let summary = result.summary();
    println!("\n📊 Pipeline Results for {}:", date);
    print!("{}", render_summary(&summary));

    let unknown: Vec<&str> = result.consensus.unknown_items().collect();
    if !unknown.is_empty() {
        println!("\n⚠️  No consensus for: {}", unknown.join(", "));
    }

    if let Some(path) = summary_json {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("📝 Summary written to {}", path.display());
    }

    if merge {
        merge_into_history(&config.paths.history_file, &HistoryColumn::from(&result.consensus))?;
    }

    if let (Some(handle), Some(path)) = (recorder, metrics_out) {
        fs::write(&path, handle.render())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
        println!("📈 Metrics snapshot written to {}", path.display());
    }

    Ok(())
}

fn reshape(config: &Config, date: &str) -> Result<()> {
    let input = config.paths.raw_input(date);
    println!("📥 Reshaping {}...", input.display());
    let table = reshape_raw(&input, &config.paths.item_pattern)
        .with_context(|| format!("Failed to reshape {}", input.display()))?;
    let store = CsvArtifactStore::new(config.paths.clone());
    store.save_observations(date, &table)?;
    println!(
        "✅ Reshaped {} items into {}",
        table.len(),
        config.paths.reshaped(date).display()
    );
    Ok(())
}

fn audit(config: &Config) -> Result<()> {
    let history = &config.paths.history_file;
    println!("🔍 Auditing {}...", history.display());
    let report = audit_history(history)
        .with_context(|| format!("Failed to audit {}", history.display()))?;
    for cell in &report.empty_cells {
        println!("   - line {}: {} has no price for {}", cell.line, cell.item, cell.column);
    }
    if report.dropped_columns.is_empty() {
        println!("✅ {} empty cells, no empty columns", report.empty_cells.len());
    } else {
        println!(
            "🧹 {} empty cells, dropped columns: {}",
            report.empty_cells.len(),
            report.dropped_columns.join(", ")
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let date = run_date(cli.date)?;
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("Run date {}", date);

    let outcome = match cli.command {
        Commands::Reshape => reshape(&config, &date),
        Commands::Iqr => run_stage(&config, Stage::Iqr, &date),
        Commands::Denoise => run_stage(&config, Stage::Denoise, &date),
        Commands::Consensus => run_stage(&config, Stage::Consensus, &date),
        Commands::Run {
            merge_history,
            summary_json,
            metrics_out,
        } => run_all(&config, &date, merge_history, summary_json, metrics_out),
        Commands::MergeHistory => {
            let source = config.paths.consensus(&date);
            read_consensus(&source)
                .with_context(|| format!("Failed to read consensus {}", source.display()))
                .and_then(|column| merge_into_history(&config.paths.history_file, &column))
        }
        Commands::Audit => audit(&config),
    };

    if let Err(e) = &outcome {
        error!("Command failed: {:#}", e);
        println!("❌ {:#}", e);
    }
    outcome
}
