/// Demo: run the whole price pipeline on a synthetic catalog held in memory
use cpu_price_tracker::{
    logging,
    pipeline::{render_summary, ArtifactStore, InMemoryArtifactStore, Pipeline},
    types::Observation,
    ObservationTable, PipelineConfig,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::env;

const DEMO_DATE: &str = "2025-05-06";

/// Two price levels with jitter, like new and second-hand listings
fn bimodal(rng: &mut StdRng, low: f64, high: f64, n: usize) -> Vec<Observation> {
    (0..n)
        .map(|_| {
            let base = if rng.gen_bool(0.6) { low } else { high };
            Some((base + rng.gen_range(-15.0..15.0)).round())
        })
        .collect()
}

/// One shop relisting the same price many times among scattered offers
fn repeated(rng: &mut StdRng, price: f64, repeats: usize, n: usize) -> Vec<Observation> {
    let mut values: Vec<Observation> = vec![Some(price); repeats];
    values.extend((0..n).map(|_| Some((price + rng.gen_range(-80.0..120.0)).round())));
    values
}

/// Mostly tight prices with a few bundle listings far above them
fn heavy_tail(rng: &mut StdRng, price: f64, n: usize) -> Vec<Observation> {
    (0..n)
        .map(|_| {
            let value = if rng.gen_bool(0.1) {
                price * rng.gen_range(2.0..5.0)
            } else {
                price + rng.gen_range(-25.0..25.0)
            };
            Some(value.round())
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    // Usage: demo-pipeline [seed]
    let seed = env::args().nth(1).and_then(|s| s.parse::<u64>().ok()).unwrap_or(42);
    let mut rng = StdRng::seed_from_u64(seed);

    println!("\n🚀 PRICE PIPELINE DEMO");
    println!("{}", "=".repeat(60));
    println!("Seed: {}", seed);

    let catalog = ObservationTable::from_numeric(vec![
        ("i7-8700K", bimodal(&mut rng, 1099.0, 1450.0, 60)),
        ("i5-9400F", repeated(&mut rng, 649.0, 8, 30)),
        ("i9-9900K", heavy_tail(&mut rng, 2450.0, 50)),
        ("i3-9100F", vec![Some(420.0), Some(435.0), None, Some(415.0)]),
        ("i5-7500", vec![None; 4]),
    ]);

    println!("\n📦 Synthetic catalog:");
    for column in catalog.columns() {
        println!("   {}: {} listings", column.name, column.data.valid_count());
    }

    let store = InMemoryArtifactStore::new();
    store.save_observations(DEMO_DATE, &catalog)?;

    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let result = pipeline.run_with_store(DEMO_DATE, &store)?;

    println!("\n📊 Consensus for {}:", DEMO_DATE);
    print!("{}", render_summary(&result.summary()));

    let unknown: Vec<&str> = result.consensus.unknown_items().collect();
    if !unknown.is_empty() {
        println!("\n⚠️  No consensus for: {}", unknown.join(", "));
    }
    println!("\n✅ Demo complete");
    Ok(())
}
