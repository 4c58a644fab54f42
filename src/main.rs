//! UsageForge: fitness-tracker usage segmentation CLI
//!
//! Orchestrates data loading, joining, per-user summaries, K-Means
//! segmentation, reporting and prediction.

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use usageforge::{analyze, viz, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);

    tracing::info!("UsageForge v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(values) = args.parse_predict_values()? {
        run_prediction_mode(&args, values)
    } else {
        run_full_pipeline(&args)
    }
}

/// `RUST_LOG` wins; otherwise `--verbose` selects debug.
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

/// Assign a hypothetical user to a tier
fn run_prediction_mode(args: &Args, (activity_days, sleep_or_weight_days): (f64, f64)) -> Result<()> {
    println!("=== Prediction Mode ===");
    println!(
        "Input: activity days={}, sleep-or-weight days={}",
        activity_days, sleep_or_weight_days
    );

    let start_time = Instant::now();
    let analysis = analyze(&args.activity, &args.sleep, &args.weight, &args.cluster_params())?;
    let classification = &analysis.classification;
    let tier = classification.predict(activity_days, sleep_or_weight_days);

    println!("\n✓ Predicted tier: {}", tier);
    println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());

    let total_users = classification.users.len();
    let size = classification.tier_sizes()[tier.rank()];
    let centroid = classification.centroid(tier);
    println!("\n{} tier details:", tier);
    println!(
        "  Size: {} users ({:.1}% of total)",
        size,
        size as f64 / total_users as f64 * 100.0
    );
    println!(
        "  Centroid: activity days={:.2}, sleep-or-weight days={:.2}",
        centroid[0], centroid[1]
    );

    Ok(())
}

/// Run the full analysis and write the report
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Usage Segmentation Pipeline ===\n");

    let start_time = Instant::now();
    let analysis = analyze(&args.activity, &args.sleep, &args.weight, &args.cluster_params())?;

    println!(
        "✓ Data loaded: {} user-days, {} users",
        analysis.daily.len(),
        analysis.summaries.len()
    );
    println!("✓ Users segmented into usage tiers");

    let written = viz::generate_report(&analysis.classification, &args.output_dir)?;

    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    for path in written {
        println!("Saved: {}", path.display());
    }

    Ok(())
}
