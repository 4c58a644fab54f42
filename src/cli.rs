//! Command-line interface definitions and argument parsing

use clap::Parser;
use std::path::PathBuf;

use crate::model::ClusterParams;

/// Fitness-tracker usage analysis: segments users into usage tiers with K-Means
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Daily activity export
    #[arg(long, env = "USAGEFORGE_ACTIVITY", default_value = "dailyActivity_merged.csv")]
    pub activity: PathBuf,

    /// Daily sleep export
    #[arg(long, env = "USAGEFORGE_SLEEP", default_value = "sleepDay_merged.csv")]
    pub sleep: PathBuf,

    /// Weight log export
    #[arg(long, env = "USAGEFORGE_WEIGHT", default_value = "weightLogInfo_merged.csv")]
    pub weight: PathBuf,

    /// Directory for charts and the summary table
    #[arg(short, long, default_value = "report")]
    pub output_dir: PathBuf,

    /// Prediction mode: activity days and sleep-or-weight days as a comma-separated pair
    /// Example: --predict "25,10"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Seed for K-Means initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Number of K-Means initializations
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            seed: self.seed,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
        }
    }

    /// Parse day counts from the predict string
    /// Expected format: "activity_days,sleep_or_weight_days"
    pub fn parse_predict_values(&self) -> anyhow::Result<Option<(f64, f64)>> {
        if let Some(ref predict_str) = self.predict {
            let parts: Vec<&str> = predict_str.split(',').collect();
            if parts.len() != 2 {
                anyhow::bail!(
                    "Predict values must be in format 'activity_days,sleep_or_weight_days'"
                );
            }

            let parse_days = |raw: &str, what: &str| -> anyhow::Result<f64> {
                let days: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", what, raw))?;
                if !days.is_finite() || days < 0.0 {
                    anyhow::bail!("{} must be a non-negative day count, got {}", what, raw);
                }
                Ok(days)
            };

            let activity_days = parse_days(parts[0], "activity days")?;
            let sleep_or_weight_days = parse_days(parts[1], "sleep-or-weight days")?;

            Ok(Some((activity_days, sleep_or_weight_days)))
        } else {
            Ok(None)
        }
    }
}
