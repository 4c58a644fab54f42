//! UsageForge: fitness-tracker usage analysis with K-Means segmentation
//!
//! Loads the daily activity, sleep and weight exports, joins them per user and
//! day, summarizes each user's tracker usage and segments users into
//! Occasional, Frequent and Heavy tiers.
//!
//! Each stage is a function over the previous stage's output:
//! [`data`] → [`join`] → [`summary`] → [`model`], with [`viz`] rendering
//! the result.

pub mod cli;
pub mod data;
pub mod error;
pub mod join;
pub mod model;
pub mod summary;
pub mod viz;

use std::path::Path;
use tracing::info;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_activity, load_sleep, load_weight, ActivityRecord, SleepRecord, WeightRecord};
pub use error::{AnalysisError, Result};
pub use join::{join_daily, DailyRecord};
pub use model::{classify, Classification, ClassifiedUser, ClusterParams, UsageTier};
pub use summary::{summarize_users, Metric, UserUsageSummary};

/// Everything the pipeline produces, stage by stage
#[derive(Debug, Clone)]
pub struct Analysis {
    pub daily: Vec<DailyRecord>,
    pub summaries: Vec<UserUsageSummary>,
    pub classification: Classification,
}

/// Run loader, joiner, aggregator and classifier over the three exports
pub fn analyze(
    activity_path: &Path,
    sleep_path: &Path,
    weight_path: &Path,
    params: &ClusterParams,
) -> Result<Analysis> {
    let activity = load_activity(activity_path)?;
    let sleep = load_sleep(sleep_path)?;
    let weight = load_weight(weight_path)?;

    let daily = join_daily(&activity, &sleep, &weight)?;
    let summaries = summarize_users(&daily)?;
    info!(days = daily.len(), users = summaries.len(), "joined and summarized");

    let classification = classify(&summaries, params)?;

    Ok(Analysis {
        daily,
        summaries,
        classification,
    })
}
