//! Report rendering: SVG charts with Plotters, the tier table and a CSV export

use plotters::prelude::*;
use polars::prelude::{Column, CsvWriter, DataFrame, NamedFrom, SerWriter, Series};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::model::{Classification, UsageTier, USAGE_TIERS};
use crate::summary::Metric;

/// Color of each tier, by rank
const TIER_COLORS: [RGBColor; USAGE_TIERS] = [RED, BLUE, GREEN];

pub const CLUSTER_PLOT: &str = "usage_clusters.svg";
pub const ACTIVITY_HISTOGRAM: &str = "activity_days_histogram.svg";
pub const SLEEP_OR_WEIGHT_HISTOGRAM: &str = "sleep_or_weight_days_histogram.svg";
pub const TIER_SIZE_CHART: &str = "tier_sizes.svg";
pub const STEPS_SLEEP_PLOT: &str = "steps_vs_sleep.svg";
pub const SUMMARY_CSV: &str = "user_usage_summary.csv";

fn tier_color(tier: UsageTier) -> &'static RGBColor {
    &TIER_COLORS[tier.rank()]
}

/// Upper bound of the day axes: the longest observed period
fn max_days(classification: &Classification) -> usize {
    classification
        .users
        .iter()
        .map(|u| u.summary.total_days)
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Scatter of activity days vs sleep-or-weight days, colored by tier
///
/// # Arguments
/// * `classification` - Users with their tiers and the fitted centroids
/// * `output_path` - Path of the SVG to write
pub fn create_cluster_visualization(
    classification: &Classification,
    output_path: &Path,
) -> anyhow::Result<()> {
    let axis_max = max_days(classification) as f64 + 1.0;

    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Tracker usage: activity vs sleep/weight days", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(-1.0..axis_max, -1.0..axis_max)?;

    chart
        .configure_mesh()
        .x_desc("Days with activity tracked (steps > 0)")
        .y_desc("Days with sleep or weight tracked")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for tier in UsageTier::ALL {
        let color = tier_color(tier);
        let points: Vec<(f64, f64)> = classification
            .users_in(tier)
            .map(|u| {
                (
                    u.summary.activity_days_used as f64,
                    u.summary.sleep_or_weight_days_used as f64,
                )
            })
            .collect();

        chart
            .draw_series(points.into_iter().map(|p| Circle::new(p, 4, color.filled())))?
            .label(tier.to_string())
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.filled()));

        let centroid = classification.centroid(tier);
        let (cx, cy) = (centroid[0], centroid[1]);
        chart.draw_series(std::iter::once(Rectangle::new(
            [(cx - 0.4, cy - 0.4), (cx + 0.4, cy + 0.4)],
            color.mix(0.5).filled(),
        )))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    debug!(path = %output_path.display(), "wrote cluster plot");
    Ok(())
}

/// Histogram of a per-user day count, one bar per count value
pub fn create_day_count_histogram(
    values: &[usize],
    max_value: usize,
    title: &str,
    x_desc: &str,
    output_path: &Path,
) -> anyhow::Result<()> {
    let mut counts = vec![0usize; max_value + 1];
    for &v in values {
        if v <= max_value {
            counts[v] += 1;
        }
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1) as f64;

    let root = SVGBackend::new(output_path, (800, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(max_value as f64 + 0.5), 0f64..(max_count * 1.1))?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Number of users")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().filter(|(_, c)| **c > 0).map(|(v, &c)| {
        Rectangle::new(
            [(v as f64 - 0.4, 0.0), (v as f64 + 0.4, c as f64)],
            BLUE.mix(0.7).filled(),
        )
    }))?;

    root.present()?;
    debug!(path = %output_path.display(), "wrote histogram");
    Ok(())
}

/// Bar chart of users per tier
pub fn create_tier_size_chart(
    classification: &Classification,
    output_path: &Path,
) -> anyhow::Result<()> {
    let tier_sizes = classification.tier_sizes();
    let max_size = *tier_sizes.iter().max().unwrap_or(&1) as f64;

    let root = SVGBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Users per usage tier", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(USAGE_TIERS as f64 - 0.5), 0f64..(max_size.max(1.0) * 1.2))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_desc("Number of users")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for tier in UsageTier::ALL {
        let x = tier.rank() as f64;
        let size = tier_sizes[tier.rank()] as f64;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x - 0.4, 0.0), (x + 0.4, size)],
            tier_color(tier).filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            format!("{} ({})", tier, tier_sizes[tier.rank()]),
            (x - 0.3, size + max_size * 0.1),
            ("sans-serif", 15).into_font(),
        )))?;
    }

    root.present()?;
    debug!(path = %output_path.display(), "wrote tier size chart");
    Ok(())
}

/// Scatter of mean daily steps vs mean sleep hours for users with both
pub fn create_steps_sleep_scatter(
    classification: &Classification,
    output_path: &Path,
) -> anyhow::Result<()> {
    let mut points: Vec<(f64, f64, UsageTier)> = Vec::new();
    for user in &classification.users {
        let pair = user
            .summary
            .require(Metric::DailyStepsMean)
            .and_then(|steps| Ok((steps, user.summary.require(Metric::SleepHoursMean)?)));
        match pair {
            Ok((steps, sleep)) => points.push((steps, sleep, user.tier)),
            Err(e) => debug!(error = %e, "left out of steps vs sleep plot"),
        }
    }

    let max_steps = points.iter().map(|p| p.0).fold(1000.0, f64::max) * 1.1;
    let max_sleep = points.iter().map(|p| p.1).fold(1.0, f64::max) * 1.1;

    let root = SVGBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Mean daily steps vs mean sleep hours", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..max_steps, 0f64..max_sleep)?;

    chart
        .configure_mesh()
        .x_desc("Mean daily steps")
        .y_desc("Mean sleep hours")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&(steps, sleep, tier)| Circle::new((steps, sleep), 4, tier_color(tier).filled())),
    )?;

    root.present()?;
    debug!(path = %output_path.display(), users = points.len(), "wrote steps vs sleep plot");
    Ok(())
}

/// Write one row per user with every statistic and the tier.
/// "No data" statistics are written as empty cells.
pub fn export_summaries(classification: &Classification, output_path: &Path) -> anyhow::Result<()> {
    let users = &classification.users;
    let count = |f: fn(&crate::summary::UserUsageSummary) -> usize| -> anyhow::Result<Vec<u64>> {
        users
            .iter()
            .map(|u| u64::try_from(f(&u.summary)).map_err(anyhow::Error::from))
            .collect()
    };

    let mut columns: Vec<Series> = vec![
        Series::new(
            "Id".into(),
            users.iter().map(|u| u.summary.user_id).collect::<Vec<i64>>(),
        ),
        Series::new(
            "UsageTier".into(),
            users.iter().map(|u| u.tier.as_str()).collect::<Vec<&str>>(),
        ),
        Series::new("TotalDays".into(), count(|s| s.total_days)?),
        Series::new("ActivityDaysUsed".into(), count(|s| s.activity_days_used)?),
        Series::new("SleepDaysUsed".into(), count(|s| s.sleep_days_used)?),
        Series::new("WeightDaysUsed".into(), count(|s| s.weight_days_used)?),
        Series::new(
            "SleepOrWeightDaysUsed".into(),
            count(|s| s.sleep_or_weight_days_used)?,
        ),
    ];
    for metric in Metric::ALL {
        let values: Vec<Option<f64>> = users.iter().map(|u| u.summary.metric(metric)).collect();
        columns.push(Series::new(metric.column_name().into(), values));
    }

    let mut df = DataFrame::new(columns.into_iter().map(Column::from).collect())?;
    let mut file = File::create(output_path)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;

    debug!(path = %output_path.display(), rows = df.height(), "exported summaries");
    Ok(())
}

fn fmt_stat(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "n/a".to_string(),
    }
}

/// Mean of a statistic over the users of a tier that have it
fn tier_mean(classification: &Classification, tier: UsageTier, metric: Metric) -> Option<f64> {
    crate::summary::mean(classification.users_in(tier).map(|u| u.summary.metric(metric)))
}

/// Print tier statistics to console
pub fn print_tier_statistics(classification: &Classification) {
    let total_users = classification.users.len();

    println!("\n=== Usage Tier Statistics ===");
    println!("Total users: {}", total_users);
    println!("Within-cluster sum of squares (Inertia): {:.2}", classification.inertia);
    match classification.silhouette_score() {
        Ok(score) => println!("Silhouette score: {:.3}", score),
        Err(e) => {
            debug!(error = %e, "silhouette score unavailable");
            println!("Silhouette score: n/a");
        }
    }

    println!();
    println!(
        "  {:<10} | {:>5} | {:>6} | {:>13} | {:>13} | {:>10} | {:>11} | {:>7}",
        "Tier", "Users", "Share", "Activity days", "Sleep/wt days", "Steps/day", "Sleep hours", "BMI"
    );
    println!(
        "  {:-<10}-+-{:->5}-+-{:->6}-+-{:->13}-+-{:->13}-+-{:->10}-+-{:->11}-+-{:->7}",
        "", "", "", "", "", "", "", ""
    );
    for profile in classification.tier_profiles() {
        let share = if total_users > 0 {
            profile.size as f64 / total_users as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "  {:<10} | {:>5} | {:>5.1}% | {:>13} | {:>13} | {:>10} | {:>11} | {:>7}",
            profile.tier.to_string(),
            profile.size,
            share,
            fmt_stat(profile.mean_activity_days, 1),
            fmt_stat(profile.mean_sleep_or_weight_days, 1),
            fmt_stat(tier_mean(classification, profile.tier, Metric::DailyStepsMean), 0),
            fmt_stat(tier_mean(classification, profile.tier, Metric::SleepHoursMean), 2),
            fmt_stat(tier_mean(classification, profile.tier, Metric::BmiMean), 1),
        );
    }

    println!("\nTier centroids (activity days, sleep/weight days):");
    for profile in classification.tier_profiles() {
        println!(
            "  {:<10} | {:6.2} | {:6.2}",
            profile.tier.to_string(),
            profile.centroid.0,
            profile.centroid.1
        );
    }
}

/// Generate every chart and table into `output_dir`
///
/// # Returns
/// * Paths of the written files
pub fn generate_report(
    classification: &Classification,
    output_dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let path = |name: &str| output_dir.join(name);
    let max_value = max_days(classification);

    create_cluster_visualization(classification, &path(CLUSTER_PLOT))?;

    let activity_days: Vec<usize> = classification
        .users
        .iter()
        .map(|u| u.summary.activity_days_used)
        .collect();
    create_day_count_histogram(
        &activity_days,
        max_value,
        "Days with activity tracked per user",
        "Days with steps > 0",
        &path(ACTIVITY_HISTOGRAM),
    )?;

    let sleep_or_weight_days: Vec<usize> = classification
        .users
        .iter()
        .map(|u| u.summary.sleep_or_weight_days_used)
        .collect();
    create_day_count_histogram(
        &sleep_or_weight_days,
        max_value,
        "Days with sleep or weight tracked per user",
        "Days with a sleep or weight entry",
        &path(SLEEP_OR_WEIGHT_HISTOGRAM),
    )?;

    create_tier_size_chart(classification, &path(TIER_SIZE_CHART))?;
    create_steps_sleep_scatter(classification, &path(STEPS_SLEEP_PLOT))?;
    export_summaries(classification, &path(SUMMARY_CSV))?;

    print_tier_statistics(classification);

    let written: Vec<PathBuf> = [
        CLUSTER_PLOT,
        ACTIVITY_HISTOGRAM,
        SLEEP_OR_WEIGHT_HISTOGRAM,
        TIER_SIZE_CHART,
        STEPS_SLEEP_PLOT,
        SUMMARY_CSV,
    ]
    .into_iter()
    .map(|name| path(name))
    .collect();
    info!(dir = %output_dir.display(), files = written.len(), "report written");
    Ok(written)
}
