//! Per-user usage summaries over the joined daily table
//!
//! Statistics only look at days where the measurement is present. A missing
//! value never counts as zero, and a statistic with no eligible days is `None`.
//! The per-user reduction runs as a Polars group-by, whose `mean` skips nulls
//! and whose `std(1)` is null below two values.

use polars::prelude::*;
use std::fmt;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::join::{
    daily_frame, DailyRecord, BMI, CALORIES, DAY, FAIRLY_ACTIVE_MINUTES, ID,
    LIGHTLY_ACTIVE_MINUTES, MINUTES_ASLEEP, MINUTES_IN_BED, SEDENTARY_MINUTES, TOTAL_STEPS,
    VERY_ACTIVE_MINUTES, WEIGHT_KG,
};

/// Minimum number of observations for a sample standard deviation
pub const MIN_STD_DEV_SAMPLES: usize = 2;

/// Mean over present values. `None` when nothing is present.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sample standard deviation (n - 1) over present values.
/// `None` with fewer than [`MIN_STD_DEV_SAMPLES`] values.
pub fn std_dev<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.len() < MIN_STD_DEV_SAMPLES {
        return None;
    }
    let n = present.len() as f64;
    let avg = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Named per-user statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    SleepHoursMean,
    SleepHoursStdDev,
    TimeInBedHoursMean,
    BmiMean,
    WeightKgMean,
    DailyStepsMean,
    VeryActiveMinutesMean,
    FairlyActiveMinutesMean,
    LightlyActiveMinutesMean,
    SedentaryMinutesMean,
    CaloriesMean,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::SleepHoursMean,
        Metric::SleepHoursStdDev,
        Metric::TimeInBedHoursMean,
        Metric::BmiMean,
        Metric::WeightKgMean,
        Metric::DailyStepsMean,
        Metric::VeryActiveMinutesMean,
        Metric::FairlyActiveMinutesMean,
        Metric::LightlyActiveMinutesMean,
        Metric::SedentaryMinutesMean,
        Metric::CaloriesMean,
    ];

    /// Column name used in exported tables
    pub fn column_name(self) -> &'static str {
        match self {
            Metric::SleepHoursMean => "AvgSleepHours",
            Metric::SleepHoursStdDev => "SdSleepHours",
            Metric::TimeInBedHoursMean => "AvgTimeInBedHours",
            Metric::BmiMean => "AvgBMI",
            Metric::WeightKgMean => "AvgWeightKg",
            Metric::DailyStepsMean => "AvgDailySteps",
            Metric::VeryActiveMinutesMean => "AvgVeryActiveMinutes",
            Metric::FairlyActiveMinutesMean => "AvgFairlyActiveMinutes",
            Metric::LightlyActiveMinutesMean => "AvgLightlyActiveMinutes",
            Metric::SedentaryMinutesMean => "AvgSedentaryMinutes",
            Metric::CaloriesMean => "AvgCalories",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Metric::SleepHoursMean => "mean sleep hours",
            Metric::SleepHoursStdDev => "sleep hours std dev",
            Metric::TimeInBedHoursMean => "mean time in bed",
            Metric::BmiMean => "mean BMI",
            Metric::WeightKgMean => "mean weight",
            Metric::DailyStepsMean => "mean daily steps",
            Metric::VeryActiveMinutesMean => "mean very active minutes",
            Metric::FairlyActiveMinutesMean => "mean fairly active minutes",
            Metric::LightlyActiveMinutesMean => "mean lightly active minutes",
            Metric::SedentaryMinutesMean => "mean sedentary minutes",
            Metric::CaloriesMean => "mean calories",
        };
        f.write_str(label)
    }
}

/// Aggregate usage of one tracked user
#[derive(Debug, Clone, PartialEq)]
pub struct UserUsageSummary {
    pub user_id: i64,
    /// Distinct dates observed for the user
    pub total_days: usize,
    /// Days with steps > 0
    pub activity_days_used: usize,
    /// Days with a sleep value, including zero-minute sessions
    pub sleep_days_used: usize,
    pub weight_days_used: usize,
    /// Days with sleep or weight, each day counted once
    pub sleep_or_weight_days_used: usize,
    pub avg_sleep_hours: Option<f64>,
    pub sd_sleep_hours: Option<f64>,
    pub avg_time_in_bed_hours: Option<f64>,
    pub avg_bmi: Option<f64>,
    pub avg_weight_kg: Option<f64>,
    pub avg_daily_steps: Option<f64>,
    pub avg_very_active_minutes: Option<f64>,
    pub avg_fairly_active_minutes: Option<f64>,
    pub avg_lightly_active_minutes: Option<f64>,
    pub avg_sedentary_minutes: Option<f64>,
    pub avg_calories: Option<f64>,
}

impl UserUsageSummary {
    /// Statistic by name; `None` means no data
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::SleepHoursMean => self.avg_sleep_hours,
            Metric::SleepHoursStdDev => self.sd_sleep_hours,
            Metric::TimeInBedHoursMean => self.avg_time_in_bed_hours,
            Metric::BmiMean => self.avg_bmi,
            Metric::WeightKgMean => self.avg_weight_kg,
            Metric::DailyStepsMean => self.avg_daily_steps,
            Metric::VeryActiveMinutesMean => self.avg_very_active_minutes,
            Metric::FairlyActiveMinutesMean => self.avg_fairly_active_minutes,
            Metric::LightlyActiveMinutesMean => self.avg_lightly_active_minutes,
            Metric::SedentaryMinutesMean => self.avg_sedentary_minutes,
            Metric::CaloriesMean => self.avg_calories,
        }
    }

    /// Statistic by name, failing with `MissingData` when there is none
    pub fn require(&self, metric: Metric) -> Result<f64> {
        self.metric(metric).ok_or(AnalysisError::MissingData {
            user_id: self.user_id,
            metric,
        })
    }
}

const TOTAL_DAYS: &str = "TotalDays";
const ACTIVITY_DAYS: &str = "ActivityDaysUsed";
const SLEEP_DAYS: &str = "SleepDaysUsed";
const WEIGHT_DAYS: &str = "WeightDaysUsed";
const SLEEP_OR_WEIGHT_DAYS: &str = "SleepOrWeightDaysUsed";

/// Number of days in the group where `predicate` holds
fn days_where(predicate: Expr, name: &str) -> Expr {
    predicate
        .cast(DataType::UInt32)
        .sum()
        .cast(DataType::UInt32)
        .alias(name)
}

fn float(name: &str) -> Expr {
    col(name).cast(DataType::Float64)
}

fn hours(name: &str) -> Expr {
    float(name) / lit(60.0)
}

/// Group the joined table by user and summarize each user
///
/// # Returns
/// * One summary per distinct user id, ordered by user id
pub fn summarize_users(days: &[DailyRecord]) -> Result<Vec<UserUsageSummary>> {
    let has_sleep = col(MINUTES_ASLEEP).is_not_null();
    let has_weight = col(WEIGHT_KG).is_not_null();

    let frame = daily_frame(days)?
        .lazy()
        .group_by([col(ID)])
        .agg([
            col(DAY).n_unique().cast(DataType::UInt32).alias(TOTAL_DAYS),
            days_where(col(TOTAL_STEPS).gt(lit(0)), ACTIVITY_DAYS),
            days_where(has_sleep.clone(), SLEEP_DAYS),
            days_where(has_weight.clone(), WEIGHT_DAYS),
            days_where(has_sleep.or(has_weight), SLEEP_OR_WEIGHT_DAYS),
            hours(MINUTES_ASLEEP).mean().alias(Metric::SleepHoursMean.column_name()),
            hours(MINUTES_ASLEEP).std(1).alias(Metric::SleepHoursStdDev.column_name()),
            hours(MINUTES_IN_BED).mean().alias(Metric::TimeInBedHoursMean.column_name()),
            float(BMI).mean().alias(Metric::BmiMean.column_name()),
            float(WEIGHT_KG).mean().alias(Metric::WeightKgMean.column_name()),
            float(TOTAL_STEPS).mean().alias(Metric::DailyStepsMean.column_name()),
            float(VERY_ACTIVE_MINUTES).mean().alias(Metric::VeryActiveMinutesMean.column_name()),
            float(FAIRLY_ACTIVE_MINUTES)
                .mean()
                .alias(Metric::FairlyActiveMinutesMean.column_name()),
            float(LIGHTLY_ACTIVE_MINUTES)
                .mean()
                .alias(Metric::LightlyActiveMinutesMean.column_name()),
            float(SEDENTARY_MINUTES).mean().alias(Metric::SedentaryMinutesMean.column_name()),
            float(CALORIES).mean().alias(Metric::CaloriesMean.column_name()),
        ])
        .sort([ID], SortMultipleOptions::default())
        .collect()?;

    let user_ids: Vec<i64> = frame.column(ID)?.i64()?.into_no_null_iter().collect();
    let counts = |name: &str| -> Result<Vec<usize>> {
        Ok(frame
            .column(name)?
            .u32()?
            .into_iter()
            .map(|count| count.unwrap_or(0) as usize)
            .collect())
    };
    let stat = |metric: Metric| -> Result<Vec<Option<f64>>> {
        Ok(frame.column(metric.column_name())?.f64()?.into_iter().collect())
    };

    let total_days = counts(TOTAL_DAYS)?;
    let activity_days = counts(ACTIVITY_DAYS)?;
    let sleep_days = counts(SLEEP_DAYS)?;
    let weight_days = counts(WEIGHT_DAYS)?;
    let sleep_or_weight_days = counts(SLEEP_OR_WEIGHT_DAYS)?;
    let stats = Metric::ALL
        .iter()
        .map(|&metric| stat(metric))
        .collect::<Result<Vec<_>>>()?;

    let summaries: Vec<UserUsageSummary> = user_ids
        .iter()
        .enumerate()
        .map(|(i, &user_id)| {
            // `Metric::ALL` lists metrics in declaration order
            let value = |metric: Metric| stats[metric as usize][i];
            UserUsageSummary {
                user_id,
                total_days: total_days[i],
                activity_days_used: activity_days[i],
                sleep_days_used: sleep_days[i],
                weight_days_used: weight_days[i],
                sleep_or_weight_days_used: sleep_or_weight_days[i],
                avg_sleep_hours: value(Metric::SleepHoursMean),
                sd_sleep_hours: value(Metric::SleepHoursStdDev),
                avg_time_in_bed_hours: value(Metric::TimeInBedHoursMean),
                avg_bmi: value(Metric::BmiMean),
                avg_weight_kg: value(Metric::WeightKgMean),
                avg_daily_steps: value(Metric::DailyStepsMean),
                avg_very_active_minutes: value(Metric::VeryActiveMinutesMean),
                avg_fairly_active_minutes: value(Metric::FairlyActiveMinutesMean),
                avg_lightly_active_minutes: value(Metric::LightlyActiveMinutesMean),
                avg_sedentary_minutes: value(Metric::SedentaryMinutesMean),
                avg_calories: value(Metric::CaloriesMean),
            }
        })
        .collect();

    debug!(users = summaries.len(), days = days.len(), "summarized users");
    Ok(summaries)
}
