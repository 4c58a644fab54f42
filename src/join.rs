//! Left join of the three exports into one record per user per day

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, warn};

use crate::data::{ActivityRecord, SleepRecord, WeightRecord};
use crate::error::Result;

pub(crate) const ID: &str = "Id";
pub(crate) const DAY: &str = "Day";
pub(crate) const TOTAL_STEPS: &str = "TotalSteps";
pub(crate) const VERY_ACTIVE_MINUTES: &str = "VeryActiveMinutes";
pub(crate) const FAIRLY_ACTIVE_MINUTES: &str = "FairlyActiveMinutes";
pub(crate) const LIGHTLY_ACTIVE_MINUTES: &str = "LightlyActiveMinutes";
pub(crate) const SEDENTARY_MINUTES: &str = "SedentaryMinutes";
pub(crate) const CALORIES: &str = "Calories";
pub(crate) const MINUTES_ASLEEP: &str = "TotalMinutesAsleep";
pub(crate) const MINUTES_IN_BED: &str = "TotalTimeInBed";
pub(crate) const WEIGHT_KG: &str = "WeightKg";
pub(crate) const BMI: &str = "BMI";
const ACTIVITY_ROW: &str = "ActivityRow";

/// Composite join key
pub type DayKey = (i64, NaiveDate);

/// One user-day: the activity row plus whatever sleep and weight rows matched.
/// Sleep and weight fields are `None` when nothing was logged that day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub user_id: i64,
    pub date: NaiveDate,
    pub total_steps: Option<u32>,
    pub total_distance_km: Option<f64>,
    pub very_active_minutes: Option<u32>,
    pub fairly_active_minutes: Option<u32>,
    pub lightly_active_minutes: Option<u32>,
    pub sedentary_minutes: Option<u32>,
    pub calories: Option<u32>,
    pub minutes_asleep: Option<u32>,
    pub minutes_in_bed: Option<u32>,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
}

impl DailyRecord {
    fn from_activity(activity: &ActivityRecord) -> Self {
        Self {
            user_id: activity.user_id,
            date: activity.date,
            total_steps: activity.total_steps,
            total_distance_km: activity.total_distance_km,
            very_active_minutes: activity.very_active_minutes,
            fairly_active_minutes: activity.fairly_active_minutes,
            lightly_active_minutes: activity.lightly_active_minutes,
            sedentary_minutes: activity.sedentary_minutes,
            calories: activity.calories,
            minutes_asleep: None,
            minutes_in_bed: None,
            weight_kg: None,
            bmi: None,
        }
    }

    pub fn key(&self) -> DayKey {
        (self.user_id, self.date)
    }

    /// A sleep row with minutes asleep matched this day
    pub fn has_sleep(&self) -> bool {
        self.minutes_asleep.is_some()
    }

    /// A weight entry with a weight value matched this day
    pub fn has_weight(&self) -> bool {
        self.weight_kg.is_some()
    }
}

/// Join the exports on (user id, date)
///
/// # Arguments
/// * `activity` - Activity rows; each distinct key yields exactly one output row
/// * `sleep` - Sleep rows, already deduplicated
/// * `weight` - Weight log rows, possibly several per key
///
/// # Returns
/// * One `DailyRecord` per distinct activity key, in activity order
///
/// When several sleep or weight rows share a key, the last one in source order
/// that carries a value (minutes asleep, weight) is used, so an activity row is
/// never repeated and an empty late entry never hides an earlier measurement.
/// Duplicate activity keys keep their first row.
pub fn join_daily(
    activity: &[ActivityRecord],
    sleep: &[SleepRecord],
    weight: &[WeightRecord],
) -> Result<Vec<DailyRecord>> {
    let keys = DataFrame::new(vec![
        Column::new(ID.into(), activity.iter().map(|a| a.user_id).collect::<Vec<_>>()),
        Column::new(DAY.into(), activity.iter().map(|a| a.date).collect::<Vec<_>>()),
    ])?
    .with_row_index(ACTIVITY_ROW.into(), None)?;
    let key_columns = [ID.to_string(), DAY.to_string()];
    let unique_keys = keys.unique_stable(Some(&key_columns[..]), UniqueKeepStrategy::First, None)?;
    let duplicates = keys.height() - unique_keys.height();
    if duplicates > 0 {
        warn!(duplicates, "activity export repeats user-days; kept the first row of each");
    }

    let sleep_frame = DataFrame::new(vec![
        Column::new(ID.into(), sleep.iter().map(|s| s.user_id).collect::<Vec<_>>()),
        Column::new(DAY.into(), sleep.iter().map(|s| s.date()).collect::<Vec<_>>()),
        Column::new(
            MINUTES_ASLEEP.into(),
            sleep.iter().map(|s| s.minutes_asleep).collect::<Vec<_>>(),
        ),
        Column::new(
            MINUTES_IN_BED.into(),
            sleep.iter().map(|s| s.minutes_in_bed).collect::<Vec<_>>(),
        ),
    ])?;
    let weight_frame = DataFrame::new(vec![
        Column::new(ID.into(), weight.iter().map(|w| w.user_id).collect::<Vec<_>>()),
        Column::new(DAY.into(), weight.iter().map(|w| w.date()).collect::<Vec<_>>()),
        Column::new(WEIGHT_KG.into(), weight.iter().map(|w| w.weight_kg).collect::<Vec<_>>()),
        Column::new(BMI.into(), weight.iter().map(|w| w.bmi).collect::<Vec<_>>()),
    ])?;

    let sleep_by_day = last_present_by_day(sleep_frame, MINUTES_ASLEEP, MINUTES_IN_BED)?;
    let weight_by_day = last_present_by_day(weight_frame, WEIGHT_KG, BMI)?;
    debug!(
        sleep_rows = sleep.len(),
        sleep_days = sleep_by_day.height(),
        weight_rows = weight.len(),
        weight_days = weight_by_day.height(),
        "indexed sleep and weight rows"
    );

    let on = [col(ID), col(DAY)];
    let joined = unique_keys
        .lazy()
        .join(
            sleep_by_day.lazy(),
            on.clone(),
            on.clone(),
            JoinArgs::new(JoinType::Left),
        )
        .join(
            weight_by_day.lazy(),
            on.clone(),
            on,
            JoinArgs::new(JoinType::Left),
        )
        .sort([ACTIVITY_ROW], SortMultipleOptions::default())
        .collect()?;

    let rows = joined.column(ACTIVITY_ROW)?.idx()?;
    let asleep = joined.column(MINUTES_ASLEEP)?.u32()?;
    let in_bed = joined.column(MINUTES_IN_BED)?.u32()?;
    let weight_kg = joined.column(WEIGHT_KG)?.f64()?;
    let bmi = joined.column(BMI)?.f64()?;

    let days = rows
        .into_no_null_iter()
        .zip(asleep)
        .zip(in_bed)
        .zip(weight_kg)
        .zip(bmi)
        .map(|((((row, asleep), in_bed), weight_kg), bmi)| DailyRecord {
            minutes_asleep: asleep,
            minutes_in_bed: in_bed,
            weight_kg,
            bmi,
            ..DailyRecord::from_activity(&activity[row as usize])
        })
        .collect();
    Ok(days)
}

/// Collapse rows sharing (user id, date) to the last one whose `value` is
/// present, carrying `companion` from the same row
fn last_present_by_day(frame: DataFrame, value: &str, companion: &str) -> Result<DataFrame> {
    let rows = frame.height();
    let by_day = frame
        .lazy()
        .filter(col(value).is_not_null())
        .group_by_stable([col(ID), col(DAY)])
        .agg([col(value).last(), col(companion).last()])
        .collect()?;

    if by_day.height() < rows {
        debug!(
            column = value,
            collapsed = rows - by_day.height(),
            "collapsed same-day rows, latest entry with a value wins"
        );
    }
    Ok(by_day)
}

/// The joined table as a frame, one row per user-day, for per-user aggregation
pub(crate) fn daily_frame(days: &[DailyRecord]) -> Result<DataFrame> {
    let column = |name: &str, values: Vec<Option<u32>>| Column::new(name.into(), values);
    Ok(DataFrame::new(vec![
        Column::new(ID.into(), days.iter().map(|d| d.user_id).collect::<Vec<_>>()),
        Column::new(DAY.into(), days.iter().map(|d| d.date).collect::<Vec<_>>()),
        column(TOTAL_STEPS, days.iter().map(|d| d.total_steps).collect()),
        column(VERY_ACTIVE_MINUTES, days.iter().map(|d| d.very_active_minutes).collect()),
        column(FAIRLY_ACTIVE_MINUTES, days.iter().map(|d| d.fairly_active_minutes).collect()),
        column(LIGHTLY_ACTIVE_MINUTES, days.iter().map(|d| d.lightly_active_minutes).collect()),
        column(SEDENTARY_MINUTES, days.iter().map(|d| d.sedentary_minutes).collect()),
        column(CALORIES, days.iter().map(|d| d.calories).collect()),
        column(MINUTES_ASLEEP, days.iter().map(|d| d.minutes_asleep).collect()),
        column(MINUTES_IN_BED, days.iter().map(|d| d.minutes_in_bed).collect()),
        Column::new(WEIGHT_KG.into(), days.iter().map(|d| d.weight_kg).collect::<Vec<_>>()),
        Column::new(BMI.into(), days.iter().map(|d| d.bmi).collect::<Vec<_>>()),
    ])?)
}
