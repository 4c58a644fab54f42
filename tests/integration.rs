//! Integration tests for UsageForge

use std::io::Write;
use tempfile::NamedTempFile;
use usageforge::{
    analyze, join_daily, load_activity, load_sleep, load_weight, summarize_users, AnalysisError,
    ClusterParams, UsageTier,
};

const ACTIVITY_HEADER: &str = "Id,ActivityDate,TotalSteps,TotalDistance,TrackerDistance,LoggedActivitiesDistance,VeryActiveDistance,ModeratelyActiveDistance,LightActiveDistance,SedentaryActiveDistance,VeryActiveMinutes,FairlyActiveMinutes,LightlyActiveMinutes,SedentaryMinutes,Calories";
const SLEEP_HEADER: &str = "Id,SleepDay,TotalSleepRecords,TotalMinutesAsleep,TotalTimeInBed";
const WEIGHT_HEADER: &str = "Id,Date,WeightKg,WeightPounds,Fat,BMI,IsManualReport,LogId";

fn write_csv(header: &str, rows: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", header).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file
}

fn activity_row(user_id: i64, day: u32, steps: u32) -> String {
    format!(
        "{},4/{}/2016,{},{:.2},{:.2},0,0,0,0,0,{},{},{},{},{}",
        user_id,
        day,
        steps,
        steps as f64 / 1300.0,
        steps as f64 / 1300.0,
        steps / 1000,
        steps / 2000,
        steps / 40,
        1440 - steps / 40 - steps / 1000 - steps / 2000,
        1500 + steps / 10
    )
}

fn sleep_row(user_id: i64, day: u32, minutes: u32) -> String {
    format!("{},4/{}/2016 12:00:00 AM,1,{},{}", user_id, day, minutes, minutes + 25)
}

fn weight_row(user_id: i64, day: u32, time: &str, kg: f64) -> String {
    format!(
        "{},4/{}/2016 {},{},{:.3},,{:.2},True,{}",
        user_id,
        day,
        time,
        kg,
        kg * 2.20462,
        kg / 3.0,
        1460000000000i64 + day as i64
    )
}

/// Three users over ten days with clearly different tracking habits:
/// - 100: wears the tracker rarely, never logs sleep or weight
/// - 200: wears it most days, logs a few nights
/// - 300: wears it every day, logs sleep every night and weight twice a day
/// - 400: like 100 with one more active day
/// - 500: like 200
/// - 600: like 300 without weight
struct Fixture {
    activity: NamedTempFile,
    sleep: NamedTempFile,
    weight: NamedTempFile,
}

fn create_fixture() -> Fixture {
    let mut activity = Vec::new();
    let mut sleep = Vec::new();
    let mut weight = Vec::new();

    for day in 12..22 {
        activity.push(activity_row(100, day, if day < 14 { 3000 } else { 0 }));
        activity.push(activity_row(400, day, if day < 15 { 2500 } else { 0 }));

        activity.push(activity_row(200, day, if day < 20 { 8000 } else { 0 }));
        activity.push(activity_row(500, day, if day < 19 { 7000 } else { 0 }));
        if day < 14 {
            sleep.push(sleep_row(200, day, 400));
            sleep.push(sleep_row(500, day, 380));
        }

        activity.push(activity_row(300, day, 12000));
        activity.push(activity_row(600, day, 11000));
        sleep.push(sleep_row(300, day, 450));
        sleep.push(sleep_row(600, day, 420));
        weight.push(weight_row(300, day, "7:00:00 AM", 80.0));
        weight.push(weight_row(300, day, "10:00:00 PM", 81.0));
    }
    // literal re-export of one night
    sleep.push(sleep_row(300, 12, 450));

    Fixture {
        activity: write_csv(ACTIVITY_HEADER, &activity),
        sleep: write_csv(SLEEP_HEADER, &sleep),
        weight: write_csv(WEIGHT_HEADER, &weight),
    }
}

#[test]
fn test_end_to_end_pipeline() {
    let fixture = create_fixture();

    let analysis = analyze(
        fixture.activity.path(),
        fixture.sleep.path(),
        fixture.weight.path(),
        &ClusterParams::default(),
    )
    .unwrap();

    // one joined row per activity row, no fan-out from the double weight logs
    assert_eq!(analysis.daily.len(), 60);
    assert_eq!(analysis.summaries.len(), 6);

    let classification = &analysis.classification;
    assert_eq!(classification.users.len(), 6);
    assert_eq!(classification.tier_sizes().iter().sum::<usize>(), 6);

    let tier_of = |id: i64| {
        classification
            .users
            .iter()
            .find(|u| u.summary.user_id == id)
            .map(|u| u.tier)
            .unwrap()
    };
    assert_eq!(tier_of(100), UsageTier::Occasional);
    assert_eq!(tier_of(400), UsageTier::Occasional);
    assert_eq!(tier_of(200), UsageTier::Frequent);
    assert_eq!(tier_of(500), UsageTier::Frequent);
    assert_eq!(tier_of(300), UsageTier::Heavy);
    assert_eq!(tier_of(600), UsageTier::Heavy);
}

#[test]
fn test_summary_counts() {
    let fixture = create_fixture();

    let activity = load_activity(fixture.activity.path()).unwrap();
    let sleep = load_sleep(fixture.sleep.path()).unwrap();
    let weight = load_weight(fixture.weight.path()).unwrap();
    let daily = join_daily(&activity, &sleep, &weight).unwrap();
    let summaries = summarize_users(&daily).unwrap();

    let user = |id: i64| summaries.iter().find(|s| s.user_id == id).unwrap();

    let occasional = user(100);
    assert_eq!(occasional.total_days, 10);
    assert_eq!(occasional.activity_days_used, 2);
    assert_eq!(occasional.sleep_or_weight_days_used, 0);
    assert_eq!(occasional.avg_daily_steps, Some(600.0));
    assert_eq!(occasional.avg_sleep_hours, None);
    assert_eq!(occasional.avg_bmi, None);

    let heavy = user(300);
    assert_eq!(heavy.activity_days_used, 10);
    // the duplicated night is counted once
    assert_eq!(heavy.sleep_days_used, 10);
    assert_eq!(heavy.weight_days_used, 10);
    assert_eq!(heavy.sleep_or_weight_days_used, 10);
    assert_eq!(heavy.avg_sleep_hours, Some(7.5));
    assert!(heavy.sd_sleep_hours.unwrap().abs() < 1e-12);
    // the evening weigh-in wins
    assert_eq!(heavy.avg_weight_kg, Some(81.0));

    for s in &summaries {
        assert!(s.sleep_or_weight_days_used >= s.sleep_days_used.max(s.weight_days_used));
        assert!(s.sleep_or_weight_days_used <= s.sleep_days_used + s.weight_days_used);
        assert!(s.activity_days_used <= s.total_days);
    }
}

#[test]
fn test_zero_step_days_scenario() {
    let activity = write_csv(
        ACTIVITY_HEADER,
        &[
            activity_row(1, 12, 0),
            activity_row(1, 13, 0),
            activity_row(1, 14, 5000),
        ],
    );
    let sleep = write_csv(SLEEP_HEADER, &[]);
    let weight = write_csv(WEIGHT_HEADER, &[]);

    let daily = join_daily(
        &load_activity(activity.path()).unwrap(),
        &load_sleep(sleep.path()).unwrap(),
        &load_weight(weight.path()).unwrap(),
    )
    .unwrap();
    assert_eq!(daily.len(), 3);

    let summaries = summarize_users(&daily).unwrap();
    let a = &summaries[0];
    assert_eq!(a.activity_days_used, 1);
    assert_eq!(a.sleep_days_used, 0);
    assert!((a.avg_daily_steps.unwrap() - 1666.6667).abs() < 1e-3);
    assert_eq!(a.avg_sleep_hours, None);
}

#[test]
fn test_duplicate_sleep_rows_scenario() {
    let sleep = write_csv(SLEEP_HEADER, &[sleep_row(2, 12, 360), sleep_row(2, 12, 360)]);
    let records = load_sleep(sleep.path()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].minutes_asleep, Some(360));
}

#[test]
fn test_error_handling_too_few_users() {
    let activity = write_csv(
        ACTIVITY_HEADER,
        &[activity_row(1, 12, 100), activity_row(2, 12, 0)],
    );
    let sleep = write_csv(SLEEP_HEADER, &[]);
    let weight = write_csv(WEIGHT_HEADER, &[]);

    let result = analyze(
        activity.path(),
        sleep.path(),
        weight.path(),
        &ClusterParams::default(),
    );
    assert!(matches!(result, Err(AnalysisError::Configuration(_))));
}

#[test]
fn test_error_handling_malformed_sleep_date() {
    let fixture = create_fixture();
    let bad_sleep = write_csv(SLEEP_HEADER, &["300,2016-04-12,1,450,475".to_string()]);

    let result = analyze(
        fixture.activity.path(),
        bad_sleep.path(),
        fixture.weight.path(),
        &ClusterParams::default(),
    );
    match result {
        Err(AnalysisError::Parse { column, row, .. }) => {
            assert_eq!(column, "SleepDay");
            assert_eq!(row, 1);
        }
        other => panic!("expected parse error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_prediction() {
    let fixture = create_fixture();
    let analysis = analyze(
        fixture.activity.path(),
        fixture.sleep.path(),
        fixture.weight.path(),
        &ClusterParams::default(),
    )
    .unwrap();

    assert_eq!(analysis.classification.predict(1.0, 0.0), UsageTier::Occasional);
    assert_eq!(analysis.classification.predict(10.0, 10.0), UsageTier::Heavy);
}
