//! Data loading for the three tracker exports using Polars
//!
//! Every source is read with all columns as text and then parsed cell by cell,
//! so a malformed value is reported with its file, row and column instead of
//! being coerced to null.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};

/// Date encodings used by the tracker exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `4/12/2016`
    MonthDayYear,
    /// `4/12/2016 11:59:59 PM`
    MonthDayYear12h,
}

impl DateFormat {
    /// chrono pattern for this encoding
    pub fn pattern(self) -> &'static str {
        match self {
            DateFormat::MonthDayYear => "%m/%d/%Y",
            DateFormat::MonthDayYear12h => "%m/%d/%Y %I:%M:%S %p",
        }
    }

    /// Parse a raw cell. Plain dates map to midnight.
    pub fn parse(self, raw: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
        match self {
            DateFormat::MonthDayYear => {
                NaiveDate::parse_from_str(raw, self.pattern()).map(|d| d.and_time(NaiveTime::MIN))
            }
            DateFormat::MonthDayYear12h => NaiveDateTime::parse_from_str(raw, self.pattern()),
        }
    }
}

/// One row of the daily activity export
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub user_id: i64,
    pub date: NaiveDate,
    pub total_steps: Option<u32>,
    pub total_distance_km: Option<f64>,
    pub very_active_minutes: Option<u32>,
    pub fairly_active_minutes: Option<u32>,
    pub lightly_active_minutes: Option<u32>,
    pub sedentary_minutes: Option<u32>,
    pub calories: Option<u32>,
}

/// One row of the daily sleep export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepRecord {
    pub user_id: i64,
    pub recorded_at: NaiveDateTime,
    pub sleep_records: Option<u32>,
    pub minutes_asleep: Option<u32>,
    pub minutes_in_bed: Option<u32>,
}

impl SleepRecord {
    pub fn date(&self) -> NaiveDate {
        self.recorded_at.date()
    }
}

/// One weight log entry. A user may log several per day.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightRecord {
    pub user_id: i64,
    pub recorded_at: NaiveDateTime,
    pub weight_kg: Option<f64>,
    pub bmi: Option<f64>,
    pub is_manual_report: Option<bool>,
    pub log_id: Option<i64>,
}

impl WeightRecord {
    pub fn date(&self) -> NaiveDate {
        self.recorded_at.date()
    }
}

/// Load the daily activity export (`dailyActivity_merged.csv` layout)
///
/// # Arguments
/// * `path` - CSV file with `Id`, `ActivityDate`, `TotalSteps`, `TotalDistance`,
///   per-intensity minute columns, `SedentaryMinutes` and `Calories`
///
/// # Returns
/// * One `ActivityRecord` per data row, in file order
pub fn load_activity(path: impl AsRef<Path>) -> Result<Vec<ActivityRecord>> {
    let table = SourceTable::read(path.as_ref())?;
    let ids = table.column("Id")?;
    let dates = table.column("ActivityDate")?;
    let steps = table.column("TotalSteps")?;
    let distance = table.column("TotalDistance")?;
    let very_active = table.column("VeryActiveMinutes")?;
    let fairly_active = table.column("FairlyActiveMinutes")?;
    let lightly_active = table.column("LightlyActiveMinutes")?;
    let sedentary = table.column("SedentaryMinutes")?;
    let calories = table.column("Calories")?;

    let records = (0..table.height())
        .map(|row| {
            Ok(ActivityRecord {
                user_id: table.required(&ids, row)?,
                date: table.date(&dates, row, DateFormat::MonthDayYear)?.date(),
                total_steps: table.value(&steps, row)?,
                total_distance_km: table.value(&distance, row)?,
                very_active_minutes: table.value(&very_active, row)?,
                fairly_active_minutes: table.value(&fairly_active, row)?,
                lightly_active_minutes: table.value(&lightly_active, row)?,
                sedentary_minutes: table.value(&sedentary, row)?,
                calories: table.value(&calories, row)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(file = %table.file.display(), rows = records.len(), "loaded activity records");
    Ok(records)
}

/// Load the daily sleep export (`sleepDay_merged.csv` layout)
///
/// The export is known to contain literal re-exports of the same measurement,
/// so rows repeating an earlier row in every column are dropped before parsing.
/// Parse errors still name the row's position in the file.
pub fn load_sleep(path: impl AsRef<Path>) -> Result<Vec<SleepRecord>> {
    let mut table = SourceTable::read(path.as_ref())?;
    let raw_rows = table.height();
    table.drop_duplicate_rows()?;

    let ids = table.column("Id")?;
    let days = table.column("SleepDay")?;
    let sleep_records = table.column("TotalSleepRecords")?;
    let asleep = table.column("TotalMinutesAsleep")?;
    let in_bed = table.column("TotalTimeInBed")?;

    let records = (0..table.height())
        .map(|row| {
            Ok(SleepRecord {
                user_id: table.required(&ids, row)?,
                recorded_at: table.date(&days, row, DateFormat::MonthDayYear12h)?,
                sleep_records: table.value(&sleep_records, row)?,
                minutes_asleep: table.value(&asleep, row)?,
                minutes_in_bed: table.value(&in_bed, row)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        file = %table.file.display(),
        rows = records.len(),
        duplicates_dropped = raw_rows - records.len(),
        "loaded sleep records"
    );
    Ok(records)
}

/// Load the weight log export (`weightLogInfo_merged.csv` layout)
pub fn load_weight(path: impl AsRef<Path>) -> Result<Vec<WeightRecord>> {
    let table = SourceTable::read(path.as_ref())?;
    let ids = table.column("Id")?;
    let dates = table.column("Date")?;
    let weight = table.column("WeightKg")?;
    let bmi = table.column("BMI")?;
    let manual = table.column("IsManualReport")?;
    let log_ids = table.column("LogId")?;

    let records = (0..table.height())
        .map(|row| {
            Ok(WeightRecord {
                user_id: table.required(&ids, row)?,
                recorded_at: table.date(&dates, row, DateFormat::MonthDayYear12h)?,
                weight_kg: table.value(&weight, row)?,
                bmi: table.value(&bmi, row)?,
                is_manual_report: table.flag(&manual, row)?,
                log_id: table.value(&log_ids, row)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(file = %table.file.display(), rows = records.len(), "loaded weight records");
    Ok(records)
}

/// Drop rows equal to an earlier row in every one of `columns`, keeping the
/// first occurrence and file order
pub fn dedup_rows(frame: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    Ok(frame.unique_stable(Some(columns), UniqueKeepStrategy::First, None)?)
}

/// Position of each row in the source file, 1-based
const ROW_NUMBER: &str = "__row_number";

/// A CSV source read entirely as text
struct SourceTable {
    file: PathBuf,
    /// [`ROW_NUMBER`] followed by the source columns
    frame: DataFrame,
    /// Names of the columns read from the file
    source_columns: Vec<String>,
    /// File row of each frame row
    rows: Vec<usize>,
}

/// The raw cells of one named column
struct TextColumn {
    name: &'static str,
    cells: Vec<Option<String>>,
}

impl SourceTable {
    fn read(path: &Path) -> Result<Self> {
        // A zero-row inference window makes Polars read every column as String.
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;

        debug!(file = %path.display(), shape = ?frame.shape(), "read csv");
        let source_columns = frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let frame = frame.with_row_index(ROW_NUMBER.into(), Some(1))?;

        let mut table = Self {
            file: path.to_path_buf(),
            frame,
            source_columns,
            rows: Vec::new(),
        };
        table.rows = table.row_numbers()?;
        Ok(table)
    }

    fn row_numbers(&self) -> Result<Vec<usize>> {
        Ok(self
            .frame
            .column(ROW_NUMBER)?
            .idx()?
            .into_no_null_iter()
            .map(|row| row as usize)
            .collect())
    }

    /// Remove exact repeats of earlier rows over all source columns
    fn drop_duplicate_rows(&mut self) -> Result<()> {
        self.frame = dedup_rows(&self.frame, &self.source_columns)?;
        self.rows = self.row_numbers()?;
        Ok(())
    }

    fn height(&self) -> usize {
        self.frame.height()
    }

    fn row_number(&self, row: usize) -> usize {
        self.rows.get(row).copied().unwrap_or(row + 1)
    }

    fn column(&self, name: &'static str) -> Result<TextColumn> {
        let column = self
            .frame
            .column(name)
            .map_err(|_| self.error(name, 0, "column not found"))?;
        let text = column
            .str()
            .map_err(|e| self.error(name, 0, format!("column is not text: {}", e)))?;

        let cells = text
            .into_iter()
            .map(|cell| {
                cell.map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
            .collect();
        Ok(TextColumn { name, cells })
    }

    fn cell<'a>(&self, column: &'a TextColumn, row: usize) -> Option<&'a str> {
        column.cells.get(row).and_then(|c| c.as_deref())
    }

    /// Parse an optional value; an empty cell is `None`.
    fn value<T>(&self, column: &TextColumn, row: usize) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.cell(column, row)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    self.error(
                        column.name,
                        self.row_number(row),
                        format!("invalid value {:?}: {}", raw, e),
                    )
                })
            })
            .transpose()
    }

    fn required<T>(&self, column: &TextColumn, row: usize) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.value(column, row)?
            .ok_or_else(|| self.error(column.name, self.row_number(row), "missing value"))
    }

    fn date(&self, column: &TextColumn, row: usize, format: DateFormat) -> Result<NaiveDateTime> {
        let raw = self
            .cell(column, row)
            .ok_or_else(|| self.error(column.name, self.row_number(row), "missing date"))?;
        format.parse(raw).map_err(|e| {
            self.error(
                column.name,
                self.row_number(row),
                format!("expected {}, got {:?}: {}", format.pattern(), raw, e),
            )
        })
    }

    /// Boolean flags are exported as `True`/`False`.
    fn flag(&self, column: &TextColumn, row: usize) -> Result<Option<bool>> {
        self.cell(column, row)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.error(
                    column.name,
                    self.row_number(row),
                    format!("invalid flag {:?}", raw),
                )),
            })
            .transpose()
    }

    fn error(&self, column: &str, row: usize, message: impl Into<String>) -> AnalysisError {
        AnalysisError::Parse {
            file: self.file.clone(),
            row,
            column: column.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    const ACTIVITY_HEADER: &str = "Id,ActivityDate,TotalSteps,TotalDistance,TrackerDistance,VeryActiveMinutes,FairlyActiveMinutes,LightlyActiveMinutes,SedentaryMinutes,Calories";
    const SLEEP_HEADER: &str = "Id,SleepDay,TotalSleepRecords,TotalMinutesAsleep,TotalTimeInBed";
    const WEIGHT_HEADER: &str = "Id,Date,WeightKg,WeightPounds,Fat,BMI,IsManualReport,LogId";

    #[test]
    fn test_date_format_discards_time_of_day() {
        let parsed = DateFormat::MonthDayYear12h
            .parse("4/12/2016 11:59:59 PM")
            .unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2016, 4, 12).unwrap());

        let plain = DateFormat::MonthDayYear.parse("5/1/2016").unwrap();
        assert_eq!(plain.date(), NaiveDate::from_ymd_opt(2016, 5, 1).unwrap());
        assert!(DateFormat::MonthDayYear.parse("2016-05-01").is_err());
    }

    #[test]
    fn test_load_activity() {
        let file = write_csv(&[
            ACTIVITY_HEADER,
            "1503960366,4/12/2016,13162,8.5,8.5,25,13,328,728,1985",
            "1503960366,4/13/2016,0,0,0,0,0,0,1440,1200",
            "1624580081,4/12/2016,,1.2,1.2,0,0,50,1200,1500",
        ]);

        let records = load_activity(file.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].user_id, 1503960366);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2016, 4, 12).unwrap());
        assert_eq!(records[0].total_steps, Some(13162));
        assert_eq!(records[0].total_distance_km, Some(8.5));
        assert_eq!(records[0].very_active_minutes, Some(25));
        assert_eq!(records[0].sedentary_minutes, Some(728));
        assert_eq!(records[1].total_steps, Some(0));
        assert_eq!(records[2].total_steps, None);
    }

    #[test]
    fn test_load_activity_rejects_bad_date() {
        let file = write_csv(&[
            ACTIVITY_HEADER,
            "1503960366,4/12/2016,13162,8.5,8.5,25,13,328,728,1985",
            "1503960366,2016-04-13,0,0,0,0,0,0,1440,1200",
        ]);

        match load_activity(file.path()) {
            Err(AnalysisError::Parse { row, column, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "ActivityDate");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_activity_rejects_bad_number() {
        let file = write_csv(&[
            ACTIVITY_HEADER,
            "1503960366,4/12/2016,lots,8.5,8.5,25,13,328,728,1985",
        ]);

        match load_activity(file.path()) {
            Err(AnalysisError::Parse { row, column, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "TotalSteps");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_activity_rejects_missing_column() {
        let file = write_csv(&["Id,ActivityDate", "1503960366,4/12/2016"]);
        let err = load_activity(file.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { row: 0, .. }));
    }

    #[test]
    fn test_load_sleep_drops_exact_duplicates() {
        let file = write_csv(&[
            SLEEP_HEADER,
            "8378563200,4/12/2016 12:00:00 AM,1,338,356",
            "8378563200,4/12/2016 12:00:00 AM,1,338,356",
            "8378563200,4/13/2016 12:00:00 AM,1,338,356",
            "8378563200,4/14/2016 12:00:00 AM,1,400,420",
            "8378563200,4/14/2016 12:00:00 AM,1,401,420",
        ]);

        let records = load_sleep(file.path()).unwrap();
        assert_eq!(records.len(), 4);

        let april_12 = NaiveDate::from_ymd_opt(2016, 4, 12).unwrap();
        assert_eq!(records.iter().filter(|r| r.date() == april_12).count(), 1);
        // Same day but different minutes is not an exact duplicate
        let april_14 = NaiveDate::from_ymd_opt(2016, 4, 14).unwrap();
        assert_eq!(records.iter().filter(|r| r.date() == april_14).count(), 2);
    }

    #[test]
    fn test_dedup_rows_is_idempotent() {
        let frame = polars::df!(
            "Id" => ["1", "1", "1", "1"],
            "SleepDay" => ["4/12/2016 12:00:00 AM"; 4],
            "TotalMinutesAsleep" => ["300", "300", "310", "300"],
        )
        .unwrap();
        let columns: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let once = dedup_rows(&frame, &columns).unwrap();
        let twice = dedup_rows(&once, &columns).unwrap();
        assert_eq!(once.height(), 2);
        let minutes: Vec<Option<&str>> = once
            .column("TotalMinutesAsleep")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(minutes, vec![Some("300"), Some("310")]);
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_load_sleep_reports_file_row_after_dedup() {
        let file = write_csv(&[
            SLEEP_HEADER,
            "8378563200,4/12/2016 12:00:00 AM,1,338,356",
            "8378563200,4/12/2016 12:00:00 AM,1,338,356",
            "8378563200,4/13/2016 12:00:00 AM,1,many,356",
        ]);

        match load_sleep(file.path()) {
            Err(AnalysisError::Parse { row, column, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(column, "TotalMinutesAsleep");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_weight() {
        let file = write_csv(&[
            WEIGHT_HEADER,
            "1503960366,5/2/2016 11:59:59 PM,52.599998474121101,115.963147,22,22.649999618530298,True,1462233599000",
            "1927972279,4/13/2016 1:08:52 AM,133.5,294.31712,,47.540000915527301,False,1460509732000",
        ]);

        let records = load_weight(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date(), NaiveDate::from_ymd_opt(2016, 5, 2).unwrap());
        assert_eq!(records[0].is_manual_report, Some(true));
        assert!((records[0].bmi.unwrap() - 22.65).abs() < 1e-6);
        assert_eq!(records[1].is_manual_report, Some(false));
        assert_eq!(records[1].log_id, Some(1460509732000));
        assert_eq!(records[1].weight_kg, Some(133.5));
    }
}
