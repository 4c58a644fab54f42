//! Error taxonomy for the analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::summary::Metric;

/// All errors produced by the analysis library.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A source row carried a malformed date or numeric value, or a required
    /// column was absent. The source is unusable.
    #[error("Failed to parse {file}: row {row}, column {column}: {message}")]
    Parse {
        file: PathBuf,
        /// 1-based data row, header excluded. 0 when the error concerns the
        /// whole column.
        row: usize,
        column: String,
        message: String,
    },

    /// A statistic was requested strictly but the user has no eligible
    /// observations for it.
    #[error("No data for {metric} of user {user_id}")]
    MissingData { user_id: i64, metric: Metric },

    /// The requested clustering cannot run on the given input.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The clustering backend failed to fit.
    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_parse() {
        let err = AnalysisError::Parse {
            file: PathBuf::from("sleepDay_merged.csv"),
            row: 7,
            column: "SleepDay".to_string(),
            message: "expected %m/%d/%Y %I:%M:%S %p, got \"2016-04-12\"".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sleepDay_merged.csv"));
        assert!(msg.contains("row 7"));
        assert!(msg.contains("SleepDay"));
    }

    #[test]
    fn test_error_display_missing_data() {
        let err = AnalysisError::MissingData {
            user_id: 1503960366,
            metric: Metric::SleepHoursStdDev,
        };
        assert_eq!(
            err.to_string(),
            "No data for sleep hours std dev of user 1503960366"
        );
    }

    #[test]
    fn test_error_display_configuration() {
        let err = AnalysisError::Configuration("need at least 3 users".to_string());
        assert_eq!(err.to_string(), "Configuration error: need at least 3 users");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: AnalysisError = io_err.into();
        assert!(err.to_string().contains("no such file"));
    }
}
