//! Error taxonomy for a single forecast run.

use chrono::NaiveDate;
use thiserror::Error;

/// Failure of a forecast run.
///
/// Every variant is fatal for the run that raised it. The serving layer turns
/// any of them into a single `{"error": ...}` body.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// Historical or forecast-input data could not be obtained.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Not enough trailing days with a known AQI to build lag and rolling features.
    #[error(
        "Insufficient history: {required} trailing days with known AQI required, {available} available"
    )]
    InsufficientHistory { required: usize, available: usize },

    /// The computed features do not line up with the model's declared schema.
    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A non-finite input, feature or prediction.
    #[error("Numeric degeneracy on {date}: {detail}")]
    NumericDegeneracy { date: NaiveDate, detail: String },

    /// Duplicate or out-of-order dates.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ForecastError {
    /// Whether the error points at a deployment defect rather than at the data.
    pub fn is_deployment_defect(&self) -> bool {
        matches!(self, ForecastError::SchemaMismatch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_message() {
        let err = ForecastError::InsufficientHistory {
            required: 7,
            available: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("7 trailing days"));
        assert!(msg.contains("5 available"));
    }

    #[test]
    fn test_numeric_degeneracy_mentions_date() {
        let err = ForecastError::NumericDegeneracy {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            detail: "wind_speed is NaN".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Numeric degeneracy on 2024-03-01: wind_speed is NaN"
        );
    }

    #[test]
    fn test_schema_mismatch_is_deployment_defect() {
        assert!(ForecastError::SchemaMismatch("x".into()).is_deployment_defect());
        assert!(!ForecastError::DataUnavailable("x".into()).is_deployment_defect());
    }
}
