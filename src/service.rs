//! Forecast generation shared by the CLI and the HTTP server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ForecastConfig;
use crate::data::DataAccess;
use crate::error::ForecastError;
use crate::ml::persistence::{PersistenceError, model_modified_at};
use crate::ml::{Forecaster, Regressor};
use crate::observation::{ForecastResponse, Observation, TodayAqi, report_aqi};

/// Body of the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub status: &'static str,
    pub model_last_updated_utc: DateTime<Utc>,
}

/// Everything a forecast request needs, loaded once and shared read-only.
pub struct ForecastContext<D> {
    model: Arc<dyn Regressor>,
    data: Arc<D>,
    settings: ForecastConfig,
    model_path: PathBuf,
}

impl<D> Clone for ForecastContext<D> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            data: Arc::clone(&self.data),
            settings: self.settings.clone(),
            model_path: self.model_path.clone(),
        }
    }
}

impl<D: DataAccess> ForecastContext<D> {
    pub fn new(
        model: Arc<dyn Regressor>,
        data: Arc<D>,
        settings: ForecastConfig,
        model_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            model,
            data,
            settings,
            model_path: model_path.into(),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Latest known AQI plus a forecast for the configured horizon.
    pub async fn generate_response(&self) -> Result<ForecastResponse, ForecastError> {
        let result = self.forecast().await;
        if let Err(e) = &result {
            if e.is_deployment_defect() {
                error!("Forecast failed: {}", e);
            } else {
                warn!("Forecast failed: {}", e);
            }
        }
        result
    }

    async fn forecast(&self) -> Result<ForecastResponse, ForecastError> {
        let history = self.data.history().await?;
        if history.is_empty() {
            return Err(ForecastError::DataUnavailable(
                "historical table is empty".to_string(),
            ));
        }
        let today = latest_known_aqi(&history);

        let inputs = self
            .data
            .forecast_inputs(self.settings.horizon_days)
            .await?;
        if inputs.is_empty() {
            return Err(ForecastError::DataUnavailable(
                "no forecast input days returned".to_string(),
            ));
        }

        let window_start = history
            .len()
            .saturating_sub(self.settings.history_window_days);
        let window = &history[window_start..];

        let run = Forecaster::new(self.model.as_ref()).run(window, &inputs)?;
        info!(
            history_rows = window.len(),
            days = run.predictions.len(),
            "Generated forecast"
        );

        Ok(ForecastResponse {
            today,
            forecast: run.predictions,
        })
    }

    /// Status of the service and the model artifact's modification time.
    pub fn status(&self) -> Result<ModelStatus, PersistenceError> {
        Ok(ModelStatus {
            status: "online",
            model_last_updated_utc: model_modified_at(&self.model_path)?,
        })
    }
}

/// Most recent row with a known AQI, rounded for reporting.
pub fn latest_known_aqi(history: &[Observation]) -> Option<TodayAqi> {
    history.iter().rev().find_map(|obs| {
        obs.known_aqi().map(|aqi| TodayAqi {
            date: obs.date,
            aqi: report_aqi(aqi),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Conditions;
    use chrono::NaiveDate;

    #[test]
    fn test_latest_known_aqi_skips_missing() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 12, d).unwrap();
        let history = vec![
            Observation::new(day(1), Some(151.5), Conditions::default()),
            Observation::new(day(2), Some(160.4), Conditions::default()),
            Observation::new(day(3), None, Conditions::default()),
        ];

        assert_eq!(
            latest_known_aqi(&history),
            Some(TodayAqi {
                date: day(2),
                aqi: 160
            })
        );
        assert_eq!(latest_known_aqi(&history[..1]).map(|t| t.aqi), Some(152));
        assert_eq!(latest_known_aqi(&[]), None);
    }

    #[test]
    fn test_status_serializes_like_the_api() {
        let status = ModelStatus {
            status: "online",
            model_last_updated_utc: DateTime::parse_from_rfc3339("2024-12-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "online");
        assert_eq!(json["model_last_updated_utc"], "2024-12-01T08:30:00Z");
    }
}
