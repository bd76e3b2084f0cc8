//! Data access for the trainer and the forecaster.
//!
//! Historical rows come from the CSV store, forecast inputs from Open-Meteo.
//! Both sit behind [`DataAccess`] so the service can be exercised without
//! network or disk.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::info;

use crate::aggregate::hourly_to_daily;
use crate::api::OpenMeteoClient;
use crate::error::ForecastError;
use crate::observation::{ForecastInput, Observation};
use crate::store::{HistoryStore, MergeSummary};
use crate::traits::{Clock, SystemClock};

/// Source of historical rows and forecast inputs.
pub trait DataAccess: Send + Sync {
    /// The full historical table, sorted by date.
    fn history(&self) -> impl Future<Output = Result<Vec<Observation>, ForecastError>> + Send;

    /// Forecast inputs for the next `horizon_days` days, oldest first.
    fn forecast_inputs(
        &self,
        horizon_days: u32,
    ) -> impl Future<Output = Result<Vec<ForecastInput>, ForecastError>> + Send;
}

fn unavailable(context: &str, err: anyhow::Error) -> ForecastError {
    ForecastError::DataUnavailable(format!("{}: {:#}", context, err))
}

/// CSV history plus live Open-Meteo forecasts.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    store: HistoryStore,
    client: OpenMeteoClient,
    clock: Arc<dyn Clock>,
}

impl OpenMeteoSource {
    pub fn new(store: HistoryStore, client: OpenMeteoClient) -> Self {
        Self::with_clock(store, client, Arc::new(SystemClock))
    }

    pub fn with_clock(store: HistoryStore, client: OpenMeteoClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            client,
            clock,
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    async fn load_history(&self) -> Result<Vec<Observation>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .context("History load task failed")?
    }

    async fn merge_daily(&self, daily: Vec<Observation>) -> Result<MergeSummary> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.merge(&daily))
            .await
            .context("History merge task failed")?
    }

    /// Fetch the last `days` complete days and merge them into the store.
    pub async fn backfill(&self, days: u32) -> Result<MergeSummary> {
        if days == 0 {
            anyhow::bail!("Backfill needs at least one day");
        }
        let end = self.clock.now_utc().date_naive() - Duration::days(1);
        let start = end - Duration::days(i64::from(days) - 1);
        info!(%start, %end, "Backfilling history");

        let hourly = self.client.fetch_hourly_history(start, end).await?;
        let daily = hourly_to_daily(&hourly);
        info!(
            hours = hourly.len(),
            days = daily.len(),
            "Aggregated hourly history"
        );
        self.merge_daily(daily).await
    }

    /// Aggregate today's measured hours into a daily row and merge it.
    ///
    /// Returns `None` when no hour of today has been measured yet.
    pub async fn update_today(&self) -> Result<Option<MergeSummary>> {
        let hourly = self.client.fetch_today_hourly(self.clock.now_utc()).await?;
        let daily = hourly_to_daily(&hourly);
        if daily.is_empty() {
            info!("No measured hours for today yet, history not updated");
            return Ok(None);
        }
        self.merge_daily(daily).await.map(Some)
    }
}

impl DataAccess for OpenMeteoSource {
    async fn history(&self) -> Result<Vec<Observation>, ForecastError> {
        self.load_history()
            .await
            .map_err(|e| unavailable("historical data", e))
    }

    async fn forecast_inputs(&self, horizon_days: u32) -> Result<Vec<ForecastInput>, ForecastError> {
        self.client
            .fetch_forecast_inputs(horizon_days, self.clock.now_utc())
            .await
            .map_err(|e| unavailable("forecast data", e))
    }
}
