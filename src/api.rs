use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::aggregate::{HourlyRecord, summarize_days};
use crate::config::{LocationConfig, NetworkConfig, OpenMeteoConfig};
use crate::observation::{BaseField, Conditions, ForecastInput};

const AIR_QUALITY_HOURLY: &str = "pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,us_aqi";
const POLLUTANTS_HOURLY: &str = "pm10,pm2_5,carbon_monoxide,nitrogen_dioxide";
const WEATHER_HOURLY: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m";
const WEATHER_DAILY: &str = "temperature_2m_mean,relative_humidity_2m_mean,wind_speed_10m_mean";

/// Hourly air-quality block. Open-Meteo reports gaps as `null`.
#[derive(Debug, Deserialize)]
pub struct AirQualityHourly {
    pub time: Vec<String>,
    pub pm10: Vec<Option<f64>>,
    pub pm2_5: Vec<Option<f64>>,
    pub carbon_monoxide: Vec<Option<f64>>,
    pub nitrogen_dioxide: Vec<Option<f64>>,
    #[serde(default)]
    pub us_aqi: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherHourly {
    pub time: Vec<String>,
    pub temperature_2m: Vec<Option<f64>>,
    pub relative_humidity_2m: Vec<Option<f64>>,
    pub wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherDaily {
    pub time: Vec<String>,
    pub temperature_2m_mean: Vec<Option<f64>>,
    pub relative_humidity_2m_mean: Vec<Option<f64>>,
    pub wind_speed_10m_mean: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct HourlyResponse<T> {
    #[serde(default)]
    utc_offset_seconds: i64,
    hourly: T,
}

#[derive(Debug, Deserialize)]
struct DailyResponse<T> {
    #[serde(default)]
    utc_offset_seconds: i64,
    daily: T,
}

/// API client for the Open-Meteo air-quality, forecast and archive endpoints.
#[derive(Clone, Debug)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    endpoints: OpenMeteoConfig,
    location: LocationConfig,
}

impl OpenMeteoClient {
    /// Create a new API client with configurable timeouts.
    pub fn new(
        endpoints: OpenMeteoConfig,
        location: LocationConfig,
        network_config: &NetworkConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoints,
            location,
        })
    }

    fn params(&self, extra: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("latitude", self.location.latitude.to_string()),
            ("longitude", self.location.longitude.to_string()),
            ("timezone", self.location.timezone.clone()),
        ];
        params.extend(extra);
        params
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        base: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = Url::parse_with_params(base, params)
            .with_context(|| format!("Invalid {} URL: {}", what, base))?;
        debug!(%url, "Requesting {}", what);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{} API returned error status: {}", what, status);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Measured hourly data for a closed date range (air quality + weather archive).
    pub async fn fetch_hourly_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HourlyRecord>> {
        if end < start {
            anyhow::bail!("Invalid date range: {} is after {}", start, end);
        }
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let air: HourlyResponse<AirQualityHourly> = self
            .get_json(
                &self.endpoints.air_quality_url,
                &self.params(vec![
                    ("start_date", start.clone()),
                    ("end_date", end.clone()),
                    ("hourly", AIR_QUALITY_HOURLY.to_string()),
                ]),
                "air quality",
            )
            .await?;
        let weather: HourlyResponse<WeatherHourly> = self
            .get_json(
                &self.endpoints.archive_url,
                &self.params(vec![
                    ("start_date", start),
                    ("end_date", end),
                    ("hourly", WEATHER_HOURLY.to_string()),
                ]),
                "weather archive",
            )
            .await?;

        merge_hourly(&air.hourly, &weather.hourly)
    }

    /// Today's hourly data, keeping only hours that have already happened.
    pub async fn fetch_today_hourly(&self, now: DateTime<Utc>) -> Result<Vec<HourlyRecord>> {
        let air: HourlyResponse<AirQualityHourly> = self
            .get_json(
                &self.endpoints.air_quality_url,
                &self.params(vec![
                    ("forecast_days", "1".to_string()),
                    ("hourly", AIR_QUALITY_HOURLY.to_string()),
                ]),
                "air quality",
            )
            .await?;
        let weather: HourlyResponse<WeatherHourly> = self
            .get_json(
                &self.endpoints.forecast_url,
                &self.params(vec![
                    ("forecast_days", "1".to_string()),
                    ("hourly", WEATHER_HOURLY.to_string()),
                ]),
                "weather forecast",
            )
            .await?;

        let local_now = now.naive_utc() + chrono::Duration::seconds(weather.utc_offset_seconds);
        let records = merge_hourly(&air.hourly, &weather.hourly)?;
        let measured: Vec<HourlyRecord> = records
            .into_iter()
            .filter(|record| record.time <= local_now)
            .collect();

        debug!(%local_now, hours = measured.len(), "Kept measured hours");
        Ok(measured)
    }

    /// Daily forecast inputs for the `horizon_days` days after today.
    ///
    /// Weather comes from the daily means, pollutants from the daily mean of
    /// the hourly forecast. Missing values become NaN and are logged. "Today"
    /// is the location's local date at `now`.
    pub async fn fetch_forecast_inputs(
        &self,
        horizon_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<ForecastInput>> {
        let days = (horizon_days + 1).to_string();

        let weather: DailyResponse<WeatherDaily> = self
            .get_json(
                &self.endpoints.forecast_url,
                &self.params(vec![
                    ("forecast_days", days.clone()),
                    ("daily", WEATHER_DAILY.to_string()),
                ]),
                "weather forecast",
            )
            .await?;
        let air: HourlyResponse<AirQualityHourly> = self
            .get_json(
                &self.endpoints.air_quality_url,
                &self.params(vec![
                    ("forecast_days", days),
                    ("hourly", POLLUTANTS_HOURLY.to_string()),
                ]),
                "air quality forecast",
            )
            .await?;

        let local_today =
            (now.naive_utc() + chrono::Duration::seconds(weather.utc_offset_seconds)).date();
        let inputs = forecast_inputs(&weather.daily, &air.hourly)?;
        Ok(inputs
            .into_iter()
            .filter(|input| input.date > local_today)
            .take(horizon_days as usize)
            .collect())
    }
}

fn parse_hour(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("Invalid hourly timestamp '{}'", value))
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid daily timestamp '{}'", value))
}

fn check_len(label: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        anyhow::bail!(
            "Column '{}' has {} values for {} timestamps",
            label,
            len,
            expected
        );
    }
    Ok(())
}

fn value_at(column: &[Option<f64>], i: usize) -> Option<f64> {
    column.get(i).copied().flatten()
}

/// Inner join of air-quality and weather hours on their timestamp.
pub fn merge_hourly(air: &AirQualityHourly, weather: &WeatherHourly) -> Result<Vec<HourlyRecord>> {
    let n = air.time.len();
    for (label, len) in [
        ("pm10", air.pm10.len()),
        ("pm2_5", air.pm2_5.len()),
        ("carbon_monoxide", air.carbon_monoxide.len()),
        ("nitrogen_dioxide", air.nitrogen_dioxide.len()),
    ] {
        check_len(label, len, n)?;
    }
    if !air.us_aqi.is_empty() {
        check_len("us_aqi", air.us_aqi.len(), n)?;
    }
    let m = weather.time.len();
    for (label, len) in [
        ("temperature_2m", weather.temperature_2m.len()),
        ("relative_humidity_2m", weather.relative_humidity_2m.len()),
        ("wind_speed_10m", weather.wind_speed_10m.len()),
    ] {
        check_len(label, len, m)?;
    }

    let mut weather_by_time = HashMap::with_capacity(m);
    for (i, time) in weather.time.iter().enumerate() {
        weather_by_time.insert(parse_hour(time)?, i);
    }

    let mut records = Vec::with_capacity(n);
    for (i, time) in air.time.iter().enumerate() {
        let time = parse_hour(time)?;
        let Some(&j) = weather_by_time.get(&time) else {
            continue;
        };
        records.push(HourlyRecord {
            time,
            aqi: value_at(&air.us_aqi, i),
            pm25: value_at(&air.pm2_5, i),
            pm10: value_at(&air.pm10, i),
            carbon_monoxide: value_at(&air.carbon_monoxide, i),
            nitrogen_dioxide: value_at(&air.nitrogen_dioxide, i),
            temperature: value_at(&weather.temperature_2m, j),
            humidity: value_at(&weather.relative_humidity_2m, j),
            wind_speed: value_at(&weather.wind_speed_10m, j),
        });
    }

    if records.len() < n {
        debug!(
            air_hours = n,
            joined = records.len(),
            "Dropped air-quality hours without weather"
        );
    }
    Ok(records)
}

/// Join daily weather means with daily pollutant means, oldest first.
pub fn forecast_inputs(
    weather: &WeatherDaily,
    pollutants: &AirQualityHourly,
) -> Result<Vec<ForecastInput>> {
    let n = weather.time.len();
    for (label, len) in [
        ("temperature_2m_mean", weather.temperature_2m_mean.len()),
        ("relative_humidity_2m_mean", weather.relative_humidity_2m_mean.len()),
        ("wind_speed_10m_mean", weather.wind_speed_10m_mean.len()),
    ] {
        check_len(label, len, n)?;
    }

    let hourly = WeatherHourly {
        time: pollutants.time.clone(),
        temperature_2m: vec![None; pollutants.time.len()],
        relative_humidity_2m: vec![None; pollutants.time.len()],
        wind_speed_10m: vec![None; pollutants.time.len()],
    };
    let pollutant_days: HashMap<NaiveDate, _> = summarize_days(&merge_hourly(pollutants, &hourly)?)
        .into_iter()
        .map(|summary| (summary.date, summary))
        .collect();

    let mut inputs = Vec::with_capacity(n);
    for (i, day) in weather.time.iter().enumerate() {
        let date = parse_day(day)?;
        let Some(summary) = pollutant_days.get(&date) else {
            warn!(%date, "No pollutant forecast for day, dropping it");
            continue;
        };

        let conditions = Conditions::from_fn(|field| {
            let value = match field {
                BaseField::Temperature => value_at(&weather.temperature_2m_mean, i),
                BaseField::Humidity => value_at(&weather.relative_humidity_2m_mean, i),
                BaseField::WindSpeed => value_at(&weather.wind_speed_10m_mean, i),
                pollutant => summary.mean(pollutant),
            };
            value.unwrap_or_else(|| {
                warn!(%date, %field, "Missing forecast value");
                f64::NAN
            })
        });
        inputs.push(ForecastInput::new(date, conditions));
    }
    Ok(inputs)
}
