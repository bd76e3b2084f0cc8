use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::ml::TrainingConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub location: LocationConfig,
    pub data: DataConfig,
    pub network: NetworkConfig,
    pub open_meteo: OpenMeteoConfig,
    pub forecast: ForecastConfig,
    pub training: TrainingSettings,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA zone name passed to Open-Meteo so days align with local midnight
    pub timezone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: 24.86,
            longitude: 67.01,
            timezone: "Asia/Karachi".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub historical_csv: PathBuf,
    pub model_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            historical_csv: PathBuf::from("data/karachi_daily_data_5_years.csv"),
            model_path: PathBuf::from("models/aqi_model.bin"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenMeteoConfig {
    pub air_quality_url: String,
    pub forecast_url: String,
    pub archive_url: String,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            air_quality_url: "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    /// Number of future days to predict
    pub horizon_days: u32,
    /// Trailing historical days handed to the forecaster (at least 7)
    pub history_window_days: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: 3,
            history_window_days: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingSettings {
    pub validation_split: f64,
    pub penalty: f64,
    pub l1_ratio: f64,
    pub min_samples: usize,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        let defaults = TrainingConfig::default();
        Self {
            validation_split: defaults.validation_split,
            penalty: defaults.penalty,
            l1_ratio: defaults.l1_ratio,
            min_samples: defaults.min_samples,
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
        }
    }
}

impl From<&TrainingSettings> for TrainingConfig {
    fn from(settings: &TrainingSettings) -> Self {
        Self {
            validation_split: settings.validation_split,
            penalty: settings.penalty,
            l1_ratio: settings.l1_ratio,
            min_samples: settings.min_samples,
            max_iterations: settings.max_iterations,
            tolerance: settings.tolerance,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // Load .env file (silently ignore if not present - production uses env vars directly)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aqi-forecaster");

        let location = LocationConfig::default();
        let data = DataConfig::default();
        let network = NetworkConfig::default();
        let open_meteo = OpenMeteoConfig::default();
        let forecast = ForecastConfig::default();
        let training = TrainingSettings::default();
        let server = ServerConfig::default();

        let builder = Config::builder()
            // 1. Load default values
            // Location
            .set_default("location.latitude", location.latitude)?
            .set_default("location.longitude", location.longitude)?
            .set_default("location.timezone", location.timezone)?
            // Data
            .set_default("data.historical_csv", data.historical_csv.to_string_lossy().to_string())?
            .set_default("data.model_path", data.model_path.to_string_lossy().to_string())?
            // Network
            .set_default("network.request_timeout_secs", network.request_timeout_secs)?
            .set_default("network.connect_timeout_secs", network.connect_timeout_secs)?
            // Open-Meteo
            .set_default("open_meteo.air_quality_url", open_meteo.air_quality_url)?
            .set_default("open_meteo.forecast_url", open_meteo.forecast_url)?
            .set_default("open_meteo.archive_url", open_meteo.archive_url)?
            // Forecast
            .set_default("forecast.horizon_days", forecast.horizon_days)?
            .set_default("forecast.history_window_days", forecast.history_window_days as u64)?
            // Training
            .set_default("training.validation_split", training.validation_split)?
            .set_default("training.penalty", training.penalty)?
            .set_default("training.l1_ratio", training.l1_ratio)?
            .set_default("training.min_samples", training.min_samples as u64)?
            .set_default("training.max_iterations", u64::from(training.max_iterations))?
            .set_default("training.tolerance", training.tolerance)?
            // Server
            .set_default("server.bind_address", server.bind_address)?
            .set_default("server.allowed_origins", server.allowed_origins)?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false))

            // 4. Load from Environment variables (AQI__FORECAST__HORIZON_DAYS=...)
            .add_source(
                Environment::with_prefix("AQI")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("server.allowed_origins")
                    .try_parsing(true),
            );

        let s = builder.build()?;
        let config: Self = s
            .try_deserialize()
            .context("Invalid configuration values")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the forecaster cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.forecast.history_window_days < crate::ml::REQUIRED_HISTORY {
            anyhow::bail!(
                "forecast.history_window_days must be at least {}, got {}",
                crate::ml::REQUIRED_HISTORY,
                self.forecast.history_window_days
            );
        }
        if self.forecast.horizon_days == 0 {
            anyhow::bail!("forecast.horizon_days must be positive");
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            anyhow::bail!(
                "training.validation_split must be in [0, 1), got {}",
                self.training.validation_split
            );
        }
        Ok(())
    }
}
