//! AQI Forecaster Library
//!
//! This module exposes the collector, trainer, forecaster and HTTP service
//! of the AQI forecaster for the binary, the tests and potential reuse.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod ml;
pub mod observation;
pub mod server;
pub mod service;
pub mod store;
pub mod traits;

// Re-export commonly used types
pub use api::OpenMeteoClient;
pub use config::AppConfig;
pub use data::{DataAccess, OpenMeteoSource};
pub use error::ForecastError;
pub use observation::{
    BaseField, Conditions, ForecastInput, ForecastResponse, Observation, Prediction, TodayAqi,
    report_aqi,
};
pub use service::{ForecastContext, ModelStatus};
pub use store::{HistoryStore, MergeSummary};
pub use traits::{Clock, MockClock, SystemClock};
