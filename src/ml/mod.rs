//! Machine learning for multi-day AQI forecasting
//!
//! The feature engine is shared by training and inference. A ridge model is
//! fitted over the canonical feature schema and persisted together with it;
//! the forecaster then rolls the model forward one day at a time.

pub mod features;
pub mod forecaster;
pub mod model;
pub mod persistence;
pub mod training;

pub use features::{
    AlignedFeatures, Feature, FeatureEngine, FeatureSchema, FeatureVector, REQUIRED_HISTORY,
};
pub use forecaster::{ForecastRun, ForecastStep, Forecaster};
pub use model::{LinearModel, ModelBuilder, Regressor, TrainingError};
pub use persistence::{ModelArtifact, ModelSummary, PersistenceError};
pub use training::{Trainer, TrainingConfig, TrainingSet, build_training_set};
