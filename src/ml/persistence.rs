//! Model persistence - save and load trained models

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::FeatureSchema;
use super::model::LinearModel;
use super::Regressor;

/// A fitted model plus the metadata needed to serve and audit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Version for backward compatibility
    pub version: u32,
    /// When the model was trained
    pub created_at: DateTime<Utc>,
    /// First and last day of the training table
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
    /// Number of rows the final model was fitted on
    pub training_samples: usize,
    pub training_mse: f64,
    /// Holdout error from the chronological validation split (if any)
    pub validation_mse: Option<f64>,
    pub summary: ModelSummary,
    /// Fitted parameters together with their feature schema
    pub model: LinearModel,
}

/// Description of the estimator behind an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Model type identifier
    pub model_type: String,
    pub penalty: f64,
    pub l1_ratio: f64,
}

impl ModelArtifact {
    /// Current version number
    pub const CURRENT_VERSION: u32 = 1;

    pub fn schema(&self) -> &FeatureSchema {
        self.model.schema()
    }

    /// Save to a file using bincode
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::IoError(e.to_string()))?;
        }

        let bytes =
            bincode::serialize(self).map_err(|e| PersistenceError::SerializeError(e.to_string()))?;

        fs::write(path, bytes).map_err(|e| PersistenceError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Load from a file, checking the version and the model's shape
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        if !path.exists() {
            return Err(PersistenceError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let bytes = fs::read(path).map_err(|e| PersistenceError::IoError(e.to_string()))?;

        let artifact: Self = bincode::deserialize(&bytes)
            .map_err(|e| PersistenceError::DeserializeError(e.to_string()))?;

        if artifact.version > Self::CURRENT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: artifact.version,
            });
        }

        artifact
            .model
            .validate()
            .map_err(|e| PersistenceError::InvalidModel(e.to_string()))?;

        Ok(artifact)
    }

    /// Get a human-readable summary
    pub fn summary_line(&self) -> String {
        format!(
            "Model v{} ({}): {} samples {}..{}, {} features, train_mse={:.2}, val_mse={}, created {}",
            self.version,
            self.summary.model_type,
            self.training_samples,
            self.training_start,
            self.training_end,
            self.schema().len(),
            self.training_mse,
            self.validation_mse
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "N/A".to_string()),
            self.created_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Modification time of a model file, used as the "last updated" signal.
pub fn model_modified_at(path: &Path) -> Result<DateTime<Utc>, PersistenceError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            PersistenceError::FileNotFound(path.to_string_lossy().to_string())
        }
        _ => PersistenceError::IoError(e.to_string()),
    })?;
    let modified = metadata
        .modified()
        .map_err(|e| PersistenceError::IoError(e.to_string()))?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Errors that can occur during model persistence
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistenceError {
    #[error("Model file not found: {0}")]
    FileNotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializeError(String),
    #[error("Deserialization error: {0}")]
    DeserializeError(String),
    #[error("Model version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}
