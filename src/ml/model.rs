//! Regression models for AQI prediction

use linfa::prelude::*;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{AlignedFeatures, FeatureSchema};
use crate::error::ForecastError;

/// A fitted model the forecaster can query.
///
/// Implementations own their feature schema and must reject rows that were
/// aligned against any other schema.
pub trait Regressor: Send + Sync {
    /// Ordered features the model was trained on.
    fn schema(&self) -> &FeatureSchema;

    /// Predict the AQI for one aligned feature row.
    fn predict(&self, features: &AlignedFeatures) -> Result<f64, ForecastError>;
}

/// Ridge / elastic-net regression over standardized features.
///
/// Parameters are kept as plain vectors so the model can be persisted and
/// evaluated without the fitting library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    schema: FeatureSchema,
    means: Vec<f64>,
    scales: Vec<f64>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Assemble a model from raw parameters, checking their shapes against the schema.
    pub fn from_parameters(
        schema: FeatureSchema,
        means: Vec<f64>,
        scales: Vec<f64>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self, ForecastError> {
        let model = Self {
            schema,
            means,
            scales,
            coefficients,
            intercept,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check that every parameter vector has one entry per schema feature.
    pub fn validate(&self) -> Result<(), ForecastError> {
        let expected = self.schema.len();
        for (label, len) in [
            ("coefficients", self.coefficients.len()),
            ("means", self.means.len()),
            ("scales", self.scales.len()),
        ] {
            if len != expected {
                return Err(ForecastError::SchemaMismatch(format!(
                    "model has {} {} for {} schema features",
                    len, label, expected
                )));
            }
        }
        if !self.intercept.is_finite()
            || self
                .coefficients
                .iter()
                .chain(&self.means)
                .chain(&self.scales)
                .any(|v| !v.is_finite())
        {
            return Err(ForecastError::SchemaMismatch(
                "model parameters contain non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Predict for a raw row already in schema order.
    fn predict_row(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.coefficients)
            .map(|(((x, mean), scale), coef)| coef * (x - mean) / scale)
            .sum::<f64>()
            + self.intercept
    }

    /// Predict every row of a feature matrix laid out in schema order.
    pub fn predict_matrix(&self, features: &Array2<f64>) -> Vec<f64> {
        features
            .rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(slice) => self.predict_row(slice),
                None => self.predict_row(&row.to_vec()),
            })
            .collect()
    }
}

impl Regressor for LinearModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, features: &AlignedFeatures) -> Result<f64, ForecastError> {
        if features.features() != self.schema.features() {
            return Err(ForecastError::SchemaMismatch(format!(
                "row has features [{}], model expects [{}]",
                features.names().join(", "),
                self.schema.names().join(", ")
            )));
        }
        Ok(self.predict_row(features.values()))
    }
}

/// Builder for fitting a [`LinearModel`]
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    penalty: f64,
    l1_ratio: f64,
    max_iterations: u32,
    tolerance: f64,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self {
            penalty: 0.1,
            l1_ratio: 0.0,
            max_iterations: 5000,
            tolerance: 1e-6,
        }
    }
}

impl ModelBuilder {
    /// Create a new model builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Overall regularization strength
    pub fn penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    /// Share of L1 in the penalty; 0 is pure ridge
    pub fn l1_ratio(mut self, l1_ratio: f64) -> Self {
        self.l1_ratio = l1_ratio;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn penalty_value(&self) -> f64 {
        self.penalty
    }

    pub fn l1_ratio_value(&self) -> f64 {
        self.l1_ratio
    }

    pub fn max_iterations_value(&self) -> u32 {
        self.max_iterations
    }

    pub fn tolerance_value(&self) -> f64 {
        self.tolerance
    }

    /// Fit a model on rows laid out in `schema` order.
    pub fn fit(
        &self,
        schema: &FeatureSchema,
        features: &Array2<f64>,
        targets: &Array1<f64>,
    ) -> Result<LinearModel, TrainingError> {
        let n_samples = features.nrows();
        if n_samples == 0 || targets.is_empty() {
            return Err(TrainingError::InsufficientData(0));
        }

        if n_samples != targets.len() {
            return Err(TrainingError::MismatchedLengths {
                features: n_samples,
                targets: targets.len(),
            });
        }

        if features.ncols() != schema.len() {
            return Err(TrainingError::SchemaWidth {
                columns: features.ncols(),
                schema: schema.len(),
            });
        }

        let means = features
            .mean_axis(Axis(0))
            .ok_or(TrainingError::InsufficientData(n_samples))?;
        // Constant columns keep a unit scale so they standardize to zero.
        let scales = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        let standardized = (features - &means) / &scales;

        let dataset = Dataset::new(standardized, targets.clone());

        let fitted = ElasticNet::params()
            .penalty(self.penalty)
            .l1_ratio(self.l1_ratio)
            .max_iterations(self.max_iterations)
            .tolerance(self.tolerance)
            .with_intercept(true)
            .fit(&dataset)
            .map_err(|e| TrainingError::FitError(e.to_string()))?;

        LinearModel::from_parameters(
            schema.clone(),
            means.to_vec(),
            scales.to_vec(),
            fitted.hyperplane().to_vec(),
            fitted.intercept(),
        )
        .map_err(|e| TrainingError::FitError(e.to_string()))
    }
}

/// Calculate mean squared error
pub fn calculate_mse(predictions: &[f64], targets: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return f64::MAX;
    }

    let sum_sq_error: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum();

    sum_sq_error / predictions.len() as f64
}

/// Errors that can occur during model training
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("Insufficient data for training: {0} samples")]
    InsufficientData(usize),
    #[error("Feature and target lengths mismatch: {features} vs {targets}")]
    MismatchedLengths { features: usize, targets: usize },
    #[error("Feature matrix has {columns} columns but the schema has {schema} features")]
    SchemaWidth { columns: usize, schema: usize },
    #[error("Invalid training table: {0}")]
    InvalidData(String),
    #[error("Model fitting error: {0}")]
    FitError(String),
    #[error(transparent)]
    Data(#[from] ForecastError),
}
