//! Training pipeline for AQI models

use chrono::NaiveDate;
use ndarray::{Array1, Array2, s};
use tracing::{debug, info};

use crate::data::DataAccess;
use crate::error::ForecastError;
use crate::observation::Observation;
use crate::traits::Clock;

use super::features::{FeatureEngine, FeatureSchema};
use super::model::{ModelBuilder, TrainingError, calculate_mse};
use super::persistence::{ModelArtifact, ModelSummary};

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Share of the most recent rows held out for validation
    pub validation_split: f64,
    pub penalty: f64,
    pub l1_ratio: f64,
    /// Minimum number of usable rows required before fitting
    pub min_samples: usize,
    /// Coordinate-descent limits for the solver
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            validation_split: 0.2,
            penalty: 0.1,
            l1_ratio: 0.0,
            min_samples: 30,
            max_iterations: 5000,
            tolerance: 1e-6,
        }
    }
}

/// Feature matrix built from a historical table, in schema order.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub dates: Vec<NaiveDate>,
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
    /// Rows dropped for short history, unknown target or non-finite features
    pub skipped: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Featurize every row of `table` and align it to `schema`.
///
/// The table must be sorted by strictly increasing date. Rows that cannot be
/// featurized are skipped; a schema the engine cannot satisfy is an error.
pub fn build_training_set(
    table: &[Observation],
    schema: &FeatureSchema,
) -> Result<TrainingSet, TrainingError> {
    if let Some(pair) = table.windows(2).find(|pair| pair[1].date <= pair[0].date) {
        return Err(TrainingError::InvalidData(format!(
            "dates must be strictly increasing, found {} after {}",
            pair[1].date, pair[0].date
        )));
    }

    let engine = FeatureEngine::new();
    let mut dates = Vec::with_capacity(table.len());
    let mut flat = Vec::with_capacity(table.len() * schema.len());
    let mut targets = Vec::with_capacity(table.len());
    let mut skipped = 0;

    for (index, row) in table.iter().enumerate() {
        let Some(target) = row.known_aqi() else {
            skipped += 1;
            continue;
        };

        let aligned = match engine
            .featurize_row(table, index)
            .and_then(|vector| schema.align(&vector))
        {
            Ok(aligned) => aligned,
            Err(ForecastError::SchemaMismatch(msg)) => {
                return Err(TrainingError::InvalidData(msg));
            }
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        dates.push(row.date);
        flat.extend_from_slice(aligned.values());
        targets.push(target);
    }

    let features = Array2::from_shape_vec((targets.len(), schema.len()), flat)
        .map_err(|e| TrainingError::InvalidData(e.to_string()))?;

    Ok(TrainingSet {
        dates,
        features,
        targets: Array1::from_vec(targets),
        skipped,
    })
}

/// Fits models on historical tables against a fixed schema
pub struct Trainer {
    config: TrainingConfig,
    schema: FeatureSchema,
}

impl Trainer {
    /// Create a trainer for the canonical schema
    pub fn new(config: TrainingConfig) -> Self {
        Self::with_schema(config, FeatureSchema::canonical())
    }

    pub fn with_schema(config: TrainingConfig, schema: FeatureSchema) -> Self {
        Self { config, schema }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn builder(&self) -> ModelBuilder {
        ModelBuilder::new()
            .penalty(self.config.penalty)
            .l1_ratio(self.config.l1_ratio)
            .max_iterations(self.config.max_iterations)
            .tolerance(self.config.tolerance)
    }

    /// Train on the full historical table served by `source`.
    pub async fn train_from<D: DataAccess>(
        &self,
        source: &D,
        clock: &dyn Clock,
    ) -> Result<ModelArtifact, TrainingError> {
        let table = source.history().await?;
        info!(rows = table.len(), "Loaded training table");
        self.train(&table, clock)
    }

    /// Build the training set, score a chronological holdout, then refit on everything.
    pub fn train(
        &self,
        table: &[Observation],
        clock: &dyn Clock,
    ) -> Result<ModelArtifact, TrainingError> {
        let set = build_training_set(table, &self.schema)?;
        info!(
            rows = table.len(),
            samples = set.len(),
            skipped = set.skipped,
            "Built training set"
        );

        if set.len() < self.config.min_samples.max(1) {
            return Err(TrainingError::InsufficientData(set.len()));
        }

        let builder = self.builder();
        let validation_mse = self.validate(&builder, &set)?;

        let model = builder.fit(&self.schema, &set.features, &set.targets)?;
        let predictions = model.predict_matrix(&set.features);
        let training_mse = calculate_mse(&predictions, &set.targets.to_vec());

        let (Some(first), Some(last)) = (set.dates.first(), set.dates.last()) else {
            return Err(TrainingError::InsufficientData(0));
        };

        let artifact = ModelArtifact {
            version: ModelArtifact::CURRENT_VERSION,
            created_at: clock.now_utc(),
            training_start: *first,
            training_end: *last,
            training_samples: set.len(),
            training_mse,
            validation_mse,
            summary: ModelSummary {
                model_type: if self.config.l1_ratio == 0.0 {
                    "Ridge".to_string()
                } else {
                    "ElasticNet".to_string()
                },
                penalty: self.config.penalty,
                l1_ratio: self.config.l1_ratio,
            },
            model,
        };

        info!("{}", artifact.summary_line());
        Ok(artifact)
    }

    /// Holdout MSE on the newest rows, or `None` when the split leaves nothing to score.
    fn validate(
        &self,
        builder: &ModelBuilder,
        set: &TrainingSet,
    ) -> Result<Option<f64>, TrainingError> {
        let split = self.config.validation_split;
        if !(split > 0.0 && split < 1.0) {
            return Ok(None);
        }

        let split_idx = ((1.0 - split) * set.len() as f64) as usize;
        if split_idx < 2 || split_idx >= set.len() {
            debug!(samples = set.len(), "Too few rows for a validation split");
            return Ok(None);
        }

        let model = builder.fit(
            &self.schema,
            &set.features.slice(s![..split_idx, ..]).to_owned(),
            &set.targets.slice(s![..split_idx]).to_owned(),
        )?;
        let predictions = model.predict_matrix(&set.features.slice(s![split_idx.., ..]).to_owned());
        let mse = calculate_mse(&predictions, &set.targets.slice(s![split_idx..]).to_vec());
        debug!(
            train = split_idx,
            holdout = set.len() - split_idx,
            mse,
            "Validation split"
        );
        Ok(Some(mse))
    }
}
