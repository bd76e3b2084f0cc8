//! Autoregressive multi-day forecasting
//!
//! Each forecast day is featurized from the history accumulated so far,
//! predicted, and then appended to that history with its unrounded
//! prediction standing in for the unknown AQI. Day N+1 therefore sees day N's
//! simulated value as `aqi_lag_1`.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::features::{AlignedFeatures, FeatureEngine, REQUIRED_HISTORY, trailing_known_aqi};
use super::model::Regressor;
use crate::error::ForecastError;
use crate::observation::{ForecastInput, Observation, Prediction, report_aqi};

/// One predicted day together with the exact row the model saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastStep {
    pub date: NaiveDate,
    /// Unrounded model output, as fed back into the history.
    pub raw_aqi: f64,
    pub features: AlignedFeatures,
}

/// Output of a forecast run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRun {
    pub predictions: Vec<Prediction>,
    pub steps: Vec<ForecastStep>,
    /// The history window extended with one simulated row per forecast day.
    pub live_history: Vec<Observation>,
}

/// Runs the autoregressive loop against a fitted model.
pub struct Forecaster<'m, M: Regressor + ?Sized> {
    model: &'m M,
    engine: FeatureEngine,
}

impl<'m, M: Regressor + ?Sized> Forecaster<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            engine: FeatureEngine::new(),
        }
    }

    /// Predict one AQI per input row, in date order.
    ///
    /// `history` is copied, never modified. Inputs must be strictly
    /// increasing and start after the last history day.
    pub fn run(
        &self,
        history: &[Observation],
        inputs: &[ForecastInput],
    ) -> Result<ForecastRun, ForecastError> {
        validate_history(history)?;
        validate_inputs(history, inputs)?;

        let available = trailing_known_aqi(history);
        if available < REQUIRED_HISTORY {
            return Err(ForecastError::InsufficientHistory {
                required: REQUIRED_HISTORY,
                available,
            });
        }

        let schema = self.model.schema();
        let mut live_history = history.to_vec();
        let mut predictions = Vec::with_capacity(inputs.len());
        let mut steps = Vec::with_capacity(inputs.len());

        for input in inputs {
            if let Some(field) = input.conditions.first_non_finite() {
                return Err(ForecastError::NumericDegeneracy {
                    date: input.date,
                    detail: format!(
                        "forecast input {} is {}",
                        field,
                        input.conditions.get(field)
                    ),
                });
            }

            let vector = self
                .engine
                .featurize(&live_history, input.date, &input.conditions)?;
            let aligned = schema.align(&vector)?;
            let raw_aqi = self.model.predict(&aligned)?;

            if !raw_aqi.is_finite() {
                return Err(ForecastError::NumericDegeneracy {
                    date: input.date,
                    detail: format!("model predicted {}", raw_aqi),
                });
            }

            let predicted_aqi = report_aqi(raw_aqi);
            debug!(
                date = %input.date,
                raw_aqi,
                predicted_aqi,
                "Forecast step"
            );

            live_history.push(input.with_aqi(raw_aqi));
            predictions.push(Prediction {
                date: input.date,
                predicted_aqi,
            });
            steps.push(ForecastStep {
                date: input.date,
                raw_aqi,
                features: aligned,
            });
        }

        Ok(ForecastRun {
            predictions,
            steps,
            live_history,
        })
    }
}

fn validate_history(history: &[Observation]) -> Result<(), ForecastError> {
    for pair in history.windows(2) {
        let (prev, next) = (pair[0].date, pair[1].date);
        if next <= prev {
            return Err(ForecastError::InvalidInput(format!(
                "history dates must be strictly increasing, found {} after {}",
                next, prev
            )));
        }
        if (next - prev).num_days() > 1 {
            warn!(from = %prev, to = %next, "Gap in history window");
        }
    }
    Ok(())
}

fn validate_inputs(
    history: &[Observation],
    inputs: &[ForecastInput],
) -> Result<(), ForecastError> {
    let mut previous = history.last().map(|obs| obs.date);
    for input in inputs {
        if let Some(prev) = previous {
            if input.date <= prev {
                return Err(ForecastError::InvalidInput(format!(
                    "forecast input {} does not follow {}",
                    input.date, prev
                )));
            }
            if (input.date - prev).num_days() > 1 {
                warn!(from = %prev, to = %input.date, "Gap before forecast input");
            }
        }
        previous = Some(input.date);
    }
    Ok(())
}
