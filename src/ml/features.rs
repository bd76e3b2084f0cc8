//! Feature engineering for AQI models
//!
//! The same kernel builds training rows and inference rows, so the two can
//! never drift apart. A day is featurized from its own forecast/observed
//! conditions plus the rows strictly before it; the day's own AQI is never
//! read.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ForecastError;
use crate::observation::{BaseField, Conditions, Observation};

/// Number of AQI lag features.
pub const LAG_DAYS: usize = 7;

/// Trailing window sizes for rolling statistics.
pub const ROLLING_WINDOWS: [usize; 2] = [3, 7];

/// Series that get rolling statistics, in feature order.
pub const ROLLING_SERIES: [Series; 5] = [
    Series::Aqi,
    Series::Base(BaseField::Pm25),
    Series::Base(BaseField::CarbonMonoxide),
    Series::Base(BaseField::WindSpeed),
    Series::Base(BaseField::Humidity),
];

/// Prior rows with a known AQI needed to featurize a day.
pub const REQUIRED_HISTORY: usize = 7;

/// A daily series that rolling statistics can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    Aqi,
    Base(BaseField),
}

impl Series {
    pub fn name(self) -> &'static str {
        match self {
            Series::Aqi => "aqi",
            Series::Base(field) => field.name(),
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        if name == "aqi" {
            Some(Series::Aqi)
        } else {
            BaseField::from_name(name).map(Series::Base)
        }
    }

    /// Value of this series on a row. A missing AQI reads as NaN, which
    /// alignment rejects.
    fn value(self, obs: &Observation) -> f64 {
        match self {
            Series::Aqi => obs.aqi.unwrap_or(f64::NAN),
            Series::Base(field) => obs.conditions.get(field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistic {
    Mean,
    Std,
}

impl Statistic {
    fn name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Std => "std",
        }
    }
}

/// A single named model input.
///
/// Serialized as its column name, e.g. `aqi_lag_3` or `pm25_rolling_std_7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Feature {
    Base(BaseField),
    AqiLag(usize),
    Month,
    DayOfYear,
    DayOfWeek,
    Rolling {
        series: Series,
        statistic: Statistic,
        window: usize,
    },
    Pm25WindInteraction,
    TempHumidityInteraction,
    MonthSin,
    MonthCos,
    DayOfWeekSin,
    DayOfWeekCos,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Base(field) => f.write_str(field.name()),
            Feature::AqiLag(lag) => write!(f, "aqi_lag_{}", lag),
            Feature::Month => f.write_str("month"),
            Feature::DayOfYear => f.write_str("day_of_year"),
            Feature::DayOfWeek => f.write_str("day_of_week"),
            Feature::Rolling {
                series,
                statistic,
                window,
            } => write!(
                f,
                "{}_rolling_{}_{}",
                series.name(),
                statistic.name(),
                window
            ),
            Feature::Pm25WindInteraction => f.write_str("pm25_x_wind_interaction"),
            Feature::TempHumidityInteraction => f.write_str("temp_x_humidity_interaction"),
            Feature::MonthSin => f.write_str("month_sin"),
            Feature::MonthCos => f.write_str("month_cos"),
            Feature::DayOfWeekSin => f.write_str("day_of_week_sin"),
            Feature::DayOfWeekCos => f.write_str("day_of_week_cos"),
        }
    }
}

/// A feature name that does not correspond to any known feature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown feature name '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fixed = match s {
            "month" => Some(Feature::Month),
            "day_of_year" => Some(Feature::DayOfYear),
            "day_of_week" => Some(Feature::DayOfWeek),
            "pm25_x_wind_interaction" => Some(Feature::Pm25WindInteraction),
            "temp_x_humidity_interaction" => Some(Feature::TempHumidityInteraction),
            "month_sin" => Some(Feature::MonthSin),
            "month_cos" => Some(Feature::MonthCos),
            "day_of_week_sin" => Some(Feature::DayOfWeekSin),
            "day_of_week_cos" => Some(Feature::DayOfWeekCos),
            _ => None,
        };
        if let Some(feature) = fixed {
            return Ok(feature);
        }

        if let Some(field) = BaseField::from_name(s) {
            return Ok(Feature::Base(field));
        }

        if let Some(lag) = s.strip_prefix("aqi_lag_") {
            return match lag.parse::<usize>() {
                Ok(lag) if lag > 0 => Ok(Feature::AqiLag(lag)),
                _ => Err(UnknownFeature(s.to_string())),
            };
        }

        for (marker, statistic) in [
            ("_rolling_mean_", Statistic::Mean),
            ("_rolling_std_", Statistic::Std),
        ] {
            if let Some((series, window)) = s.split_once(marker) {
                let series = Series::from_name(series).ok_or_else(|| UnknownFeature(s.to_string()))?;
                let window = window
                    .parse::<usize>()
                    .ok()
                    .filter(|w| *w > 1)
                    .ok_or_else(|| UnknownFeature(s.to_string()))?;
                return Ok(Feature::Rolling {
                    series,
                    statistic,
                    window,
                });
            }
        }

        Err(UnknownFeature(s.to_string()))
    }
}

impl TryFrom<String> for Feature {
    type Error = UnknownFeature;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Feature> for String {
    fn from(feature: Feature) -> Self {
        feature.to_string()
    }
}

/// Every feature the engine computed for one day, in engine order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    date: NaiveDate,
    entries: Vec<(Feature, f64)>,
}

impl FeatureVector {
    fn with_capacity(date: NaiveDate, capacity: usize) -> Self {
        Self {
            date,
            entries: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, feature: Feature, value: f64) {
        self.entries.push((feature, value));
    }

    /// The day these features describe.
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.entries
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, v)| *v)
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.entries.iter().map(|(f, _)| *f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered list of the features a model was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Feature>", into = "Vec<Feature>")]
pub struct FeatureSchema {
    features: Vec<Feature>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty lists and duplicate names.
    pub fn new(features: Vec<Feature>) -> Result<Self, ForecastError> {
        if features.is_empty() {
            return Err(ForecastError::SchemaMismatch(
                "schema has no features".to_string(),
            ));
        }
        for (i, feature) in features.iter().enumerate() {
            if features[..i].contains(feature) {
                return Err(ForecastError::SchemaMismatch(format!(
                    "feature '{}' appears more than once",
                    feature
                )));
            }
        }
        Ok(Self { features })
    }

    /// The schema the trainer fits every model against.
    pub fn canonical() -> Self {
        let mut features: Vec<Feature> = BaseField::ALL.into_iter().map(Feature::Base).collect();
        features.extend((1..=LAG_DAYS).map(Feature::AqiLag));
        features.push(Feature::DayOfYear);
        for window in ROLLING_WINDOWS {
            for series in ROLLING_SERIES {
                for statistic in [Statistic::Mean, Statistic::Std] {
                    features.push(Feature::Rolling {
                        series,
                        statistic,
                        window,
                    });
                }
            }
        }
        features.extend([
            Feature::Pm25WindInteraction,
            Feature::TempHumidityInteraction,
            Feature::MonthSin,
            Feature::MonthCos,
            Feature::DayOfWeekSin,
            Feature::DayOfWeekCos,
        ]);
        Self { features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(Feature::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Pick this schema's features out of `vector`, in schema order.
    ///
    /// Engine features the schema does not name are dropped. A schema feature
    /// the engine did not produce is a [`ForecastError::SchemaMismatch`]; a
    /// non-finite value is a [`ForecastError::NumericDegeneracy`].
    pub fn align(&self, vector: &FeatureVector) -> Result<AlignedFeatures, ForecastError> {
        let mut values = Vec::with_capacity(self.features.len());
        let mut missing = Vec::new();

        for feature in &self.features {
            match vector.get(*feature) {
                Some(value) => values.push(value),
                None => missing.push(feature.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ForecastError::SchemaMismatch(format!(
                "model expects features the engine does not produce: {}",
                missing.join(", ")
            )));
        }

        if let Some((feature, value)) = self
            .features
            .iter()
            .zip(&values)
            .find(|(_, v)| !v.is_finite())
        {
            return Err(ForecastError::NumericDegeneracy {
                date: vector.date(),
                detail: format!("feature {} is {}", feature, value),
            });
        }

        Ok(AlignedFeatures {
            date: vector.date(),
            features: self.features.clone(),
            values,
        })
    }
}

impl TryFrom<Vec<Feature>> for FeatureSchema {
    type Error = ForecastError;

    fn try_from(features: Vec<Feature>) -> Result<Self, Self::Error> {
        Self::new(features)
    }
}

impl From<FeatureSchema> for Vec<Feature> {
    fn from(schema: FeatureSchema) -> Self {
        schema.features
    }
}

/// A feature row reordered to match a model schema, ready for prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFeatures {
    date: NaiveDate,
    features: Vec<Feature>,
    values: Vec<f64>,
}

impl AlignedFeatures {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(Feature::to_string).collect()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.features
            .iter()
            .position(|f| *f == feature)
            .map(|i| self.values[i])
    }
}

/// Builds feature vectors from daily observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngine;

impl FeatureEngine {
    pub fn new() -> Self {
        Self
    }

    /// Featurize the day `date` with `conditions`, using `prior` as history.
    ///
    /// `prior` holds the rows strictly before the day, oldest first. Lags and
    /// rolling statistics read only its tail.
    pub fn featurize(
        &self,
        prior: &[Observation],
        date: NaiveDate,
        conditions: &Conditions,
    ) -> Result<FeatureVector, ForecastError> {
        let recent_aqi: Vec<f64> = prior
            .iter()
            .rev()
            .map_while(Observation::known_aqi)
            .take(REQUIRED_HISTORY)
            .collect();
        if recent_aqi.len() < REQUIRED_HISTORY {
            return Err(ForecastError::InsufficientHistory {
                required: REQUIRED_HISTORY,
                available: trailing_known_aqi(prior),
            });
        }

        let mut vector = FeatureVector::with_capacity(date, 43);

        for field in BaseField::ALL {
            vector.push(Feature::Base(field), conditions.get(field));
        }

        for (i, aqi) in recent_aqi.iter().take(LAG_DAYS).enumerate() {
            vector.push(Feature::AqiLag(i + 1), *aqi);
        }

        let month = date.month() as f64;
        let day_of_week = date.weekday().num_days_from_monday() as f64;
        vector.push(Feature::Month, month);
        vector.push(Feature::DayOfYear, date.ordinal() as f64);
        vector.push(Feature::DayOfWeek, day_of_week);

        for window in ROLLING_WINDOWS {
            let tail = &prior[prior.len() - window..];
            for series in ROLLING_SERIES {
                let values: Vec<f64> = tail.iter().map(|obs| series.value(obs)).collect();
                let (mean, std) = mean_and_std(&values);
                vector.push(
                    Feature::Rolling {
                        series,
                        statistic: Statistic::Mean,
                        window,
                    },
                    mean,
                );
                vector.push(
                    Feature::Rolling {
                        series,
                        statistic: Statistic::Std,
                        window,
                    },
                    std,
                );
            }
        }

        vector.push(
            Feature::Pm25WindInteraction,
            conditions.pm25 / (conditions.wind_speed + 1.0),
        );
        vector.push(
            Feature::TempHumidityInteraction,
            conditions.temperature * conditions.humidity,
        );

        let (month_sin, month_cos) = cyclical_encode(month, 12.0);
        let (day_of_week_sin, day_of_week_cos) = cyclical_encode(day_of_week, 7.0);
        vector.push(Feature::MonthSin, month_sin);
        vector.push(Feature::MonthCos, month_cos);
        vector.push(Feature::DayOfWeekSin, day_of_week_sin);
        vector.push(Feature::DayOfWeekCos, day_of_week_cos);

        Ok(vector)
    }

    /// Featurize row `index` of a contiguous table, using the rows before it.
    pub fn featurize_row(
        &self,
        table: &[Observation],
        index: usize,
    ) -> Result<FeatureVector, ForecastError> {
        let row = &table[index];
        self.featurize(&table[..index], row.date, &row.conditions)
    }
}

/// Number of rows at the end of `history` with a known, finite AQI.
pub fn trailing_known_aqi(history: &[Observation]) -> usize {
    history
        .iter()
        .rev()
        .take_while(|obs| obs.known_aqi().is_some())
        .count()
}

/// Mean and sample standard deviation (n - 1 denominator).
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        f64::NAN
    };
    (mean, variance.sqrt())
}

/// Cyclical encoding for periodic features
/// Returns (sin, cos) encoding to preserve continuity
fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn conditions(pm25: f64) -> Conditions {
        Conditions {
            pm25,
            pm10: 90.0,
            carbon_monoxide: 400.0,
            nitrogen_dioxide: 25.0,
            temperature: 28.0,
            humidity: 55.0,
            wind_speed: 11.0,
        }
    }

    fn history(aqis: &[f64]) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        aqis.iter()
            .enumerate()
            .map(|(i, aqi)| {
                Observation::new(
                    start + chrono::Duration::days(i as i64),
                    Some(*aqi),
                    conditions(30.0 + i as f64),
                )
            })
            .collect()
    }

    fn rolling(series: Series, statistic: Statistic, window: usize) -> Feature {
        Feature::Rolling {
            series,
            statistic,
            window,
        }
    }

    fn next_day(prior: &[Observation]) -> NaiveDate {
        prior.last().unwrap().date + chrono::Duration::days(1)
    }

    #[test]
    fn test_canonical_schema_shape() {
        let schema = FeatureSchema::canonical();
        assert_eq!(schema.len(), 41);
        assert!(!schema.features().contains(&Feature::Month));
        assert!(!schema.features().contains(&Feature::DayOfWeek));

        let names = schema.names();
        assert_eq!(names[0], "pm25");
        assert_eq!(names[7], "aqi_lag_1");
        assert_eq!(names[14], "day_of_year");
        assert_eq!(names[15], "aqi_rolling_mean_3");
        assert_eq!(names[16], "aqi_rolling_std_3");
        assert_eq!(names[34], "humidity_rolling_std_7");
        assert_eq!(names[40], "day_of_week_cos");
    }

    #[test]
    fn test_feature_names_parse_back() {
        let mut all = FeatureSchema::canonical().features().to_vec();
        all.extend([Feature::Month, Feature::DayOfWeek]);
        for feature in all {
            let parsed: Feature = feature.to_string().parse().unwrap();
            assert_eq!(parsed, feature);
        }
    }

    #[test]
    fn test_unknown_feature_names_rejected() {
        for name in [
            "aqi_lag_",
            "aqi_lag_0",
            "aqi_lag_x",
            "ozone_rolling_mean_3",
            "pm25_rolling_median_3",
            "pm25_rolling_std_1",
            "",
        ] {
            assert!(name.parse::<Feature>().is_err(), "{} should not parse", name);
        }
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let result = FeatureSchema::new(vec![Feature::DayOfYear, Feature::DayOfYear]);
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));

        let result = FeatureSchema::new(Vec::new());
        assert!(matches!(result, Err(ForecastError::SchemaMismatch(_))));
    }

    #[test]
    fn test_schema_serializes_as_names() {
        let schema = FeatureSchema::new(vec![Feature::AqiLag(1), Feature::MonthSin]).unwrap();
        let json = serde_json::to_string(&schema).unwrap();
        assert_eq!(json, r#"["aqi_lag_1","month_sin"]"#);

        let back: FeatureSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);

        let bad: Result<FeatureSchema, _> = serde_json::from_str(r#"["aqi_lag_1","aqi_lag_1"]"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_lag_features_read_most_recent_first() {
        let prior = history(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let vector = FeatureEngine::new()
            .featurize(&prior, next_day(&prior), &conditions(40.0))
            .unwrap();

        assert_eq!(vector.get(Feature::AqiLag(1)), Some(10.0));
        assert_eq!(vector.get(Feature::AqiLag(2)), Some(9.0));
        assert_eq!(vector.get(Feature::AqiLag(7)), Some(4.0));
        assert_eq!(vector.get(Feature::AqiLag(8)), None);
    }

    #[test]
    fn test_rolling_statistics_use_prior_rows_only() {
        let prior = history(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let engine = FeatureEngine::new();
        let vector = engine
            .featurize(&prior, next_day(&prior), &conditions(40.0))
            .unwrap();

        let mean3 = vector
            .get(rolling(Series::Aqi, Statistic::Mean, 3))
            .unwrap();
        let std3 = vector.get(rolling(Series::Aqi, Statistic::Std, 3)).unwrap();
        assert_relative_eq!(mean3, 9.0, epsilon = 1e-12);
        assert_relative_eq!(std3, 1.0, epsilon = 1e-12);

        let mean7 = vector
            .get(rolling(Series::Aqi, Statistic::Mean, 7))
            .unwrap();
        assert_relative_eq!(mean7, 7.0, epsilon = 1e-12);

        // pm25 history is 30..=39; the last three are 37, 38, 39.
        let pm_mean3 = vector
            .get(rolling(
                Series::Base(BaseField::Pm25),
                Statistic::Mean,
                3,
            ))
            .unwrap();
        assert_relative_eq!(pm_mean3, 38.0, epsilon = 1e-12);

        // Changing the current day's pm25 must not move the rolling value.
        let other = engine
            .featurize(&prior, next_day(&prior), &conditions(900.0))
            .unwrap();
        assert_eq!(
            other.get(rolling(
                Series::Base(BaseField::Pm25),
                Statistic::Mean,
                3
            )),
            Some(pm_mean3)
        );
        assert_eq!(other.get(Feature::Base(BaseField::Pm25)), Some(900.0));
    }

    #[test]
    fn test_interactions_and_calendar() {
        let prior = history(&[50.0; 7]);
        // 2024-03-08 is a Friday.
        let date = next_day(&prior);
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());

        let vector = FeatureEngine::new()
            .featurize(&prior, date, &conditions(48.0))
            .unwrap();

        assert_relative_eq!(
            vector.get(Feature::Pm25WindInteraction).unwrap(),
            4.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            vector.get(Feature::TempHumidityInteraction).unwrap(),
            28.0 * 55.0,
            epsilon = 1e-9
        );
        assert_eq!(vector.get(Feature::Month), Some(3.0));
        assert_eq!(vector.get(Feature::DayOfWeek), Some(4.0));
        assert_eq!(vector.get(Feature::DayOfYear), Some(68.0));
        assert_relative_eq!(
            vector.get(Feature::MonthSin).unwrap(),
            (2.0 * PI * 3.0 / 12.0).sin(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            vector.get(Feature::DayOfWeekCos).unwrap(),
            (2.0 * PI * 4.0 / 7.0).cos(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_constant_history_has_zero_std() {
        let prior = history(&[50.0; 7]);
        let vector = FeatureEngine::new()
            .featurize(&prior, next_day(&prior), &conditions(48.0))
            .unwrap();
        assert_eq!(vector.get(rolling(Series::Aqi, Statistic::Std, 7)), Some(0.0));
    }

    #[test]
    fn test_insufficient_history() {
        let prior = history(&[80.0, 82.0, 85.0, 90.0, 88.0, 91.0]);
        let result = FeatureEngine::new().featurize(&prior, next_day(&prior), &conditions(40.0));
        assert_eq!(
            result,
            Err(ForecastError::InsufficientHistory {
                required: 7,
                available: 6
            })
        );
    }

    #[test]
    fn test_missing_aqi_breaks_trailing_run() {
        let mut prior = history(&[80.0; 10]);
        prior[6].aqi = None;
        assert_eq!(trailing_known_aqi(&prior), 3);

        let result = FeatureEngine::new().featurize(&prior, next_day(&prior), &conditions(40.0));
        assert_eq!(
            result,
            Err(ForecastError::InsufficientHistory {
                required: 7,
                available: 3
            })
        );
    }

    #[test]
    fn test_featurize_row_matches_featurize() {
        let table = history(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let engine = FeatureEngine::new();
        let by_row = engine.featurize_row(&table, 8).unwrap();
        let direct = engine
            .featurize(&table[..8], table[8].date, &table[8].conditions)
            .unwrap();
        assert_eq!(by_row, direct);
    }

    #[test]
    fn test_align_reorders_and_drops_extras() {
        let prior = history(&[50.0; 8]);
        let vector = FeatureEngine::new()
            .featurize(&prior, next_day(&prior), &conditions(48.0))
            .unwrap();

        let schema = FeatureSchema::new(vec![
            Feature::DayOfWeekSin,
            Feature::AqiLag(2),
            Feature::Base(BaseField::Pm25),
        ])
        .unwrap();
        let aligned = schema.align(&vector).unwrap();

        assert_eq!(
            aligned.names(),
            vec!["day_of_week_sin", "aqi_lag_2", "pm25"]
        );
        assert_eq!(aligned.values()[1], 50.0);
        assert_eq!(aligned.values()[2], 48.0);
        assert_eq!(aligned.get(Feature::Base(BaseField::Pm10)), None);
    }

    #[test]
    fn test_align_missing_feature_is_schema_mismatch() {
        let prior = history(&[50.0; 8]);
        let vector = FeatureEngine::new()
            .featurize(&prior, next_day(&prior), &conditions(48.0))
            .unwrap();

        let schema = FeatureSchema::new(vec![Feature::AqiLag(1), Feature::AqiLag(10)]).unwrap();
        match schema.align(&vector) {
            Err(ForecastError::SchemaMismatch(msg)) => assert!(msg.contains("aqi_lag_10")),
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_align_rejects_non_finite_values() {
        let prior = history(&[50.0; 8]);
        let mut day = conditions(48.0);
        day.wind_speed = -1.0;
        let vector = FeatureEngine::new()
            .featurize(&prior, next_day(&prior), &day)
            .unwrap();

        let result = FeatureSchema::canonical().align(&vector);
        assert!(matches!(
            result,
            Err(ForecastError::NumericDegeneracy { .. })
        ));
    }

    #[test]
    fn test_cyclical_encoding_quarter() {
        let (sin, cos) = cyclical_encode(3.0, 12.0);
        assert_relative_eq!(sin, 1.0, epsilon = 1e-10);
        assert_relative_eq!(cos, 0.0, epsilon = 1e-10);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn rolling_mean_within_window_bounds(
                aqis in proptest::collection::vec(0.0f64..500.0, 7..30)
            ) {
                let prior = history(&aqis);
                let vector = FeatureEngine::new()
                    .featurize(&prior, next_day(&prior), &conditions(40.0))
                    .unwrap();

                for window in ROLLING_WINDOWS {
                    let tail = &aqis[aqis.len() - window..];
                    let min = tail.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = tail.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let mean = vector.get(rolling(Series::Aqi, Statistic::Mean, window)).unwrap();
                    let std = vector.get(rolling(Series::Aqi, Statistic::Std, window)).unwrap();
                    prop_assert!(mean >= min - 1e-9 && mean <= max + 1e-9);
                    prop_assert!(std >= 0.0);
                }
            }

            #[test]
            fn lags_mirror_history_tail(
                aqis in proptest::collection::vec(0.0f64..500.0, 7..30)
            ) {
                let prior = history(&aqis);
                let vector = FeatureEngine::new()
                    .featurize(&prior, next_day(&prior), &conditions(40.0))
                    .unwrap();
                for lag in 1..=LAG_DAYS {
                    prop_assert_eq!(vector.get(Feature::AqiLag(lag)), Some(aqis[aqis.len() - lag]));
                }
            }

            #[test]
            fn canonical_alignment_has_schema_length(
                aqis in proptest::collection::vec(0.0f64..500.0, 7..15)
            ) {
                let prior = history(&aqis);
                let vector = FeatureEngine::new()
                    .featurize(&prior, next_day(&prior), &conditions(40.0))
                    .unwrap();
                let schema = FeatureSchema::canonical();
                let aligned = schema.align(&vector).unwrap();
                prop_assert_eq!(aligned.features(), schema.features());
            }
        }
    }
}
