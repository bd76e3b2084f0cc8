//! End-to-end tests: train on a historical table, persist the model,
//! reload it and roll a multi-day forecast forward.

use aqi_forecaster::{
    DataAccess, ForecastError,
    ml::{
        FeatureEngine, FeatureSchema, Forecaster, ModelArtifact, Regressor, Trainer,
        TrainingConfig, TrainingError,
    },
    observation::{Conditions, ForecastInput, Observation},
    store::HistoryStore,
    traits::MockClock,
};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use tempfile::tempdir;

fn conditions_for(t: f64) -> Conditions {
    let pm25 = 50.0 + (t * 0.31).sin() * 18.0 + (t * 0.07).cos() * 8.0;
    Conditions {
        pm25,
        pm10: pm25 * 1.9,
        carbon_monoxide: 400.0 + (t * 0.11).sin() * 60.0,
        nitrogen_dioxide: 22.0 + (t * 0.37).cos() * 5.0,
        temperature: 26.0 + (t * 0.0172).sin() * 7.0,
        humidity: 55.0 + (t * 0.23).cos() * 12.0,
        wind_speed: 11.0 + (t * 0.19).sin() * 4.0,
    }
}

/// Two years of daily rows where AQI follows yesterday, pm25 and wind.
fn synthetic_table(n: usize) -> Vec<Observation> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let mut aqi = 120.0;
    (0..n)
        .map(|i| {
            let conditions = conditions_for(i as f64);
            aqi = 0.55 * aqi + 1.1 * conditions.pm25 - 0.8 * conditions.wind_speed + 15.0;
            Observation::new(start + Duration::days(i as i64), Some(aqi), conditions)
        })
        .collect()
}

fn inputs_after(table: &[Observation], days: usize) -> Vec<ForecastInput> {
    let last = table.last().unwrap().date;
    (1..=days)
        .map(|i| {
            ForecastInput::new(
                last + Duration::days(i as i64),
                conditions_for((table.len() + i - 1) as f64),
            )
        })
        .collect()
}

/// Serves a fixed table, or fails like an unreachable store.
struct TableSource {
    table: Option<Vec<Observation>>,
}

impl DataAccess for TableSource {
    async fn history(&self) -> Result<Vec<Observation>, ForecastError> {
        self.table.clone().ok_or_else(|| {
            ForecastError::DataUnavailable("historical data: file not found".to_string())
        })
    }

    async fn forecast_inputs(&self, _horizon_days: u32) -> Result<Vec<ForecastInput>, ForecastError> {
        Ok(Vec::new())
    }
}

fn clock() -> MockClock {
    MockClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap())
}

#[test]
fn test_train_save_load_forecast() {
    let table = synthetic_table(730);
    let artifact = Trainer::new(TrainingConfig::default())
        .train(&table, &clock())
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("aqi_model.bin");
    artifact.save(&path).unwrap();
    let loaded = ModelArtifact::load(&path).unwrap();
    assert_eq!(loaded, artifact);

    let history = &table[table.len() - 10..];
    let inputs = inputs_after(&table, 3);

    let before = Forecaster::new(&artifact.model).run(history, &inputs).unwrap();
    let after = Forecaster::new(&loaded.model).run(history, &inputs).unwrap();
    assert_eq!(before.predictions, after.predictions);

    let dates: Vec<NaiveDate> = before.predictions.iter().map(|p| p.date).collect();
    let expected: Vec<NaiveDate> = inputs.iter().map(|i| i.date).collect();
    assert_eq!(dates, expected);

    // The series stays within its historical range, so a good fit should too.
    for prediction in &before.predictions {
        assert!(
            (50..400).contains(&prediction.predicted_aqi),
            "implausible forecast {:?}",
            prediction
        );
    }
}

#[test]
fn test_forecast_rows_match_training_rows() {
    let table = synthetic_table(400);
    let artifact = Trainer::new(TrainingConfig::default())
        .train(&table, &clock())
        .unwrap();

    // Forecasting the last known day from the ten before it must see the
    // same feature row the trainer built for that day.
    let split = table.len() - 1;
    let history = &table[split - 10..split];
    let target = table[split];
    let input = ForecastInput::new(target.date, target.conditions);

    let run = Forecaster::new(&artifact.model)
        .run(history, &[input])
        .unwrap();

    let training_row = FeatureEngine::new()
        .featurize_row(&table[split - 10..=split], 10)
        .unwrap();
    let aligned = artifact.schema().align(&training_row).unwrap();
    assert_eq!(run.steps[0].features, aligned);
    assert_eq!(run.steps[0].raw_aqi, artifact.model.predict(&aligned).unwrap());
}

#[test]
fn test_training_twice_gives_identical_forecasts() {
    let table = synthetic_table(300);
    let trainer = Trainer::new(TrainingConfig::default());
    let first = trainer.train(&table, &clock()).unwrap();
    let second = trainer.train(&table, &clock()).unwrap();

    let history = &table[table.len() - 10..];
    let inputs = inputs_after(&table, 5);
    let a = Forecaster::new(&first.model).run(history, &inputs).unwrap();
    let b = Forecaster::new(&second.model).run(history, &inputs).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_history_file_round_trip_feeds_trainer() {
    let table = synthetic_table(120);
    let dir = tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("history.csv"));
    store.save(&table).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), table.len());

    let artifact = Trainer::new(TrainingConfig::default())
        .train(&loaded, &clock())
        .unwrap();
    assert_eq!(artifact.training_samples, 113);
    assert_eq!(artifact.schema(), &FeatureSchema::canonical());
}

#[test]
fn test_short_history_is_rejected() {
    let table = synthetic_table(200);
    let artifact = Trainer::new(TrainingConfig::default())
        .train(&table, &clock())
        .unwrap();

    let history = &table[table.len() - 5..];
    let result = Forecaster::new(&artifact.model).run(history, &inputs_after(&table, 3));
    assert!(matches!(
        result,
        Err(ForecastError::InsufficientHistory {
            required: 7,
            available: 5
        })
    ));
}

#[tokio::test]
async fn test_train_from_data_source() {
    let table = synthetic_table(200);
    let trainer = Trainer::new(TrainingConfig::default());

    let from_source = trainer
        .train_from(
            &TableSource {
                table: Some(table.clone()),
            },
            &clock(),
        )
        .await
        .unwrap();
    let direct = trainer.train(&table, &clock()).unwrap();
    assert_eq!(from_source, direct);
}

#[tokio::test]
async fn test_train_from_unavailable_source() {
    let trainer = Trainer::new(TrainingConfig::default());
    let result = trainer
        .train_from(&TableSource { table: None }, &clock())
        .await;

    match result {
        Err(TrainingError::Data(ForecastError::DataUnavailable(msg))) => {
            assert!(msg.contains("file not found"), "{}", msg);
        }
        other => panic!("unexpected {:?}", other),
    }
}
