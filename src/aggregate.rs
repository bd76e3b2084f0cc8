//! Hourly to daily aggregation.
//!
//! Open-Meteo only serves hourly pollutant data. A day's record is the mean
//! of each pollutant and weather field and the maximum of the hourly AQI.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::observation::{BaseField, Conditions, Observation};

/// One hour of merged air-quality and weather data. Any value may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HourlyRecord {
    pub time: NaiveDateTime,
    pub aqi: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
}

impl HourlyRecord {
    pub fn get(&self, field: BaseField) -> Option<f64> {
        match field {
            BaseField::Pm25 => self.pm25,
            BaseField::Pm10 => self.pm10,
            BaseField::CarbonMonoxide => self.carbon_monoxide,
            BaseField::NitrogenDioxide => self.nitrogen_dioxide,
            BaseField::Temperature => self.temperature,
            BaseField::Humidity => self.humidity,
            BaseField::WindSpeed => self.wind_speed,
        }
    }
}

/// Aggregated values for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub max_aqi: Option<f64>,
    means: [Option<f64>; 7],
}

impl DailySummary {
    /// Mean of the field's present hours, `None` when every hour was missing.
    pub fn mean(&self, field: BaseField) -> Option<f64> {
        self.means[field.index()]
    }

    /// All field means, or `None` if any field had no data.
    pub fn conditions(&self) -> Option<Conditions> {
        if self.means.iter().any(Option::is_none) {
            return None;
        }
        Some(Conditions::from_fn(|field| {
            self.mean(field).unwrap_or(f64::NAN)
        }))
    }

    /// A complete daily observation, if the AQI and every field are present.
    pub fn observation(&self) -> Option<Observation> {
        let aqi = self.max_aqi?;
        let conditions = self.conditions()?;
        Some(Observation::new(self.date, Some(aqi), conditions))
    }
}

#[derive(Debug, Default)]
struct DayAccumulator {
    sums: [f64; 7],
    counts: [usize; 7],
    max_aqi: Option<f64>,
}

impl DayAccumulator {
    fn add(&mut self, record: &HourlyRecord) {
        for field in BaseField::ALL {
            if let Some(value) = record.get(field).filter(|v| v.is_finite()) {
                self.sums[field.index()] += value;
                self.counts[field.index()] += 1;
            }
        }
        if let Some(aqi) = record.aqi.filter(|v| v.is_finite()) {
            self.max_aqi = Some(self.max_aqi.map_or(aqi, |max| max.max(aqi)));
        }
    }

    fn finish(&self, date: NaiveDate) -> DailySummary {
        let mut means = [None; 7];
        for (i, mean) in means.iter_mut().enumerate() {
            if self.counts[i] > 0 {
                *mean = Some(self.sums[i] / self.counts[i] as f64);
            }
        }
        DailySummary {
            date,
            max_aqi: self.max_aqi,
            means,
        }
    }
}

/// Group hourly records by calendar day, oldest first.
pub fn summarize_days(records: &[HourlyRecord]) -> Vec<DailySummary> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for record in records {
        days.entry(record.time.date()).or_default().add(record);
    }
    days.iter().map(|(date, acc)| acc.finish(*date)).collect()
}

/// Daily observations from hourly records. Days missing any field are dropped.
pub fn hourly_to_daily(records: &[HourlyRecord]) -> Vec<Observation> {
    summarize_days(records)
        .into_iter()
        .filter_map(|summary| {
            let observation = summary.observation();
            if observation.is_none() {
                debug!(date = %summary.date, "Dropping incomplete day");
            }
            observation
        })
        .collect()
}
