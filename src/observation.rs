//! Daily observation records and forecast response types.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A raw pollutant or weather column carried by every daily record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BaseField {
    Pm25,
    Pm10,
    CarbonMonoxide,
    NitrogenDioxide,
    Temperature,
    Humidity,
    WindSpeed,
}

impl BaseField {
    /// All base fields in table column order.
    pub const ALL: [BaseField; 7] = [
        BaseField::Pm25,
        BaseField::Pm10,
        BaseField::CarbonMonoxide,
        BaseField::NitrogenDioxide,
        BaseField::Temperature,
        BaseField::Humidity,
        BaseField::WindSpeed,
    ];

    /// Column name as it appears in the historical table.
    pub fn name(self) -> &'static str {
        match self {
            BaseField::Pm25 => "pm25",
            BaseField::Pm10 => "pm10",
            BaseField::CarbonMonoxide => "carbon_monoxide",
            BaseField::NitrogenDioxide => "nitrogen_dioxide",
            BaseField::Temperature => "temperature",
            BaseField::Humidity => "humidity",
            BaseField::WindSpeed => "wind_speed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Position of this field in [`BaseField::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for BaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Weather and pollutant values for one day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Conditions {
    pub pm25: f64,
    pub pm10: f64,
    pub carbon_monoxide: f64,
    pub nitrogen_dioxide: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
}

impl Conditions {
    /// Build a record by asking `value` for every field.
    pub fn from_fn(mut value: impl FnMut(BaseField) -> f64) -> Self {
        Self {
            pm25: value(BaseField::Pm25),
            pm10: value(BaseField::Pm10),
            carbon_monoxide: value(BaseField::CarbonMonoxide),
            nitrogen_dioxide: value(BaseField::NitrogenDioxide),
            temperature: value(BaseField::Temperature),
            humidity: value(BaseField::Humidity),
            wind_speed: value(BaseField::WindSpeed),
        }
    }

    pub fn get(&self, field: BaseField) -> f64 {
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

    /// First field holding a NaN or infinite value, if any.
    pub fn first_non_finite(&self) -> Option<BaseField> {
        BaseField::ALL
            .into_iter()
            .find(|field| !self.get(*field).is_finite())
    }
}

/// One calendar day of observations.
///
/// `aqi` is `None` for days whose index is not (yet) known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub aqi: Option<f64>,
    pub conditions: Conditions,
}

impl Observation {
    pub fn new(date: NaiveDate, aqi: Option<f64>, conditions: Conditions) -> Self {
        Self {
            date,
            aqi,
            conditions,
        }
    }

    /// The AQI if it is present and finite.
    pub fn known_aqi(&self) -> Option<f64> {
        self.aqi.filter(|v| v.is_finite())
    }
}

/// Forecast weather and pollutant values for a future day, without an AQI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastInput {
    pub date: NaiveDate,
    pub conditions: Conditions,
}

impl ForecastInput {
    pub fn new(date: NaiveDate, conditions: Conditions) -> Self {
        Self { date, conditions }
    }

    /// Turn this input into a history row carrying a simulated AQI.
    pub fn with_aqi(&self, aqi: f64) -> Observation {
        Observation::new(self.date, Some(aqi), self.conditions)
    }
}

/// A reported forecast value for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub predicted_aqi: u32,
}

/// Latest known AQI from the historical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayAqi {
    pub date: NaiveDate,
    pub aqi: u32,
}

/// Body of a successful forecast request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub today: Option<TodayAqi>,
    pub forecast: Vec<Prediction>,
}

/// Round an AQI to the reported integer: nearest, ties to even, never negative.
pub fn report_aqi(value: f64) -> u32 {
    value.round_ties_even().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_field_names_round_trip() {
        for (i, field) in BaseField::ALL.into_iter().enumerate() {
            assert_eq!(BaseField::from_name(field.name()), Some(field));
            assert_eq!(field.index(), i);
        }
        assert_eq!(BaseField::from_name("ozone"), None);
    }

    #[test]
    fn test_first_non_finite() {
        let mut conditions = Conditions {
            pm25: 40.0,
            pm10: 80.0,
            carbon_monoxide: 300.0,
            nitrogen_dioxide: 20.0,
            temperature: 30.0,
            humidity: 60.0,
            wind_speed: 12.0,
        };
        assert_eq!(conditions.first_non_finite(), None);

        conditions.humidity = f64::NAN;
        assert_eq!(conditions.first_non_finite(), Some(BaseField::Humidity));
    }

    #[test]
    fn test_conditions_from_fn() {
        let conditions = Conditions::from_fn(|field| field.index() as f64);
        assert_eq!(conditions.pm25, 0.0);
        assert_eq!(conditions.wind_speed, 6.0);
        for field in BaseField::ALL {
            assert_eq!(conditions.get(field), field.index() as f64);
        }
    }

    #[test]
    fn test_known_aqi_filters_nan() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let obs = Observation::new(date, Some(f64::NAN), Conditions::default());
        assert_eq!(obs.known_aqi(), None);

        let obs = Observation::new(date, Some(42.0), Conditions::default());
        assert_eq!(obs.known_aqi(), Some(42.0));
    }

    #[test]
    fn test_report_aqi_rounding() {
        assert_eq!(report_aqi(101.4), 101);
        assert_eq!(report_aqi(101.6), 102);
        // Ties go to the even neighbour.
        assert_eq!(report_aqi(100.5), 100);
        assert_eq!(report_aqi(101.5), 102);
        assert_eq!(report_aqi(-3.2), 0);
    }

    #[test]
    fn test_prediction_serializes_date_as_iso() {
        let prediction = Prediction {
            date: NaiveDate::from_ymd_opt(2024, 11, 5).unwrap(),
            predicted_aqi: 154,
        };
        let json = serde_json::to_string(&prediction).unwrap();
        assert_eq!(json, r#"{"date":"2024-11-05","predicted_aqi":154}"#);
    }
}
