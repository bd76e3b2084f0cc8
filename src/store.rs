//! CSV-backed historical daily table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::observation::{Conditions, Observation};

/// One row of the historical CSV. Column order in the file does not matter.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRecord {
    timestamp: String,
    aqi: Option<f64>,
    pm25: Option<f64>,
    pm10: Option<f64>,
    carbon_monoxide: Option<f64>,
    nitrogen_dioxide: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    wind_speed: Option<f64>,
}

impl CsvRecord {
    fn from_observation(obs: &Observation) -> Self {
        let finite = |v: f64| Some(v).filter(|v| v.is_finite());
        let c = &obs.conditions;
        Self {
            timestamp: obs.date.format("%Y-%m-%d").to_string(),
            aqi: obs.known_aqi(),
            pm25: finite(c.pm25),
            pm10: finite(c.pm10),
            carbon_monoxide: finite(c.carbon_monoxide),
            nitrogen_dioxide: finite(c.nitrogen_dioxide),
            temperature: finite(c.temperature),
            humidity: finite(c.humidity),
            wind_speed: finite(c.wind_speed),
        }
    }

    fn into_observation(self) -> Result<Observation> {
        let date = parse_timestamp(&self.timestamp)?;
        let missing = |v: Option<f64>| v.unwrap_or(f64::NAN);
        let conditions = Conditions {
            pm25: missing(self.pm25),
            pm10: missing(self.pm10),
            carbon_monoxide: missing(self.carbon_monoxide),
            nitrogen_dioxide: missing(self.nitrogen_dioxide),
            temperature: missing(self.temperature),
            humidity: missing(self.humidity),
            wind_speed: missing(self.wind_speed),
        };
        Ok(Observation::new(date, self.aqi, conditions))
    }
}

/// Parse the calendar day from a date or full timestamp string.
///
/// Accepts `2024-11-01`, `2024-11-01 00:00:00`, `2024-11-01T00:00` and the
/// same with a UTC offset; the date part is taken as written.
pub fn parse_timestamp(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    let day = trimmed
        .get(..10)
        .with_context(|| format!("Timestamp '{}' is too short", value))?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .with_context(|| format!("Invalid timestamp '{}'", value))
}

/// Combine two tables, sort by date and keep the newest row for each date.
pub fn merge_observations(existing: Vec<Observation>, new_rows: &[Observation]) -> Vec<Observation> {
    let mut combined = existing;
    combined.extend_from_slice(new_rows);
    normalize(combined)
}

/// Stable sort by date, then drop earlier duplicates.
fn normalize(mut rows: Vec<Observation>) -> Vec<Observation> {
    rows.sort_by_key(|obs| obs.date);
    let mut deduped: Vec<Observation> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.date == row.date => *last = row,
            _ => deduped.push(row),
        }
    }
    deduped
}

/// Summary of a merge into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub before: usize,
    pub incoming: usize,
    pub total: usize,
}

/// Historical daily table stored as CSV.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the table sorted by date with duplicate dates collapsed.
    pub fn load(&self) -> Result<Vec<Observation>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open history file {}", self.path.display()))?;

        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<CsvRecord>().enumerate() {
            let record = record.with_context(|| format!("Invalid history row {}", i + 1))?;
            rows.push(
                record
                    .into_observation()
                    .with_context(|| format!("Invalid history row {}", i + 1))?,
            );
        }

        let rows = normalize(rows);
        debug!(path = %self.path.display(), rows = rows.len(), "Loaded history");
        Ok(rows)
    }

    /// Overwrite the table with `rows`.
    pub fn save(&self, rows: &[Observation]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create history directory")?;
        }

        let mut wtr = csv::Writer::from_path(&self.path).context("Failed to create CSV writer")?;
        for row in rows {
            wtr.serialize(CsvRecord::from_observation(row))
                .context("Failed to serialize history row")?;
        }
        wtr.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }

    /// Append `new_rows`, replacing existing rows for the same dates.
    pub fn merge(&self, new_rows: &[Observation]) -> Result<MergeSummary> {
        let existing = if self.exists() { self.load()? } else { Vec::new() };
        let before = existing.len();
        let merged = merge_observations(existing, new_rows);
        self.save(&merged)?;

        let summary = MergeSummary {
            before,
            incoming: new_rows.len(),
            total: merged.len(),
        };
        info!(
            before = summary.before,
            incoming = summary.incoming,
            total = summary.total,
            "Merged into history"
        );
        Ok(summary)
    }
}
