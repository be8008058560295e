//! Offline analysis of a persisted power log.
//!
//! Readings are attributed to inferences through their tags: a reading tagged
//! `inference no.N` belongs to inference N, and the first `... end` reading after it
//! closes N's duration. Power is taken relative to the idle draw.

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use statrs::statistics::Statistics;
use thiserror::Error;

use super::PowerSample;

const INFERENCE_MARKER: &str = "inference no.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: bad timestamp '{value}'")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: bad power value '{value}'")]
    Power { row: usize, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerReading {
    pub timestamp: DateTime<FixedOffset>,
    pub watts: f64,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceSummary {
    pub inference_id: u64,
    pub start_timestamp: String,
    /// Seconds from the first reading of the inference to the first `end` reading.
    pub duration: f64,
    pub total_power: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerReport {
    pub per_inference: Vec<InferenceSummary>,
    pub mean_power: BTreeMap<u64, f64>,
    pub overall_mean_power: f64,
    /// Mean absolute deviation of per-inference means around `overall_mean_power`,
    /// not around the idle offset.
    pub mead: f64,
    /// Sample standard deviation of per-inference means, also centred on
    /// `overall_mean_power` rather than the idle offset.
    pub stdev: f64,
    pub mean_duration_s: f64,
    /// Joules per inference.
    pub mean_energy_j: f64,
    /// Inferences per second.
    pub performance: u64,
    /// Inferences per second per watt.
    pub efficiency: f64,
}

pub fn parse_rows(samples: &[PowerSample]) -> Result<Vec<PowerReading>, AnalysisError> {
    samples
        .iter()
        .enumerate()
        .map(|(row, s)| {
            let timestamp = DateTime::parse_from_rfc3339(s.timestamp.trim()).map_err(|_| {
                AnalysisError::Timestamp {
                    row,
                    value: s.timestamp.clone(),
                }
            })?;
            let watts = s.power.trim().parse::<f64>().map_err(|_| AnalysisError::Power {
                row,
                value: s.power.clone(),
            })?;
            Ok(PowerReading {
                timestamp,
                watts,
                tag: s.tag.clone().unwrap_or_default(),
            })
        })
        .collect()
}

pub fn read_power_log(path: &Path) -> Result<Vec<PowerReading>, AnalysisError> {
    let mut reader = csv::Reader::from_path(path)?;
    let samples = reader
        .deserialize::<PowerSample>()
        .collect::<Result<Vec<_>, _>>()?;
    parse_rows(&samples)
}

pub fn analyze(readings: &[PowerReading], idle_offset: f64) -> PowerReport {
    let mut totals: BTreeMap<u64, (f64, u64)> = BTreeMap::new();
    let mut starts: BTreeMap<u64, DateTime<FixedOffset>> = BTreeMap::new();
    let mut durations: BTreeMap<u64, f64> = BTreeMap::new();

    let mut current: Option<u64> = None;
    let mut last_id: Option<u64> = None;
    let mut previous_was_end = true;

    for r in readings {
        let Some((_, info)) = r.tag.split_once(INFERENCE_MARKER) else {
            continue;
        };
        let info = info.trim();

        if info.contains("end") {
            if !previous_was_end {
                if let Some(id) = last_id {
                    if let Some(start) = starts.get(&id) {
                        let elapsed = r.timestamp.signed_duration_since(*start);
                        durations.insert(id, elapsed.num_microseconds().unwrap_or(0) as f64 / 1e6);
                    }
                }
            }
            current = None;
            previous_was_end = true;
        } else {
            current = info.parse::<u64>().ok();
            if let Some(id) = current {
                last_id = Some(id);
                starts.entry(id).or_insert(r.timestamp);
            }
            previous_was_end = false;
        }

        if let Some(id) = current {
            let entry = totals.entry(id).or_insert((0.0, 0));
            entry.0 += r.watts - idle_offset;
            entry.1 += 1;
        }
    }

    let mean_power: BTreeMap<u64, f64> = totals
        .iter()
        .map(|(&id, &(total, count))| (id, total / count as f64))
        .collect();

    let means: Vec<f64> = mean_power.values().copied().collect();
    let overall_mean_power = if means.is_empty() {
        0.0
    } else {
        means.iter().sum::<f64>() / means.len() as f64
    };
    let mead = if means.is_empty() {
        0.0
    } else {
        means.iter().map(|m| (m - overall_mean_power).abs()).sum::<f64>() / means.len() as f64
    };
    let stdev = if means.len() > 1 {
        means.iter().std_dev()
    } else {
        0.0
    };

    let mean_duration_s = if durations.is_empty() {
        0.0
    } else {
        durations.values().sum::<f64>() / durations.len() as f64
    };
    let mean_energy_j = overall_mean_power * mean_duration_s;
    let performance = if mean_duration_s > 0.0 {
        (1.0 / mean_duration_s).floor() as u64
    } else {
        0
    };
    let efficiency = if overall_mean_power != 0.0 {
        performance as f64 / overall_mean_power
    } else {
        0.0
    };

    let per_inference = totals
        .iter()
        .map(|(&id, &(total, count))| InferenceSummary {
            inference_id: id,
            start_timestamp: starts.get(&id).map(|t| t.to_rfc3339()).unwrap_or_default(),
            duration: durations.get(&id).copied().unwrap_or(0.0),
            total_power: total,
            count,
        })
        .collect();

    PowerReport {
        per_inference,
        mean_power,
        overall_mean_power,
        mead,
        stdev,
        mean_duration_s,
        mean_energy_j,
        performance,
        efficiency,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u32, power: f64, tag: Option<&str>) -> PowerSample {
        PowerSample {
            timestamp: format!("2024-05-01T12:00:00.{:03}+00:00", ms),
            power: format!("{:6.3}", power),
            tag: tag.map(str::to_string),
        }
    }

    fn log() -> Vec<PowerSample> {
        vec![
            sample(0, 1.639, None),
            sample(100, 2.139, Some("inference no.1")),
            sample(150, 2.639, Some("inference no.1")),
            sample(200, 1.700, Some("inference no.1 end")),
            sample(250, 1.700, Some("inference no.1 end")),
            sample(300, 3.139, Some("inference no.2")),
            sample(500, 1.700, Some("inference no.2 end")),
        ]
    }

    #[test]
    fn attributes_readings_to_inferences() {
        let report = analyze(&parse_rows(&log()).unwrap(), 1.639);

        assert_eq!(report.per_inference.len(), 2);
        let first = &report.per_inference[0];
        assert_eq!(first.inference_id, 1);
        assert_eq!(first.count, 2);
        assert!((first.total_power - 1.5).abs() < 1e-9);
        assert!((first.duration - 0.1).abs() < 1e-9);

        let second = &report.per_inference[1];
        assert_eq!(second.count, 1);
        assert!((second.duration - 0.2).abs() < 1e-9);
    }

    #[test]
    fn derives_energy_and_efficiency() {
        let report = analyze(&parse_rows(&log()).unwrap(), 1.639);

        // Means: 0.75 and 1.5.
        assert!((report.overall_mean_power - 1.125).abs() < 1e-9);
        assert!((report.mead - 0.375).abs() < 1e-9);
        assert!((report.stdev - 0.530330).abs() < 1e-5);
        assert!((report.mean_duration_s - 0.15).abs() < 1e-9);
        assert!((report.mean_energy_j - 0.16875).abs() < 1e-9);
        assert_eq!(report.performance, 6);
        assert!((report.efficiency - 6.0 / 1.125).abs() < 1e-9);
    }

    #[test]
    fn empty_log_gives_zeroes() {
        let report = analyze(&[], 1.639);
        assert!(report.per_inference.is_empty());
        assert_eq!(report.performance, 0);
        assert_eq!(report.efficiency, 0.0);
    }

    #[test]
    fn bad_power_value_is_reported() {
        let mut rows = log();
        rows[3].power = "n/a".into();
        assert!(matches!(
            parse_rows(&rows),
            Err(AnalysisError::Power { row: 3, .. })
        ));
    }
}
