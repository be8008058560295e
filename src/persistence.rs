//! CSV persistence of the in-memory power and inference logs.
//! Files are named `power_log_<stamp>.csv` and `inference_log_<stamp>.csv`, one pair
//! per run; flushing happens at most once even if several shutdown paths race.

use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use csv::Writer;
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::clock;
use crate::pipeline::events::InferenceLog;
use crate::power::PowerLog;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Writes `rows` with a header line. Returns the number of data rows written.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize, PersistError> {
    let file = File::create(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut wtr = Writer::from_writer(BufWriter::new(file));
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rows.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushedLogs {
    pub power_log: PathBuf,
    pub power_rows: usize,
    pub inference_log: PathBuf,
    pub inference_rows: usize,
}

pub struct LogFlusher {
    dir: PathBuf,
    stamp: String,
    flushed: AtomicBool,
}

impl LogFlusher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_stamp(dir, clock::file_stamp())
    }

    pub fn with_stamp(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn power_log_path(&self) -> PathBuf {
        self.dir.join(format!("power_log_{}.csv", self.stamp))
    }

    pub fn inference_log_path(&self) -> PathBuf {
        self.dir.join(format!("inference_log_{}.csv", self.stamp))
    }

    /// Writes both logs. `Ok(None)` if they were already written by an earlier call.
    pub fn flush_all(
        &self,
        power: &PowerLog,
        inferences: &InferenceLog,
    ) -> Result<Option<FlushedLogs>, PersistError> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|source| PersistError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let power_log = self.power_log_path();
        let power_rows = write_csv(&power_log, &power.rows())?;
        let inference_log = self.inference_log_path();
        let inference_rows = write_csv(&inference_log, &inferences.rows())?;

        info!(
            "Saved {} power samples to {} and {} events to {}",
            power_rows,
            power_log.display(),
            inference_rows,
            inference_log.display()
        );

        Ok(Some(FlushedLogs {
            power_log,
            power_rows,
            inference_log,
            inference_rows,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::LifecycleEvent;
    use crate::power::PowerSample;

    fn populated() -> (PowerLog, InferenceLog) {
        let power = PowerLog::new();
        power.push(PowerSample {
            timestamp: "2024-05-01T12:00:00.000+00:00".into(),
            power: " 1.700".into(),
            tag: None,
        });
        power.push(PowerSample {
            timestamp: "2024-05-01T12:00:00.100+00:00".into(),
            power: " 2.100".into(),
            tag: Some("inference no.1".into()),
        });
        let inferences = InferenceLog::new();
        inferences.record(&LifecycleEvent::start(1));
        inferences.record(&LifecycleEvent::end(1));
        (power, inferences)
    }

    #[test]
    fn writes_both_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let flusher = LogFlusher::with_stamp(dir.path().join("logs"), "run");
        let (power, inferences) = populated();

        let flushed = flusher.flush_all(&power, &inferences).unwrap().unwrap();
        assert_eq!(flushed.power_rows, 2);
        assert_eq!(flushed.inference_rows, 2);
        assert!(flushed.power_log.ends_with("power_log_run.csv"));

        let text = fs::read_to_string(&flushed.inference_log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "timestamp,event");
        assert!(lines[1].ends_with("inference no.1 start"));
        assert!(lines[2].ends_with("inference no.1 end"));

        assert!(flusher.flush_all(&power, &inferences).unwrap().is_none());
    }

    #[test]
    fn power_log_reads_back_for_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let flusher = LogFlusher::with_stamp(dir.path(), "rt");
        let (power, inferences) = populated();
        let flushed = flusher.flush_all(&power, &inferences).unwrap().unwrap();

        let readings = crate::power::analysis::read_power_log(&flushed.power_log).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].tag, "");
        assert_eq!(readings[1].tag, "inference no.1");
        assert!((readings[1].watts - 2.1).abs() < 1e-9);
    }
}
