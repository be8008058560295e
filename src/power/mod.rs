//! Side-channel power logger.
//!
//! Samples a power sensor on its own cadence and tags every reading with the most
//! recently announced pipeline phase:
//! - events are drained non-blockingly before each sample (a burst may collapse into one tag)
//! - `inference no.N start` is recorded as `inference no.N`; end tags are kept as-is
//! - readings before the first event carry no tag

pub mod analysis;

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::Receiver;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::random_range;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock;
use crate::pipeline::events::LifecycleEvent;
use crate::pipeline::shutdown::{StopHandle, StopOnExit, StopSignal};

/// Board draw with the pipeline idle, in watts.
pub const IDLE_POWER_W: f64 = 1.639;

#[derive(Debug, Error)]
pub enum PowerError {
    #[error("power sensor read failed: {0}")]
    Read(String),
}

pub trait PowerSensor: Send {
    /// Instantaneous power in watts.
    fn read_power(&mut self) -> Result<f64, PowerError>;
}

/// Idle draw plus uniform noise; stands in for the board's power monitor.
#[derive(Debug, Clone)]
pub struct SimulatedPowerSensor {
    idle_watts: f64,
    noise_watts: f64,
}

impl SimulatedPowerSensor {
    pub fn new(idle_watts: f64, noise_watts: f64) -> Self {
        Self {
            idle_watts,
            noise_watts,
        }
    }
}

impl Default for SimulatedPowerSensor {
    fn default() -> Self {
        Self::new(IDLE_POWER_W, 0.05)
    }
}

impl PowerSensor for SimulatedPowerSensor {
    fn read_power(&mut self) -> Result<f64, PowerError> {
        if self.noise_watts > 0.0 {
            Ok(self.idle_watts + random_range(0.0..self.noise_watts))
        } else {
            Ok(self.idle_watts)
        }
    }
}

/// Base label used to attribute power readings.
pub fn attribution_tag(label: &str) -> String {
    let trimmed = label.trim();
    if trimmed.ends_with("start") {
        let mut words: Vec<&str> = trimmed.split_whitespace().collect();
        words.pop();
        words.join(" ")
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    pub timestamp: String,
    /// Formatted `{:6.3}` as persisted.
    pub power: String,
    pub tag: Option<String>,
}

#[derive(Debug, Default)]
pub struct PowerLog {
    rows: Mutex<Vec<PowerSample>>,
}

impl PowerLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, sample: PowerSample) {
        self.rows.lock().push(sample);
    }

    pub fn rows(&self) -> Vec<PowerSample> {
        self.rows.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PowerLogger {
    sensor: Box<dyn PowerSensor>,
    events: Receiver<LifecycleEvent>,
    log: Arc<PowerLog>,
    interval: Duration,
    current_tag: Option<String>,
}

impl PowerLogger {
    pub fn new(
        sensor: Box<dyn PowerSensor>,
        events: Receiver<LifecycleEvent>,
        log: Arc<PowerLog>,
        interval: Duration,
    ) -> Self {
        Self {
            sensor,
            events,
            log,
            interval,
            current_tag: None,
        }
    }

    /// Drains every queued event; the last one wins.
    pub fn drain_events(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.events.try_recv() {
            self.current_tag = Some(attribution_tag(&event.label()));
            drained += 1;
        }
        drained
    }

    pub fn sample_once(&mut self) {
        self.drain_events();
        match self.sensor.read_power() {
            Ok(watts) => self.log.push(PowerSample {
                timestamp: clock::now_iso(),
                power: format!("{:6.3}", watts),
                tag: self.current_tag.clone(),
            }),
            Err(e) => warn!("Skipping power sample: {}", e),
        }
    }

    pub fn run(&mut self, stop: &StopSignal) {
        info!("Power logger started ({:?} cadence)", self.interval);
        loop {
            self.sample_once();
            if stop.wait(self.interval) {
                break;
            }
        }
        debug!("Power logger stopped after {} samples", self.log.len());
    }

    /// Runs on its own thread; a panic in the sensor stops the whole pipeline.
    pub fn spawn(mut self, stop: StopHandle, signal: StopSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("power-logger".into())
            .spawn(move || {
                let _guard = StopOnExit(stop);
                self.run(&signal);
            })
    }
}
