//! Payload sources feeding the transport channel.
//! - `SimulatedTurbine`: periodic release (SpinSleeper) of synthetic 20-field records
//! - `StdinSource`: one comma-delimited record per input line

use std::{
    io::{self, BufRead},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::Sender;
use log::{debug, info, warn};
use rand::Rng;
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::config::RecordLayout;
use crate::pipeline::shutdown::StopSignal;

/// Operating point of the simulated machine.
#[derive(Debug, Clone, Copy)]
pub struct TurbineProfile {
    pub rotational_speed: f64,
    pub wind: f64,
    pub voltage: f64,
    /// Peak yaw swing in radians.
    pub yaw_amplitude: f64,
    pub angle_noise: f64,
    pub signal_noise: f64,
}

impl Default for TurbineProfile {
    fn default() -> Self {
        Self {
            rotational_speed: 0.6,
            wind: 0.5,
            voltage: 0.5,
            yaw_amplitude: 0.02,
            angle_noise: 0.005,
            signal_noise: 0.01,
        }
    }
}

pub struct SimulatedTurbine {
    period: Duration,
    tx: Sender<String>,
    layout: RecordLayout,
    profile: TurbineProfile,
}

impl SimulatedTurbine {
    pub fn new(period: Duration, tx: Sender<String>, layout: RecordLayout) -> Self {
        Self {
            period,
            tx,
            layout,
            profile: TurbineProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: TurbineProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Builds one raw record at simulation step `seq`.
    pub fn record<R: Rng>(&self, seq: u64, rng: &mut R) -> String {
        let p = &self.profile;
        let phase = seq as f64 * 0.01;

        let roll = rng.random_range(-p.angle_noise..=p.angle_noise);
        let pitch = rng.random_range(-p.angle_noise..=p.angle_noise);
        let yaw = p.yaw_amplitude * phase.sin() + rng.random_range(-p.angle_noise..=p.angle_noise);
        let [qx, qy, qz, qw] = quaternion_from_euler(roll, pitch, yaw);

        let mut fields: Vec<f64> = (0..self.layout.field_count)
            .map(|i| i as f64 * 0.1)
            .collect();
        fields[self.layout.qx] = qx;
        fields[self.layout.qy] = qy;
        fields[self.layout.qz] = qz;
        fields[self.layout.qw] = qw;
        fields[self.layout.rotational_speed] =
            p.rotational_speed + rng.random_range(-p.signal_noise..=p.signal_noise);
        fields[self.layout.wind] =
            p.wind + 0.05 * (phase * 0.5).sin() + rng.random_range(-p.signal_noise..=p.signal_noise);
        fields[self.layout.voltage] = p.voltage + rng.random_range(-p.signal_noise..=p.signal_noise);

        fields
            .iter()
            .map(|v| format!("{:.6}", v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Periodic release loop; exits on stop or when the transport closes.
    pub fn run(&self, stop: &StopSignal) {
        // ====================================================================
        // Real-Time Scheduling: periodic release schedule
        // ====================================================================
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let mut rng = rand::rng();
        let mut next_release = Instant::now() + self.period;
        let mut late_releases: u64 = 0;
        let mut seq: u64 = 0;

        info!("Simulated turbine publishing every {:?}", self.period);

        while !stop.is_stopped() {
            let now = Instant::now();
            if now < next_release {
                sleeper.sleep(next_release - now);
            } else {
                late_releases += 1;
            }

            let payload = self.record(seq, &mut rng);
            if let Err(e) = self.tx.send(payload) {
                debug!("Transport closed: {}", e);
                break;
            }

            next_release += self.period;
            seq += 1;
        }

        debug!(
            "Simulated turbine stopped after {} records ({} late releases)",
            seq, late_releases
        );
    }

    pub fn spawn(self, stop: StopSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("turbine-sim".into())
            .spawn(move || self.run(&stop))
    }
}

/// (roll, pitch, yaw) → [x, y, z, w].
pub fn quaternion_from_euler(roll: f64, pitch: f64, yaw: f64) -> [f64; 4] {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();

    [
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    ]
}

/// Reads records from stdin, one per line.
///
/// The blocking read cannot observe the stop signal; the thread ends at EOF
/// or on the first line read after stop.
pub struct StdinSource {
    tx: Sender<String>,
}

impl StdinSource {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }

    pub fn run(&self, stop: &StopSignal) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            if stop.is_stopped() {
                break;
            }
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if self.tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
        info!("stdin source finished");
    }

    pub fn spawn(self, stop: StopSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("stdin-source".into())
            .spawn(move || self.run(&stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::features::{FeatureExtractor, euler_from_quaternion};
    use crossbeam::channel::unbounded;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn euler_round_trips_through_quaternion() {
        let [x, y, z, w] = quaternion_from_euler(0.1, -0.2, 0.3);
        let (r, p, yw) = euler_from_quaternion(x, y, z, w);
        assert!((r - 0.1).abs() < 1e-9);
        assert!((p + 0.2).abs() < 1e-9);
        assert!((yw - 0.3).abs() < 1e-9);
    }

    #[test]
    fn simulated_records_parse_near_the_profile() {
        let (tx, _rx) = unbounded();
        let layout = RecordLayout::default();
        let sim = SimulatedTurbine::new(Duration::from_millis(1), tx, layout.clone());
        let extractor = FeatureExtractor::new(layout);
        let mut rng = StdRng::seed_from_u64(3);

        for seq in 0..100 {
            let (_, f) = extractor.extract(&sim.record(seq, &mut rng)).unwrap();
            assert!(f.channel(0).abs() < 0.05);
            assert!((f.channel(3) - 0.6).abs() < 0.05);
            assert!((f.channel(5) - 0.5).abs() < 0.05);
        }
    }
}
