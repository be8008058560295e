//! # turbine_edge entry point
//!
//! Runs the edge pipeline against a record source until Ctrl-C (or `--duration-secs`),
//! then persists the power and inference logs.
//!
//! ## Sources
//! - default: simulated turbine emitting one record per `--sample-period-ms`
//! - `--stdin`: one comma-separated record per input line
//!
//! ## Outputs
//! - `<logs dir>/power_log_<stamp>.csv`
//! - `<logs dir>/inference_log_<stamp>.csv`

use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use turbine_edge::acquisition::simulator::{SimulatedTurbine, StdinSource};
use turbine_edge::config::PipelineConfig;
use turbine_edge::persistence::LogFlusher;
use turbine_edge::pipeline::runtime::{PipelineParts, RunningPipeline};
use turbine_edge::pipeline::shutdown::StopHandle;

#[derive(Debug, Parser)]
#[command(name = "turbine_edge", about = "Wind turbine edge anomaly detection pipeline")]
struct Args {
    /// Pipeline configuration file (TOML).
    #[arg(short, long, env = "TURBINE_EDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Read records from standard input instead of the simulator.
    #[arg(long)]
    stdin: bool,

    /// Simulator record period.
    #[arg(long, default_value_t = 10)]
    sample_period_ms: u64,

    /// Stop on its own after this many seconds.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Overrides the configured log output directory.
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Corrupt incoming records with the configured fault probabilities.
    #[arg(long)]
    fault_injection: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("=== TURBINE EDGE START ===");

    let mut config = PipelineConfig::load(args.config.as_deref()).context("loading config")?;
    if let Some(dir) = args.logs_dir {
        config.logs.output_dir = dir;
    }
    if args.fault_injection {
        config.fault_injection.enabled = true;
    }
    config.validate().context("validating config")?;
    let config = Arc::new(config);

    let flusher = LogFlusher::new(config.logs.output_dir.clone());
    let pipeline = RunningPipeline::start(Arc::clone(&config), PipelineParts::default())
        .context("starting pipeline")?;
    let stop = pipeline.stop_handle();
    let signal = pipeline.stop_signal();

    // The stdin reader blocks on input and is left detached at shutdown.
    let simulator = if args.stdin {
        StdinSource::new(pipeline.transport())
            .spawn(signal.clone())
            .context("starting stdin source")?;
        None
    } else {
        let handle = SimulatedTurbine::new(
            Duration::from_millis(args.sample_period_ms),
            pipeline.transport(),
            config.record.clone(),
        )
        .spawn(signal.clone())
        .context("starting simulator")?;
        Some(handle)
    };

    spawn_ctrl_c_listener(stop.clone()).context("installing Ctrl-C handler")?;

    match args.duration_secs {
        Some(secs) => {
            info!("Running for {} seconds (Ctrl-C stops early)", secs);
            if !signal.wait(Duration::from_secs(secs)) {
                stop.stop();
            }
        }
        None => {
            info!("Running until Ctrl-C");
            signal.wait_forever();
        }
    }

    let output = pipeline.shutdown();
    if let Some(handle) = simulator {
        if handle.join().is_err() {
            error!("Simulator panicked");
        }
    }

    flusher
        .flush_all(&output.power_log, &output.inference_log)
        .context("saving logs")?;
    output.stats.log_summary();

    info!("=== TURBINE EDGE FINISHED ===");
    Ok(())
}

/// Waits for Ctrl-C on a single-threaded tokio runtime, then trips the stop handle.
fn spawn_ctrl_c_listener(stop: StopHandle) -> std::io::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            match rt.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    info!("Ctrl-C received, stopping");
                    stop.stop();
                }
                Err(e) => error!("Ctrl-C listener failed: {}", e),
            }
        })?;
    Ok(())
}
