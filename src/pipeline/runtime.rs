//! Assembles and owns every thread of a running pipeline:
//! subscriber, model-update listener, optional manifest watcher, power logger and
//! the inference loop (optionally core-pinned and at maximum priority).
//!
//! Producers feed the pipeline through `transport()`; model notifiers through
//! `model_updates()`. `shutdown()` stops everything, joins and hands back the logs.

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Sender, unbounded};
use log::{error, info, warn};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use super::controller::{PipelineContext, PipelineController};
use super::events::{EventBus, InferenceLog};
use super::publisher::{LogPublisher, ResultPublisher};
use super::shutdown::{StopHandle, StopOnExit, StopSignal, stop_pair};
use super::stats::PipelineStats;
use crate::acquisition::buffer::SampleBuffer;
use crate::acquisition::features::FeatureExtractor;
use crate::acquisition::subscriber::{RawTokenQueue, Subscriber};
use crate::config::PipelineConfig;
use crate::power::{PowerLog, PowerLogger, PowerSensor, SimulatedPowerSensor};
use crate::scoring::manager::{ManifestWatcher, ModelManager, ModelUpdate};
use crate::scoring::models::{BuiltinModelLoader, ModelLoader};

/// Pluggable edges of the pipeline.
pub struct PipelineParts {
    pub publisher: Box<dyn ResultPublisher>,
    pub power_sensor: Box<dyn PowerSensor>,
    pub loader: Arc<dyn ModelLoader>,
}

impl Default for PipelineParts {
    fn default() -> Self {
        Self {
            publisher: Box::new(LogPublisher),
            power_sensor: Box::new(SimulatedPowerSensor::default()),
            loader: Arc::new(BuiltinModelLoader),
        }
    }
}

/// What remains after the pipeline has been stopped and joined.
pub struct PipelineOutput {
    pub power_log: Arc<PowerLog>,
    pub inference_log: Arc<InferenceLog>,
    pub stats: Arc<PipelineStats>,
}

pub struct RunningPipeline {
    stop: StopHandle,
    signal: StopSignal,
    transport: Sender<String>,
    model_updates: Sender<ModelUpdate>,
    ctx: PipelineContext,
    power_log: Arc<PowerLog>,
    handles: Vec<JoinHandle<()>>,
}

impl RunningPipeline {
    pub fn start(config: Arc<PipelineConfig>, parts: PipelineParts) -> io::Result<Self> {
        let (stop, signal) = stop_pair();

        let inference_log = Arc::new(InferenceLog::new());
        let (events, events_rx) = EventBus::new(Arc::clone(&inference_log));
        let ctx = PipelineContext {
            config: Arc::clone(&config),
            buffer: Arc::new(SampleBuffer::new()),
            raw_tokens: Arc::new(RawTokenQueue::new()),
            models: Arc::new(ModelManager::new(parts.loader)),
            events,
            stats: Arc::new(PipelineStats::new()),
        };

        let mut handles = Vec::new();

        let (transport, transport_rx) = unbounded::<String>();
        let subscriber = Subscriber::new(
            transport_rx,
            FeatureExtractor::new(config.record.clone()),
            Arc::clone(&ctx.buffer),
            Arc::clone(&ctx.raw_tokens),
            Arc::clone(&ctx.stats),
        )
        .with_fault_injection(config.fault_injection.clone());
        handles.push(subscriber.spawn(signal.clone())?);

        let (model_updates, updates_rx) = unbounded::<ModelUpdate>();
        handles.push(ctx.models.spawn_listener(updates_rx, signal.clone())?);

        if let Some(path) = &config.model.manifest_path {
            let watcher = ManifestWatcher::new(
                path.clone(),
                config.model.manifest_poll_interval(),
                model_updates.clone(),
            );
            handles.push(watcher.spawn(signal.clone())?);
        }

        let power_log = Arc::new(PowerLog::new());
        let logger = PowerLogger::new(
            parts.power_sensor,
            events_rx,
            Arc::clone(&power_log),
            config.timing.power_sample_interval(),
        );
        handles.push(logger.spawn(stop.clone(), signal.clone())?);

        let controller = PipelineController::new(ctx.clone(), parts.publisher);
        handles.push(spawn_inference_loop(
            controller,
            &config,
            stop.clone(),
            signal.clone(),
        )?);

        if let Some(initial) = &config.model.initial {
            info!("Deploying initial model {}", initial);
            let _ = model_updates.send(ModelUpdate::Starting);
            let _ = model_updates.send(ModelUpdate::Ready(initial.clone()));
        }

        Ok(Self {
            stop,
            signal,
            transport,
            model_updates,
            ctx,
            power_log,
            handles,
        })
    }

    /// Sender for raw comma-separated records.
    pub fn transport(&self) -> Sender<String> {
        self.transport.clone()
    }

    pub fn model_updates(&self) -> Sender<ModelUpdate> {
        self.model_updates.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn shutdown(self) -> PipelineOutput {
        info!("Shutting down pipeline");
        self.stop.stop();
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                error!("Thread '{}' panicked", name);
            }
        }

        PipelineOutput {
            power_log: self.power_log,
            inference_log: Arc::clone(self.ctx.events.log()),
            stats: self.ctx.stats,
        }
    }
}

fn spawn_inference_loop(
    mut controller: PipelineController,
    config: &PipelineConfig,
    stop: StopHandle,
    signal: StopSignal,
) -> io::Result<JoinHandle<()>> {
    let pin_core = config.runtime.pin_core;
    let builder = thread::Builder::new().name("inference".into());

    if config.runtime.elevated_priority {
        builder.spawn_with_priority(ThreadPriority::Max, move |priority| {
            if let Err(e) = priority {
                warn!("Could not raise inference thread priority: {:?}", e);
            }
            let _guard = StopOnExit(stop);
            if let Some(core) = pin_core {
                pin_to_core(core);
            }
            controller.run(&signal);
        })
    } else {
        builder.spawn(move || {
            let _guard = StopOnExit(stop);
            if let Some(core) = pin_core {
                pin_to_core(core);
            }
            controller.run(&signal);
        })
    }
}

fn pin_to_core(core: usize) {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    match core_ids.get(core) {
        Some(id) if core_affinity::set_for_current(*id) => {
            info!("Inference loop pinned to core {}", core)
        }
        Some(_) => warn!("Failed to pin inference loop to core {}", core),
        None => warn!("Core {} not among available system cores", core),
    }
}
