//! Ingestion+inference loop.
//!
//! Each iteration:
//! 1. forward queued raw token sets to the publisher
//! 2. idle (model poll interval) while no model is active
//! 3. idle (buffering poll interval) while the buffer holds `<= min_fill` samples
//! 4. otherwise run one cycle: start event → snapshot → preprocess → windows → score →
//!    evaluate → publish → end event → evict oldest sample
//! 5. sleep the inter-cycle interval
//!
//! A failed cycle (bad reconstruction shape, model fault, short series) is logged and
//! skipped; its inference number is still consumed and its events still emitted.

use std::{sync::Arc, time::Instant};

use log::{error, info, warn};
use thiserror::Error;

use super::events::{EventBus, LifecycleEvent};
use super::publisher::{AnomalyResult, ResultPublisher};
use super::shutdown::StopSignal;
use super::stats::PipelineStats;
use crate::acquisition::buffer::SampleBuffer;
use crate::acquisition::features::{CHANNEL_NAMES, FeatureVector};
use crate::acquisition::subscriber::RawTokenQueue;
use crate::clock;
use crate::config::PipelineConfig;
use crate::processing::preprocess::{PreprocessError, Preprocessor};
use crate::processing::window::create_windows;
use crate::scoring::evaluator::{Evaluation, evaluate};
use crate::scoring::manager::{ActiveModel, ModelManager};
use crate::scoring::{self, ReconstructionModel, ScoringError};

/// Shared state handed to every component of a running pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub buffer: Arc<SampleBuffer>,
    pub raw_tokens: Arc<RawTokenQueue>,
    pub models: Arc<ModelManager>,
    pub events: EventBus,
    pub stats: Arc<PipelineStats>,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(AnomalyResult),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopStep {
    WaitingForModel,
    Buffering { size: usize },
    Cycle { inference: u64, outcome: CycleOutcome },
}

pub struct PipelineController {
    ctx: PipelineContext,
    preprocessor: Preprocessor,
    publisher: Box<dyn ResultPublisher>,
    inference_count: u64,
    last_logged_fill: Option<usize>,
}

impl PipelineController {
    pub fn new(ctx: PipelineContext, publisher: Box<dyn ResultPublisher>) -> Self {
        let preprocessor = Preprocessor::from_config(&ctx.config);
        Self {
            ctx,
            preprocessor,
            publisher,
            inference_count: 0,
            last_logged_fill: None,
        }
    }

    pub fn inference_count(&self) -> u64 {
        self.inference_count
    }

    /// Hands every queued raw token set to the publisher. Returns how many were sent.
    pub fn forward_raw_tokens(&self) -> usize {
        let mut forwarded = 0;
        while let Some(tokens) = self.ctx.raw_tokens.pop() {
            self.publisher.publish_raw(&tokens);
            forwarded += 1;
        }
        forwarded
    }

    /// One loop iteration without the trailing sleep.
    pub fn step(&mut self) -> LoopStep {
        self.forward_raw_tokens();

        let Some(active) = self.ctx.models.active() else {
            info!("Waiting for the model...");
            return LoopStep::WaitingForModel;
        };

        let status = self.ctx.buffer.status(self.ctx.config.window.min_fill);
        if !status.is_ready {
            let size = status.current_size;
            if size % 10 == 0 && self.last_logged_fill != Some(size) {
                info!(
                    "Buffering {}/{} ({:.0}%)... please wait",
                    size, status.required_size, status.fill_percent
                );
                self.last_logged_fill = Some(size);
            }
            return LoopStep::Buffering { size };
        }

        self.run_cycle(active)
    }

    /// Preprocess → window → score → evaluate on one snapshot.
    pub fn evaluate_snapshot(
        &self,
        samples: &[FeatureVector],
        model: &dyn ReconstructionModel,
    ) -> Result<Evaluation, CycleError> {
        let window = &self.ctx.config.window;
        let series = self.preprocessor.run(samples)?;
        let batch = create_windows(&series, window.window_length, window.stride);
        let reconstruction = scoring::score(model, &batch)?;
        Ok(evaluate(
            &batch,
            &reconstruction,
            &self.ctx.config.statistics.thresholds,
        )?)
    }

    fn run_cycle(&mut self, active: ActiveModel) -> LoopStep {
        self.inference_count += 1;
        let inference = self.inference_count;
        let started = Instant::now();

        self.ctx.events.emit(LifecycleEvent::start(inference));

        let snapshot = self.ctx.buffer.snapshot();
        let outcome = match self.evaluate_snapshot(&snapshot, active.model.as_ref()) {
            Ok(evaluation) => {
                let anomalous = evaluation.is_anomalous();
                if anomalous {
                    let channels: Vec<&str> = evaluation
                        .flagged_channels()
                        .into_iter()
                        .map(|c| CHANNEL_NAMES.get(c).copied().unwrap_or("?"))
                        .collect();
                    warn!("Anomaly detected: {:?}", channels);
                } else {
                    info!("Ok");
                }

                let result = AnomalyResult::new(evaluation, &active.descriptor, clock::now_iso());
                self.publisher.publish_inference(&result);
                self.ctx.stats.cycle_completed(started.elapsed(), anomalous);
                CycleOutcome::Completed(result)
            }
            Err(e) => {
                error!("Inference no.{} skipped: {}", inference, e);
                self.ctx.stats.cycle_skipped();
                CycleOutcome::Skipped(e.to_string())
            }
        };

        self.ctx.events.emit(LifecycleEvent::end(inference));
        self.ctx.buffer.evict_oldest();

        LoopStep::Cycle { inference, outcome }
    }

    pub fn run(&mut self, stop: &StopSignal) {
        info!("Inference loop started");
        let timing = self.ctx.config.timing.clone();

        while !stop.is_stopped() {
            let pause = match self.step() {
                LoopStep::WaitingForModel => timing.model_poll_interval(),
                LoopStep::Buffering { .. } => timing.buffering_poll_interval(),
                LoopStep::Cycle { .. } => timing.prediction_interval(),
            };
            if stop.wait(pause) {
                break;
            }
        }

        self.forward_raw_tokens();
        info!(
            "Inference loop stopped after {} inferences",
            self.inference_count
        );
    }
}
