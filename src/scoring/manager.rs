//! Model hot-swap state machine.
//!
//! States: `Inactive` → (`Starting`) → `Loading { previous }` → (`Ready(name, version)`) → `Active`.
//! - the controller reads the active model by cloning an `Arc` under a read lock,
//!   so a swap is a single pointer replacement from its point of view
//! - loading runs outside the state lock; readers never wait on a model load
//! - a ready notification naming the model already in use restores the previous
//!   active model instead of leaving the manager in `Loading`
//!
//! Update notifications arrive as typed messages on a crossbeam channel, produced
//! by the manifest watcher (or any other out-of-band source).

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, SystemTime},
};

use crossbeam::channel::{Receiver, Sender, select};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::ReconstructionModel;
use super::models::ModelLoader;
use crate::pipeline::shutdown::StopSignal;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub version: String,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// A fully constructed model together with its identity.
#[derive(Clone)]
pub struct ActiveModel {
    pub descriptor: ModelDescriptor,
    pub model: Arc<dyn ReconstructionModel>,
}

impl fmt::Debug for ActiveModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveModel")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

enum ModelState {
    Inactive,
    Loading { previous: Option<ActiveModel> },
    Active(ActiveModel),
}

/// Public view of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Inactive,
    Loading,
    Active(ModelDescriptor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUpdate {
    Starting,
    Ready(ModelDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Swapped,
    /// Ready named the model already in use; the previous active model was restored.
    Unchanged,
    /// Loading failed; the previous active model (if any) was restored.
    Failed,
}

pub struct ModelManager {
    state: RwLock<ModelState>,
    loader: Arc<dyn ModelLoader>,
    // Serializes state transitions; reads only take `state`.
    transition: Mutex<()>,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            state: RwLock::new(ModelState::Inactive),
            loader,
            transition: Mutex::new(()),
        }
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.state.read() {
            ModelState::Inactive => ModelStatus::Inactive,
            ModelState::Loading { .. } => ModelStatus::Loading,
            ModelState::Active(m) => ModelStatus::Active(m.descriptor.clone()),
        }
    }

    /// The model a scoring cycle should use, or `None` while not active.
    pub fn active(&self) -> Option<ActiveModel> {
        match &*self.state.read() {
            ModelState::Active(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.read(), ModelState::Active(_))
    }

    pub fn update_starting(&self) {
        let _guard = self.transition.lock();
        let mut state = self.state.write();
        let previous = match std::mem::replace(&mut *state, ModelState::Inactive) {
            ModelState::Active(m) => Some(m),
            ModelState::Loading { previous } => previous,
            ModelState::Inactive => None,
        };
        *state = ModelState::Loading { previous };
        info!("Model update starting, inference paused");
    }

    pub fn update_ready(&self, descriptor: ModelDescriptor) -> UpdateOutcome {
        let _guard = self.transition.lock();

        let current = match &*self.state.read() {
            ModelState::Active(m) => Some(m.descriptor.clone()),
            ModelState::Loading { previous: Some(m) } => Some(m.descriptor.clone()),
            _ => None,
        };

        if current.as_ref() == Some(&descriptor) {
            info!("Job update failed - keeping current model running ({})", descriptor);
            restore_previous(&mut self.state.write());
            return UpdateOutcome::Unchanged;
        }

        match self.loader.load(&descriptor) {
            Ok(model) => {
                let replaced = std::mem::replace(
                    &mut *self.state.write(),
                    ModelState::Active(ActiveModel {
                        descriptor: descriptor.clone(),
                        model,
                    }),
                );
                // Prior handle is released here, outside the lock.
                drop(replaced);
                info!("New model deployed: {}", descriptor);
                UpdateOutcome::Swapped
            }
            Err(e) => {
                error!("Failed to load model {}: {}", descriptor, e);
                restore_previous(&mut self.state.write());
                UpdateOutcome::Failed
            }
        }
    }

    pub fn apply(&self, update: ModelUpdate) {
        match update {
            ModelUpdate::Starting => self.update_starting(),
            ModelUpdate::Ready(descriptor) => {
                self.update_ready(descriptor);
            }
        }
    }

    /// Drains update notifications until stop or until every sender is gone.
    pub fn spawn_listener(
        self: &Arc<Self>,
        rx: Receiver<ModelUpdate>,
        stop: StopSignal,
    ) -> io::Result<JoinHandle<()>> {
        let manager = Arc::clone(self);
        thread::Builder::new()
            .name("model-updates".into())
            .spawn(move || {
                loop {
                    select! {
                        recv(rx) -> msg => match msg {
                            Ok(update) => manager.apply(update),
                            Err(_) => break,
                        },
                        recv(stop.receiver()) -> _ => break,
                    }
                }
                debug!("Model update listener stopped");
            })
    }
}

fn restore_previous(state: &mut ModelState) {
    let previous = match state {
        ModelState::Loading { previous } => previous.take(),
        _ => return,
    };
    *state = match previous {
        Some(m) => ModelState::Active(m),
        None => ModelState::Inactive,
    };
}

// ============================================================================
// Manifest watcher
// ============================================================================

/// Polls a TOML manifest (`name`, `version`) and turns mtime changes into
/// `Starting` / `Ready` notifications.
pub struct ManifestWatcher {
    path: PathBuf,
    poll_interval: Duration,
    debounce: Duration,
    tx: Sender<ModelUpdate>,
    last_mtime: Option<SystemTime>,
}

impl ManifestWatcher {
    pub fn new(path: PathBuf, poll_interval: Duration, tx: Sender<ModelUpdate>) -> Self {
        Self {
            path,
            poll_interval,
            debounce: Duration::from_millis(500),
            tx,
            last_mtime: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn read_manifest(&self) -> Result<ModelDescriptor, String> {
        let text = fs::read_to_string(&self.path).map_err(|e| e.to_string())?;
        toml::from_str(&text).map_err(|e| e.to_string())
    }

    /// One poll step. Returns `false` once the update channel is closed.
    pub fn poll_once(&mut self, stop: &StopSignal) -> bool {
        let current = match mtime(&self.path) {
            Some(t) => t,
            None => {
                if self.last_mtime.take().is_some() {
                    warn!(
                        "Model manifest {} not accessible, keeping current model",
                        self.path.display()
                    );
                }
                return true;
            }
        };

        if self.last_mtime == Some(current) {
            return true;
        }

        // Wait out partial writes before reading.
        if stop.wait(self.debounce) {
            return true;
        }
        if mtime(&self.path) != Some(current) {
            return true;
        }
        self.last_mtime = Some(current);

        info!("Model manifest changed: {}", self.path.display());
        if self.tx.send(ModelUpdate::Starting).is_err() {
            return false;
        }

        match self.read_manifest() {
            Ok(descriptor) => self.tx.send(ModelUpdate::Ready(descriptor)).is_ok(),
            Err(e) => {
                error!(
                    "Model manifest {} unreadable ({}); inference paused until a valid manifest is published",
                    self.path.display(),
                    e
                );
                true
            }
        }
    }

    pub fn spawn(mut self, stop: StopSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("manifest-watcher".into())
            .spawn(move || {
                info!("Model manifest watcher started: {}", self.path.display());
                loop {
                    if !self.poll_once(&stop) || stop.wait(self.poll_interval) {
                        break;
                    }
                }
                debug!("Model manifest watcher stopped");
            })
    }
}

fn mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
