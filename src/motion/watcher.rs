use super::input::InputSource;
use super::state::{EdgeFilter, LevelMapping, MotionState};
use crate::error::InputError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Watches one motion input and reports logical state changes.
///
/// The watcher owns the input for as long as it runs. If the input cannot be
/// configured the watcher stays inert and reports `InputUnavailable`.
pub struct MotionWatcher {
    line: String,
    mapping: LevelMapping,
    state: Arc<Mutex<MotionState>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MotionWatcher {
    pub fn new(line: impl Into<String>, mapping: LevelMapping) -> Self {
        Self {
            line: line.into(),
            mapping,
            state: Arc::new(Mutex::new(MotionState::Still)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Arm the input on both edges and start delivering changes to `callback`.
    ///
    /// The callback runs on the watcher task, in edge order, and only when the
    /// logical state actually changes.
    pub async fn start<F>(&self, mut input: Box<dyn InputSource>, callback: F) -> Result<(), InputError>
    where
        F: Fn(MotionState) + Send + Sync + 'static,
    {
        if self.is_running() {
            warn!("Motion watcher for {} already running", self.line);
            return Ok(());
        }

        if let Err(e) = input.configure().await {
            warn!("Motion input unavailable, watcher stays inert: {}", e);
            return Err(e);
        }

        info!("Watching motion input {}", input.line());

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let state = Arc::clone(&self.state);
        let mut filter = EdgeFilter::new(self.mapping);
        *state.lock() = filter.current();

        let task = tokio::spawn(async move {
            loop {
                let level = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    level = input.next_level() => level,
                };

                match level {
                    Ok(Some(level)) => match filter.update(level) {
                        Some(next) => {
                            debug!("Motion input {} -> {}", input.line(), next);
                            *state.lock() = next;
                            callback(next);
                        }
                        None => debug!("Duplicate level {} on {} suppressed", level, input.line()),
                    },
                    Ok(None) => {
                        info!("Motion input {} closed", input.line());
                        break;
                    }
                    Err(e) => {
                        warn!("Motion input stopped: {}", e);
                        break;
                    }
                }
            }
            debug!("Motion watcher task for {} finished", input.line());
        });

        *self.cancel.lock() = Some(cancel);
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Last logical state seen
    pub fn state(&self) -> MotionState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Release the input. Idempotent.
    pub async fn stop(&self) {
        let cancel = self.cancel.lock().take();
        let task = self.task.lock().take();

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        if let Some(task) = task {
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(_) => info!("Motion watcher for {} stopped", self.line),
                Err(_) => warn!("Motion watcher for {} did not stop in time", self.line),
            }
        }
    }
}
