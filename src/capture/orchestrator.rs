use super::request::{CaptureRequest, TriggerSource};
use crate::camera::CaptureDevice;
use crate::error::CaptureError;
use crate::events::{DoorbellEvent, EventBus};
use crate::motion::MotionState;
use crate::upload::{UploadOutcome, UploadStage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrchestratorState {
    Idle,
    CaptureInFlight,
    Uploading,
}

/// Result of offering a trigger to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A capture cycle was started for this request
    Accepted(CaptureRequest),
    /// A cycle was already running
    Dropped { state: OrchestratorState },
    /// The camera cannot take pictures
    Rejected(CaptureError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub accepted: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub captures_failed: u64,
    pub uploads_completed: u64,
    pub uploads_failed: u64,
    pub uploads_skipped: u64,
}

struct Inner {
    device: Arc<CaptureDevice>,
    uploader: Arc<UploadStage>,
    event_bus: Arc<EventBus>,
    state: watch::Sender<OrchestratorState>,
    status: watch::Sender<MotionState>,
    next_id: AtomicU64,
    stats: Mutex<OrchestratorStats>,
    capture_cancel: CancellationToken,
    upload_cancel: CancellationToken,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

/// Turns triggers into capture-then-upload cycles, one at a time.
///
/// `Idle -> CaptureInFlight -> Uploading -> Idle`. Triggers arriving while a
/// cycle runs are dropped, never queued. Errors end the cycle and are reported
/// on the event bus; nothing escapes the cycle task.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    inner: Arc<Inner>,
}

/// Returns the orchestrator to `Idle` however the cycle ends
struct IdleOnDrop<'a>(&'a watch::Sender<OrchestratorState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(OrchestratorState::Idle);
    }
}

impl CaptureOrchestrator {
    pub fn new(
        device: Arc<CaptureDevice>,
        uploader: Arc<UploadStage>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Idle);
        let (status, _) = watch::channel(MotionState::Still);

        Self {
            inner: Arc::new(Inner {
                device,
                uploader,
                event_bus,
                state,
                status,
                next_id: AtomicU64::new(0),
                stats: Mutex::new(OrchestratorStats::default()),
                capture_cancel: CancellationToken::new(),
                upload_cancel: CancellationToken::new(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.inner.device
    }

    pub fn uploader_name(&self) -> &str {
        self.inner.uploader.sink_name()
    }

    pub fn state(&self) -> OrchestratorState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.inner.state.subscribe()
    }

    /// Still/Moving as last reported by the motion watcher
    pub fn status(&self) -> MotionState {
        *self.inner.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MotionState> {
        self.inner.status.subscribe()
    }

    pub fn stats(&self) -> OrchestratorStats {
        *self.inner.stats.lock()
    }

    /// Offer a trigger. Must be called from within the tokio runtime.
    pub fn trigger(&self, source: TriggerSource) -> TriggerOutcome {
        let inner = &self.inner;

        if inner.capture_cancel.is_cancelled() {
            debug!("{:?} trigger ignored during shutdown", source);
            return TriggerOutcome::Rejected(CaptureError::Cancelled);
        }

        if !inner.device.is_open() {
            warn!("Cannot capture image. Camera not initialized.");
            inner.stats.lock().rejected += 1;
            inner.event_bus.emit(DoorbellEvent::TriggerRejected {
                source,
                reason: CaptureError::NotOpen.to_string(),
            });
            return TriggerOutcome::Rejected(CaptureError::NotOpen);
        }

        let mut observed = OrchestratorState::Idle;
        let claimed = inner.state.send_if_modified(|state| {
            observed = *state;
            if *state == OrchestratorState::Idle {
                *state = OrchestratorState::CaptureInFlight;
                true
            } else {
                false
            }
        });

        if !claimed {
            inner.stats.lock().dropped += 1;
            inner.event_bus.emit(DoorbellEvent::TriggerDropped {
                source,
                state: observed,
            });
            return TriggerOutcome::Dropped { state: observed };
        }

        let request = CaptureRequest::new(inner.next_id.fetch_add(1, Ordering::SeqCst) + 1, source);
        inner.stats.lock().accepted += 1;
        inner.event_bus.emit(DoorbellEvent::CaptureTriggered {
            request_id: request.id,
            source,
            timestamp: request.submitted_at,
        });
        info!("Capture {} started ({:?})", request.id, source);

        // Spawn under the lock so a later cycle's handle cannot be overwritten
        let mut in_flight = inner.in_flight.lock();
        let cycle_inner = Arc::clone(inner);
        let cycle_request = request.clone();
        *in_flight = Some(tokio::spawn(async move {
            Self::run_cycle(cycle_inner, cycle_request).await;
        }));

        TriggerOutcome::Accepted(request)
    }

    /// Motion watcher callback: updates the status text and triggers on `Moving`
    pub fn on_motion(&self, state: MotionState) -> Option<TriggerOutcome> {
        self.inner.status.send_replace(state);
        self.inner.event_bus.emit(DoorbellEvent::MotionChanged {
            state,
            timestamp: SystemTime::now(),
        });

        match state {
            MotionState::Moving => Some(self.trigger(TriggerSource::Motion)),
            MotionState::Still => None,
        }
    }

    /// Resolve once no cycle is running
    pub async fn wait_until_idle(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == OrchestratorState::Idle).await;
    }

    async fn run_cycle(inner: Arc<Inner>, request: CaptureRequest) {
        let _idle = IdleOnDrop(&inner.state);

        let payload = match inner.device.capture(&inner.capture_cancel).await {
            Ok(payload) => payload,
            Err(e) => {
                inner.stats.lock().captures_failed += 1;
                inner.event_bus.emit(DoorbellEvent::CaptureFailed {
                    request_id: request.id,
                    error: e.to_string(),
                });
                return;
            }
        };

        inner.event_bus.emit(DoorbellEvent::CaptureCompleted {
            request_id: request.id,
            bytes: payload.len(),
        });
        inner.state.send_replace(OrchestratorState::Uploading);

        match inner.uploader.upload(payload, &inner.upload_cancel).await {
            Ok(UploadOutcome::Written { key }) => {
                inner.stats.lock().uploads_completed += 1;
                inner.event_bus.emit(DoorbellEvent::UploadCompleted {
                    request_id: request.id,
                    key,
                });
            }
            Ok(UploadOutcome::Skipped) => {
                inner.stats.lock().uploads_skipped += 1;
                inner.event_bus.emit(DoorbellEvent::UploadSkipped {
                    request_id: request.id,
                });
            }
            Err(e) => {
                inner.stats.lock().uploads_failed += 1;
                inner.event_bus.emit(DoorbellEvent::UploadFailed {
                    request_id: request.id,
                    error: e.to_string(),
                });
            }
        }
        debug!("Capture {} cycle finished", request.id);
    }

    /// Stop accepting triggers, abandon any capture, give a pending upload up
    /// to `timeout` to finish, then close the camera.
    pub async fn shutdown(&self, timeout: Duration) {
        let inner = &self.inner;
        info!("Shutting down capture orchestrator");
        inner.capture_cancel.cancel();

        let handle = inner.in_flight.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                warn!(
                    "Upload still running after {:?}, abandoning it",
                    timeout
                );
                inner.upload_cancel.cancel();
                if let Err(e) = handle.await {
                    error!("Capture cycle task failed: {}", e);
                }
            }
        }
        inner.upload_cancel.cancel();

        inner.device.close().await;
        inner.event_bus.emit(DoorbellEvent::CameraStatusChanged {
            connected: false,
            timestamp: SystemTime::now(),
        });
        info!("Capture orchestrator stopped");
    }
}
