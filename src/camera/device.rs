use super::backend::CameraBackend;
use super::types::{CaptureSettings, DeviceInfo, DeviceState, ImageFormat, ImagePayload, ImageSlot};
use crate::config::CameraConfig;
use crate::error::{CaptureError, DeviceError};
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handle state owned by the device; callers only ever see copies of it
struct DeviceHandle {
    state: DeviceState,
    info: Option<DeviceInfo>,
    slot: Option<ImageSlot>,
}

/// Owns the camera hardware and runs one still capture at a time.
///
/// Constructed once at startup and shared by reference (`Arc`) with the
/// orchestrator and any manual trigger path.
pub struct CaptureDevice {
    config: CameraConfig,
    handle: Mutex<DeviceHandle>,
    backend: tokio::sync::Mutex<Box<dyn CameraBackend>>,
}

impl CaptureDevice {
    pub fn new(config: CameraConfig, backend: Box<dyn CameraBackend>) -> Self {
        Self {
            config,
            handle: Mutex::new(DeviceHandle {
                state: DeviceState::Closed,
                info: None,
                slot: None,
            }),
            backend: tokio::sync::Mutex::new(backend),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.handle.lock().state
    }

    /// True when a capture may be issued
    pub fn is_open(&self) -> bool {
        matches!(
            self.state(),
            DeviceState::Open | DeviceState::CaptureSessionActive
        )
    }

    pub fn info(&self) -> Option<DeviceInfo> {
        self.handle.lock().info.clone()
    }

    /// Find a camera and open it, allocating the image slot.
    ///
    /// Opening an already open device returns its current info.
    pub async fn open(&self) -> Result<DeviceInfo, DeviceError> {
        {
            let mut handle = self.handle.lock();
            match handle.state {
                DeviceState::Closed => handle.state = DeviceState::Opening,
                DeviceState::Open | DeviceState::CaptureSessionActive => {
                    if let Some(info) = handle.info.clone() {
                        return Ok(info);
                    }
                }
                DeviceState::Opening | DeviceState::Closing => {
                    return Err(DeviceError::Backend {
                        details: format!("Camera is {}", handle.state),
                    });
                }
            }
        }

        let result = self.open_backend().await;

        let mut handle = self.handle.lock();
        if handle.state != DeviceState::Opening {
            return Err(DeviceError::Backend {
                details: "camera closed while opening".to_string(),
            });
        }
        match result {
            Ok((info, slot)) => {
                info!(
                    "Camera {} open ({}x{} {:?}, {} byte slot)",
                    info.camera_id,
                    info.resolution.0,
                    info.resolution.1,
                    info.format,
                    info.slot_capacity
                );
                handle.state = DeviceState::Open;
                handle.info = Some(info.clone());
                handle.slot = Some(slot);
                Ok(info)
            }
            Err(e) => {
                error!("Failed to open camera: {}", e);
                handle.state = DeviceState::Closed;
                Err(e)
            }
        }
    }

    async fn open_backend(&self) -> Result<(DeviceInfo, ImageSlot), DeviceError> {
        let format = ImageFormat::from_config(&self.config.format).ok_or_else(|| {
            DeviceError::Backend {
                details: format!("Unsupported camera format '{}'", self.config.format),
            }
        })?;

        let mut backend = self.backend.lock().await;
        let cameras = backend.enumerate().await?;
        let camera_id = cameras.into_iter().next().ok_or_else(|| {
            warn!("No cameras found");
            DeviceError::NoDeviceFound
        })?;

        debug!("Opening camera {} via {} backend", camera_id, backend.name());
        backend.open(&camera_id).await?;

        let (width, height) = self.config.resolution;
        let capacity = format.slot_capacity(width, height);

        Ok((
            DeviceInfo {
                camera_id,
                resolution: self.config.resolution,
                format,
                slot_capacity: capacity,
            },
            ImageSlot::new(capacity),
        ))
    }

    /// Run one capture: session setup, a single still request, session teardown.
    ///
    /// Never retries. The session is closed on every exit path, including
    /// timeout and cancellation.
    pub async fn capture(&self, cancel: &CancellationToken) -> Result<ImagePayload, CaptureError> {
        let info = self.begin_session()?;

        let mut backend = self.backend.lock().await;
        let capture_timeout = self.config.capture_timeout();
        let session_timeout = self.config.session_timeout();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
            outcome = timeout(
                capture_timeout,
                Self::run_session(&mut **backend, session_timeout),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(CaptureError::Timeout {
                    millis: duration_millis(capture_timeout),
                }),
            },
        };

        backend.close_session().await;
        drop(backend);

        let result = result.and_then(|bytes| self.deliver(bytes, &info));
        self.end_session();

        match &result {
            Ok(payload) => debug!("Capture delivered {} bytes", payload.len()),
            Err(e) => warn!("Capture failed: {}", e),
        }
        result
    }

    async fn run_session(
        backend: &mut dyn CameraBackend,
        session_timeout: Duration,
    ) -> Result<Vec<u8>, CaptureError> {
        match timeout(session_timeout, backend.configure_session()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::SessionConfigFailed {
                    details: format!(
                        "session not ready after {}ms",
                        duration_millis(session_timeout)
                    ),
                })
            }
        }
        debug!("Capture session ready, submitting still request");

        backend.submit_capture(&CaptureSettings::default()).await
    }

    fn begin_session(&self) -> Result<DeviceInfo, CaptureError> {
        let mut handle = self.handle.lock();
        match handle.state {
            DeviceState::Open => {
                let info = handle.info.clone().ok_or(CaptureError::NotOpen)?;
                handle.state = DeviceState::CaptureSessionActive;
                Ok(info)
            }
            DeviceState::CaptureSessionActive => Err(CaptureError::CaptureSubmitFailed {
                details: "a capture session is already active".to_string(),
            }),
            DeviceState::Closed | DeviceState::Opening | DeviceState::Closing => {
                warn!("Cannot capture image. Camera not initialized.");
                Err(CaptureError::NotOpen)
            }
        }
    }

    fn end_session(&self) {
        let mut handle = self.handle.lock();
        if handle.state == DeviceState::CaptureSessionActive {
            handle.state = DeviceState::Open;
        }
    }

    /// Move the captured bytes through the single image slot
    fn deliver(&self, bytes: Vec<u8>, info: &DeviceInfo) -> Result<ImagePayload, CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::CaptureSubmitFailed {
                details: "camera delivered an empty image".to_string(),
            });
        }

        let mut handle = self.handle.lock();
        let slot = handle.slot.as_mut().ok_or(CaptureError::NotOpen)?;
        slot.fill(bytes)?;
        let bytes = slot.take().ok_or(CaptureError::NotOpen)?;

        Ok(ImagePayload::new(
            bytes,
            SystemTime::now(),
            info.format,
            info.resolution,
        ))
    }

    /// Release the camera. Idempotent; waits for a running capture to let go.
    pub async fn close(&self) {
        {
            let mut handle = self.handle.lock();
            if matches!(handle.state, DeviceState::Closed | DeviceState::Closing) {
                return;
            }
            handle.state = DeviceState::Closing;
        }

        {
            let mut backend = self.backend.lock().await;
            backend.close_session().await;
            backend.close().await;
        }

        let mut handle = self.handle.lock();
        handle.state = DeviceState::Closed;
        handle.info = None;
        handle.slot = None;
        info!("Camera closed");
    }
}

fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}
