use super::types::CaptureSettings;
use crate::error::{CaptureError, DeviceError};
use async_trait::async_trait;

/// Hardware seam for the capture device.
///
/// Calls arrive strictly in lifecycle order from `CaptureDevice`:
/// `enumerate` → `open` → (`configure_session` → `submit_capture` →
/// `close_session`)* → `close`. Implementations never see two sessions at once.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// List camera identifiers available on this system
    async fn enumerate(&mut self) -> Result<Vec<String>, DeviceError>;

    /// Open the camera identified by `camera_id`
    async fn open(&mut self, camera_id: &str) -> Result<(), DeviceError>;

    /// Negotiate a capture session bound to the image output
    async fn configure_session(&mut self) -> Result<(), CaptureError>;

    /// Submit one still-capture request and wait for its image bytes
    async fn submit_capture(&mut self, settings: &CaptureSettings)
        -> Result<Vec<u8>, CaptureError>;

    /// Tear down the current capture session; no-op without one
    async fn close_session(&mut self);

    /// Release the camera; no-op when not open
    async fn close(&mut self);

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Stands in when no hardware backend could be created; every open fails
pub struct UnavailableBackend {
    reason: DeviceError,
}

impl UnavailableBackend {
    pub fn new(reason: DeviceError) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl CameraBackend for UnavailableBackend {
    async fn enumerate(&mut self) -> Result<Vec<String>, DeviceError> {
        Err(self.reason.clone())
    }

    async fn open(&mut self, _camera_id: &str) -> Result<(), DeviceError> {
        Err(self.reason.clone())
    }

    async fn configure_session(&mut self) -> Result<(), CaptureError> {
        Err(CaptureError::NotOpen)
    }

    async fn submit_capture(
        &mut self,
        _settings: &CaptureSettings,
    ) -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::NotOpen)
    }

    async fn close_session(&mut self) {}

    async fn close(&mut self) {}

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
