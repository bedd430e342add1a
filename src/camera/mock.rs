use super::backend::CameraBackend;
use super::types::CaptureSettings;
use crate::error::{CaptureError, DeviceError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, trace};

/// How many times each backend step ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub enumerate: u32,
    pub open: u32,
    pub configure_session: u32,
    pub submit_capture: u32,
    pub close_session: u32,
    pub close: u32,
}

struct MockState {
    cameras: Vec<String>,
    open_error: Option<DeviceError>,
    session_error: Option<CaptureError>,
    submit_error: Option<CaptureError>,
    image: Option<Vec<u8>>,
    capture_delay: Duration,
    session_delay: Duration,
    session_open: bool,
    last_settings: Option<CaptureSettings>,
    calls: MockCalls,
    sequence: u64,
}

/// Scriptable camera backend for tests and hardware-less runs.
///
/// Clones share state, so a test can keep one handle while the device owns
/// another.
#[derive(Clone)]
pub struct MockCameraBackend {
    state: Arc<Mutex<MockState>>,
    gate: Arc<RwLock<()>>,
}

impl MockCameraBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                cameras: vec!["/dev/video0".to_string()],
                open_error: None,
                session_error: None,
                submit_error: None,
                image: None,
                capture_delay: Duration::ZERO,
                session_delay: Duration::ZERO,
                session_open: false,
                last_settings: None,
                calls: MockCalls::default(),
                sequence: 0,
            })),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn without_cameras(self) -> Self {
        self.state.lock().cameras.clear();
        self
    }

    pub fn failing_open(self, error: DeviceError) -> Self {
        self.state.lock().open_error = Some(error);
        self
    }

    pub fn with_image(self, bytes: Vec<u8>) -> Self {
        self.state.lock().image = Some(bytes);
        self
    }

    pub fn with_capture_delay(self, delay: Duration) -> Self {
        self.state.lock().capture_delay = delay;
        self
    }

    pub fn with_session_delay(self, delay: Duration) -> Self {
        self.state.lock().session_delay = delay;
        self
    }

    /// A session was configured (or started configuring) and not yet closed
    pub fn session_open(&self) -> bool {
        self.state.lock().session_open
    }

    pub fn set_session_error(&self, error: Option<CaptureError>) {
        self.state.lock().session_error = error;
    }

    pub fn set_submit_error(&self, error: Option<CaptureError>) {
        self.state.lock().submit_error = error;
    }

    pub fn calls(&self) -> MockCalls {
        self.state.lock().calls
    }

    pub fn last_settings(&self) -> Option<CaptureSettings> {
        self.state.lock().last_settings
    }

    /// Block `submit_capture` until the returned guard is dropped
    pub async fn hold(&self) -> OwnedRwLockWriteGuard<()> {
        Arc::clone(&self.gate).write_owned().await
    }
}

impl Default for MockCameraBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Small but well-formed JPEG-shaped frame whose body varies with `sequence`
pub fn mock_jpeg(sequence: u64) -> Vec<u8> {
    let mut data = vec![
        0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01, 0x00,
        0x48, 0x00, 0x48, 0x00, 0x00,
    ];
    let pattern_size = 1000 + (sequence % 500) as usize;
    data.extend(vec![(sequence % 256) as u8; pattern_size]);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

#[async_trait]
impl CameraBackend for MockCameraBackend {
    async fn enumerate(&mut self) -> Result<Vec<String>, DeviceError> {
        let mut state = self.state.lock();
        state.calls.enumerate += 1;
        Ok(state.cameras.clone())
    }

    async fn open(&mut self, camera_id: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.calls.open += 1;
        debug!("Mock camera {} opened", camera_id);
        match state.open_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn configure_session(&mut self) -> Result<(), CaptureError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.configure_session += 1;
            state.session_open = true;
            if let Some(error) = state.session_error.clone() {
                return Err(error);
            }
            state.session_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn submit_capture(
        &mut self,
        settings: &CaptureSettings,
    ) -> Result<Vec<u8>, CaptureError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.submit_capture += 1;
            state.last_settings = Some(*settings);
            if let Some(error) = state.submit_error.clone() {
                return Err(error);
            }
            state.capture_delay
        };

        let _gate = self.gate.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.sequence += 1;
        let image = state
            .image
            .clone()
            .unwrap_or_else(|| mock_jpeg(state.sequence));
        trace!("Mock capture {} produced {} bytes", state.sequence, image.len());
        Ok(image)
    }

    async fn close_session(&mut self) {
        let mut state = self.state.lock();
        state.calls.close_session += 1;
        state.session_open = false;
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        state.calls.close += 1;
        state.session_open = false;
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
