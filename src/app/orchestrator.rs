use super::types::{ComponentState, ShutdownReason};
use crate::camera::{self, CameraBackend, CaptureDevice, MockCameraBackend, UnavailableBackend};
use crate::capture::CaptureOrchestrator;
use crate::config::DoorbellConfig;
use crate::error::{InputError, Result};
use crate::events::EventBus;
use crate::keyboard_input::KeyboardInputHandler;
use crate::motion::{self, InputSource, LevelMapping, MotionWatcher};
use crate::upload::{FirebaseSink, RemoteSink, UploadStage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Motion input as opened at wiring time; the error is reported on start
pub type MotionInput = std::result::Result<Box<dyn InputSource>, InputError>;

/// Process-level wiring: owns the single capture device, the motion watcher
/// and the orchestrator, and drives their startup and shutdown.
pub struct DoorbellApp {
    pub(super) config: DoorbellConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) orchestrator: CaptureOrchestrator,
    pub(super) watcher: MotionWatcher,
    pub(super) motion_input: parking_lot::Mutex<Option<MotionInput>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl DoorbellApp {
    /// Wire the app from explicit parts. `motion_input` is `None` when motion
    /// watching is disabled.
    pub fn new(
        config: DoorbellConfig,
        backend: Box<dyn CameraBackend>,
        sink: Arc<dyn RemoteSink>,
        motion_input: Option<MotionInput>,
    ) -> Result<Self> {
        config.validate()?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let device = Arc::new(CaptureDevice::new(config.camera.clone(), backend));
        let uploader = Arc::new(UploadStage::new(sink, &config.sink));
        let orchestrator = CaptureOrchestrator::new(device, uploader, Arc::clone(&event_bus));
        let watcher = MotionWatcher::new(
            config.motion.line.clone(),
            LevelMapping::from_active_high(config.motion.active_high),
        );
        let keyboard_handler = Some(KeyboardInputHandler::new(
            orchestrator.clone(),
            Arc::clone(&event_bus),
        ));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            keyboard_enabled: config.system.keyboard_trigger,
            config,
            event_bus,
            orchestrator,
            watcher,
            motion_input: parking_lot::Mutex::new(motion_input),
            keyboard_handler,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Wire the app against real hardware and the configured database.
    ///
    /// Hardware that cannot be reached is reported and left degraded; only an
    /// invalid configuration or sink setup fails here.
    pub fn from_config(config: DoorbellConfig, mock_camera: bool) -> Result<Self> {
        let backend: Box<dyn CameraBackend> = if mock_camera {
            info!("Using mock camera backend");
            Box::new(MockCameraBackend::new())
        } else {
            match camera::hardware_backend(&config.camera) {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("Camera backend unavailable: {}", e);
                    Box::new(UnavailableBackend::new(e))
                }
            }
        };

        let sink: Arc<dyn RemoteSink> = Arc::new(FirebaseSink::new(&config.sink)?);

        let motion_input = if config.motion.enabled {
            Some(motion::open_input(&config.motion))
        } else {
            None
        };

        Self::new(config, backend, sink, motion_input)
    }

    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn orchestrator(&self) -> &CaptureOrchestrator {
        &self.orchestrator
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn config(&self) -> &DoorbellConfig {
        &self.config
    }
}
