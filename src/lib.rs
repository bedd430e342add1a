pub mod app;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod keyboard_input;
pub mod motion;
pub mod upload;

pub use app::{ComponentState, DoorbellApp, ShutdownReason};
pub use camera::{CameraBackend, CaptureDevice, DeviceState, ImagePayload, MockCameraBackend};
pub use capture::{CaptureOrchestrator, OrchestratorState, TriggerOutcome, TriggerSource};
pub use config::DoorbellConfig;
pub use error::{DoorbellError, Result};
pub use events::{DoorbellEvent, EventBus, EventFilter, EventReceiver};
pub use motion::{MotionState, MotionWatcher};
pub use upload::{FirebaseSink, LogRecord, MemorySink, RemoteSink, UploadStage};
