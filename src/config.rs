use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DoorbellConfig {
    pub camera: CameraConfig,
    pub motion: MotionConfig,
    pub sink: SinkConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Still image resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Still image encoding (MJPG or YUYV)
    #[serde(default = "default_camera_format")]
    pub format: String,

    /// Maximum time to wait for the capture session to become ready
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Maximum time for a whole capture, session setup included
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Watch the motion sensor at all
    #[serde(default = "default_motion_enabled")]
    pub enabled: bool,

    /// Named input line the sensor is wired to
    #[serde(default = "default_motion_line")]
    pub line: String,

    /// Explicit input device path; looked up by `line` when absent
    pub device: Option<String>,

    /// High level means movement
    #[serde(default = "default_active_high")]
    pub active_high: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SinkConfig {
    /// Realtime database root URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Collection path the records are written to
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Database secret or ID token appended as `auth`
    pub auth_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Skip the write when the collection is empty at upload time
    #[serde(default = "default_skip_when_empty")]
    pub skip_when_empty: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Bound on waiting for an in-flight capture or upload at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// SPACE triggers a manual capture, q requests shutdown
    #[serde(default = "default_keyboard_trigger")]
    pub keyboard_trigger: bool,
}

impl CameraConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

impl SinkConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SystemConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl DoorbellConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.format", default_camera_format())?
            .set_default("camera.session_timeout_ms", default_session_timeout_ms())?
            .set_default("camera.capture_timeout_ms", default_capture_timeout_ms())?
            .set_default("motion.enabled", default_motion_enabled())?
            .set_default("motion.line", default_motion_line())?
            .set_default("motion.active_high", default_active_high())?
            .set_default("sink.database_url", default_database_url())?
            .set_default("sink.collection", default_collection())?
            .set_default("sink.request_timeout_ms", default_request_timeout_ms())?
            .set_default("sink.skip_when_empty", default_skip_when_empty())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.shutdown_timeout_ms", default_shutdown_timeout_ms())?
            .set_default("system.keyboard_trigger", default_keyboard_trigger())?
            .add_source(File::with_name(&path_str).required(false))
            // DOORBELL_SINK__DATABASE_URL style overrides
            .add_source(
                Environment::with_prefix("DOORBELL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: DoorbellConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.camera.format.as_str(), "MJPG" | "YUYV") {
            return Err(ConfigError::Message(format!(
                "Unsupported camera format '{}' (expected MJPG or YUYV)",
                self.camera.format
            )));
        }

        if self.camera.session_timeout_ms == 0 || self.camera.capture_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera timeouts must be greater than 0".to_string(),
            ));
        }

        // The capture timeout bounds session setup too
        if self.camera.capture_timeout_ms < self.camera.session_timeout_ms {
            return Err(ConfigError::Message(format!(
                "Camera capture_timeout_ms ({}) must not be below session_timeout_ms ({})",
                self.camera.capture_timeout_ms, self.camera.session_timeout_ms
            )));
        }

        if self.motion.enabled && self.motion.line.trim().is_empty() && self.motion.device.is_none()
        {
            return Err(ConfigError::Message(
                "Motion input needs a line name or a device path".to_string(),
            ));
        }

        if self.sink.collection.trim_matches('/').is_empty() {
            return Err(ConfigError::Message(
                "Sink collection must not be empty".to_string(),
            ));
        }

        if !self.sink.database_url.starts_with("http://")
            && !self.sink.database_url.starts_with("https://")
        {
            return Err(ConfigError::Message(format!(
                "Sink database_url must be an http(s) URL, got '{}'",
                self.sink.database_url
            )));
        }

        if self.sink.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Sink request timeout must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DoorbellConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                format: default_camera_format(),
                session_timeout_ms: default_session_timeout_ms(),
                capture_timeout_ms: default_capture_timeout_ms(),
            },
            motion: MotionConfig {
                enabled: default_motion_enabled(),
                line: default_motion_line(),
                device: None,
                active_high: default_active_high(),
            },
            sink: SinkConfig {
                database_url: default_database_url(),
                collection: default_collection(),
                auth_token: None,
                request_timeout_ms: default_request_timeout_ms(),
                skip_when_empty: default_skip_when_empty(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
                keyboard_trigger: default_keyboard_trigger(),
            },
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_format() -> String {
    "MJPG".to_string()
}
fn default_session_timeout_ms() -> u64 {
    3000
}
fn default_capture_timeout_ms() -> u64 {
    5000
}

fn default_motion_enabled() -> bool {
    true
}
fn default_motion_line() -> String {
    "BCM26".to_string()
}
fn default_active_high() -> bool {
    true
}

fn default_database_url() -> String {
    "https://doorbell-default-rtdb.firebaseio.com".to_string()
}
fn default_collection() -> String {
    "logs".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_skip_when_empty() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
fn default_keyboard_trigger() -> bool {
    false
}
