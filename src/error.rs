use thiserror::Error;

#[derive(Error, Debug)]
pub enum DoorbellError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Remote sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Motion input error: {0}")]
    Input(#[from] InputError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },
}

impl DoorbellError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Failures opening the camera. Fatal to capture for the rest of the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No camera device found")]
    NoDeviceFound,

    #[error("Access to camera {device} denied: {details}")]
    AccessDenied { device: String, details: String },

    #[error("Camera backend failure: {details}")]
    Backend { details: String },
}

/// Failures of a single capture attempt. The next trigger starts fresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture session configuration rejected: {details}")]
    SessionConfigFailed { details: String },

    #[error("Capture request could not be submitted: {details}")]
    CaptureSubmitFailed { details: String },

    #[error("Camera not initialized")]
    NotOpen,

    #[error("Image of {size} bytes exceeds {capacity} byte slot")]
    BufferOverflow { size: usize, capacity: usize },

    #[error("Capture timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Capture cancelled")]
    Cancelled,
}

/// Remote sink failures. Carries the sink's own error detail as `cause`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Failed to query collection size: {cause}")]
    Query { cause: String },

    #[error("Failed to prune collection: {cause}")]
    Delete { cause: String },

    #[error("Failed to write record: {cause}")]
    Write { cause: String },

    #[error("Upload timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Remote detail for this failure, if the sink supplied one
    pub fn cause(&self) -> Option<&str> {
        match self {
            UploadError::Query { cause }
            | UploadError::Delete { cause }
            | UploadError::Write { cause } => Some(cause),
            UploadError::Timeout { .. } | UploadError::Cancelled => None,
        }
    }
}

/// Errors reported by a remote sink implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Request failed: {details}")]
    Transport { details: String },

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {details}")]
    Decode { details: String },

    #[error("Injected failure: {details}")]
    Injected { details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Motion input {line} unavailable: {details}")]
    InputUnavailable { line: String, details: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event bus closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DoorbellError>;
