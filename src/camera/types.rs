use crate::error::CaptureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Lifecycle of the camera handle. Only `CaptureDevice` moves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Closed,
    Opening,
    Open,
    CaptureSessionActive,
    Closing,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Closed => "closed",
            DeviceState::Opening => "opening",
            DeviceState::Open => "open",
            DeviceState::CaptureSessionActive => "capture session active",
            DeviceState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Still image encoding produced by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    /// Motion-JPEG stills, one JPEG per capture
    Jpeg,
    /// Packed YUV 4:2:2
    Yuyv,
}

impl ImageFormat {
    pub fn from_config(format: &str) -> Option<Self> {
        match format.to_ascii_uppercase().as_str() {
            "MJPG" | "MJPEG" | "JPEG" => Some(ImageFormat::Jpeg),
            "YUYV" | "YUY2" => Some(ImageFormat::Yuyv),
            _ => None,
        }
    }

    /// Largest image a single capture may produce at this resolution.
    /// JPEG output is bounded by the raw 4:2:2 size plus header room.
    pub fn slot_capacity(&self, width: u32, height: u32) -> usize {
        let raw = width as usize * height as usize * 2;
        match self {
            ImageFormat::Jpeg => raw + 64 * 1024,
            ImageFormat::Yuyv => raw,
        }
    }
}

/// Description of an opened camera, returned by `CaptureDevice::open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub camera_id: String,
    pub resolution: (u32, u32),
    pub format: ImageFormat,
    pub slot_capacity: usize,
}

/// Per-capture request settings handed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub auto_exposure: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            auto_exposure: true,
        }
    }
}

/// Encoded image bytes from one completed capture. Immutable once built.
#[derive(Debug, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    captured_at: SystemTime,
    format: ImageFormat,
    resolution: (u32, u32),
}

impl ImagePayload {
    pub fn new(
        bytes: Vec<u8>,
        captured_at: SystemTime,
        format: ImageFormat,
        resolution: (u32, u32),
    ) -> Self {
        Self {
            bytes,
            captured_at,
            format,
            resolution,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Single-slot image buffer. A newer image replaces an unread one.
#[derive(Debug)]
pub struct ImageSlot {
    capacity: usize,
    image: Option<Vec<u8>>,
}

impl ImageSlot {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            image: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_filled(&self) -> bool {
        self.image.is_some()
    }

    pub fn fill(&mut self, bytes: Vec<u8>) -> Result<(), CaptureError> {
        if bytes.len() > self.capacity {
            return Err(CaptureError::BufferOverflow {
                size: bytes.len(),
                capacity: self.capacity,
            });
        }
        self.image = Some(bytes);
        Ok(())
    }

    /// Acquire the latest image, leaving the slot empty
    pub fn take(&mut self) -> Option<Vec<u8>> {
        self.image.take()
    }
}
