mod backend;
mod device;
#[cfg(all(target_os = "linux", feature = "camera"))]
mod gst;
mod mock;
mod types;
#[cfg(test)]
mod tests;

pub use backend::{CameraBackend, UnavailableBackend};
pub use device::CaptureDevice;
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use gst::GstCameraBackend;
pub use mock::{mock_jpeg, MockCalls, MockCameraBackend};
pub use types::{CaptureSettings, DeviceInfo, DeviceState, ImageFormat, ImagePayload, ImageSlot};

use crate::config::CameraConfig;
use crate::error::DeviceError;

/// Backend for real hardware on this build
#[cfg(all(target_os = "linux", feature = "camera"))]
pub fn hardware_backend(config: &CameraConfig) -> Result<Box<dyn CameraBackend>, DeviceError> {
    Ok(Box::new(GstCameraBackend::new(config.clone())?))
}

/// Backend for real hardware on this build
#[cfg(not(all(target_os = "linux", feature = "camera")))]
pub fn hardware_backend(_config: &CameraConfig) -> Result<Box<dyn CameraBackend>, DeviceError> {
    tracing::warn!("GStreamer camera backend is only available on Linux with the camera feature");
    Err(DeviceError::NoDeviceFound)
}
