use super::*;
use crate::config::CameraConfig;
use crate::error::{CaptureError, DeviceError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        index: 0,
        resolution: (640, 480),
        format: "MJPG".to_string(),
        session_timeout_ms: 500,
        capture_timeout_ms: 1000,
    }
}

fn create_device(backend: MockCameraBackend) -> CaptureDevice {
    CaptureDevice::new(create_test_camera_config(), Box::new(backend))
}

#[tokio::test]
async fn test_open_allocates_slot_for_resolution() {
    let device = create_device(MockCameraBackend::new());
    assert_eq!(device.state(), DeviceState::Closed);

    let info = device.open().await.unwrap();

    assert_eq!(device.state(), DeviceState::Open);
    assert_eq!(info.camera_id, "/dev/video0");
    assert_eq!(info.resolution, (640, 480));
    assert_eq!(info.format, ImageFormat::Jpeg);
    assert_eq!(info.slot_capacity, ImageFormat::Jpeg.slot_capacity(640, 480));
}

#[tokio::test]
async fn test_open_without_camera_fails_with_no_device() {
    let backend = MockCameraBackend::new().without_cameras();
    let device = create_device(backend.clone());

    let result = device.open().await;

    assert_eq!(result, Err(DeviceError::NoDeviceFound));
    assert_eq!(device.state(), DeviceState::Closed);
    assert_eq!(backend.calls().open, 0);
}

#[tokio::test]
async fn test_open_access_denied_leaves_device_closed() {
    let denied = DeviceError::AccessDenied {
        device: "/dev/video0".to_string(),
        details: "permission denied".to_string(),
    };
    let device = create_device(MockCameraBackend::new().failing_open(denied.clone()));

    assert_eq!(device.open().await, Err(denied));
    assert!(!device.is_open());
}

#[tokio::test]
async fn test_capture_runs_full_session_once() {
    let backend = MockCameraBackend::new().with_image(vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
    let device = create_device(backend.clone());
    device.open().await.unwrap();

    let payload = device.capture(&CancellationToken::new()).await.unwrap();

    assert_eq!(payload.bytes(), &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
    assert_eq!(payload.format(), ImageFormat::Jpeg);
    assert_eq!(payload.resolution(), (640, 480));
    assert_eq!(device.state(), DeviceState::Open);

    let calls = backend.calls();
    assert_eq!(calls.configure_session, 1);
    assert_eq!(calls.submit_capture, 1);
    assert_eq!(calls.close_session, 1);
    assert_eq!(
        backend.last_settings(),
        Some(CaptureSettings {
            auto_exposure: true
        })
    );
}

#[tokio::test]
async fn test_capture_when_closed_returns_not_open() {
    let backend = MockCameraBackend::new();
    let device = create_device(backend.clone());

    let result = device.capture(&CancellationToken::new()).await;

    assert_eq!(result, Err(CaptureError::NotOpen));
    assert_eq!(backend.calls().configure_session, 0);
    assert_eq!(backend.calls().submit_capture, 0);
}

#[tokio::test]
async fn test_session_config_failure_skips_submit_and_reopens() {
    let backend = MockCameraBackend::new();
    backend.set_session_error(Some(CaptureError::SessionConfigFailed {
        details: "rejected".to_string(),
    }));
    let device = create_device(backend.clone());
    device.open().await.unwrap();

    let result = device.capture(&CancellationToken::new()).await;

    assert!(matches!(result, Err(CaptureError::SessionConfigFailed { .. })));
    assert_eq!(backend.calls().submit_capture, 0);
    assert_eq!(backend.calls().close_session, 1);
    assert_eq!(device.state(), DeviceState::Open);

    // No internal retry, but the next call starts fresh
    backend.set_session_error(None);
    assert!(device.capture(&CancellationToken::new()).await.is_ok());
}

#[tokio::test]
async fn test_submit_failure_is_reported() {
    let backend = MockCameraBackend::new();
    backend.set_submit_error(Some(CaptureError::CaptureSubmitFailed {
        details: "busy".to_string(),
    }));
    let device = create_device(backend.clone());
    device.open().await.unwrap();

    let result = device.capture(&CancellationToken::new()).await;

    assert!(matches!(result, Err(CaptureError::CaptureSubmitFailed { .. })));
    assert_eq!(device.state(), DeviceState::Open);
}

#[tokio::test]
async fn test_oversized_image_overflows_slot() {
    let capacity = ImageFormat::Jpeg.slot_capacity(640, 480);
    let backend = MockCameraBackend::new().with_image(vec![0u8; capacity + 1]);
    let device = create_device(backend);
    device.open().await.unwrap();

    let result = device.capture(&CancellationToken::new()).await;

    assert_eq!(
        result,
        Err(CaptureError::BufferOverflow {
            size: capacity + 1,
            capacity
        })
    );
}

#[tokio::test]
async fn test_slot_sized_image_is_accepted() {
    let capacity = ImageFormat::Jpeg.slot_capacity(640, 480);
    let backend = MockCameraBackend::new().with_image(vec![7u8; capacity]);
    let device = create_device(backend);
    device.open().await.unwrap();

    let payload = device.capture(&CancellationToken::new()).await.unwrap();
    assert_eq!(payload.len(), capacity);
}

#[tokio::test(start_paused = true)]
async fn test_capture_times_out() {
    let backend = MockCameraBackend::new().with_capture_delay(Duration::from_secs(30));
    let device = create_device(backend.clone());
    device.open().await.unwrap();

    let result = device.capture(&CancellationToken::new()).await;

    assert_eq!(result, Err(CaptureError::Timeout { millis: 1000 }));
    assert_eq!(backend.calls().close_session, 1);
    assert_eq!(device.state(), DeviceState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_slow_session_setup_is_torn_down() {
    let backend = MockCameraBackend::new().with_session_delay(Duration::from_secs(30));
    let device = create_device(backend.clone());
    device.open().await.unwrap();

    let result = device.capture(&CancellationToken::new()).await;

    assert!(matches!(result, Err(CaptureError::SessionConfigFailed { .. })));
    assert_eq!(backend.calls().submit_capture, 0);
    assert_eq!(backend.calls().close_session, 1);
    assert!(!backend.session_open());
    assert_eq!(device.state(), DeviceState::Open);
}

#[tokio::test]
async fn test_cancel_during_session_setup_closes_session() {
    let backend = MockCameraBackend::new().with_session_delay(Duration::from_secs(30));
    let device = Arc::new(create_device(backend.clone()));
    device.open().await.unwrap();

    let cancel = CancellationToken::new();
    let task = {
        let device = Arc::clone(&device);
        let cancel = cancel.clone();
        tokio::spawn(async move { device.capture(&cancel).await })
    };

    while backend.calls().configure_session == 0 {
        tokio::task::yield_now().await;
    }
    assert!(backend.session_open());
    cancel.cancel();

    assert_eq!(task.await.unwrap(), Err(CaptureError::Cancelled));
    assert!(!backend.session_open());
    assert_eq!(backend.calls().close_session, 1);
}

#[tokio::test]
async fn test_capture_cancelled_by_token() {
    let backend = MockCameraBackend::new();
    let device = Arc::new(create_device(backend.clone()));
    device.open().await.unwrap();

    let gate = backend.hold().await;
    let cancel = CancellationToken::new();
    let task = {
        let device = Arc::clone(&device);
        let cancel = cancel.clone();
        tokio::spawn(async move { device.capture(&cancel).await })
    };

    tokio::task::yield_now().await;
    cancel.cancel();
    let result = task.await.unwrap();
    drop(gate);

    assert_eq!(result, Err(CaptureError::Cancelled));
    assert_eq!(device.state(), DeviceState::Open);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let backend = MockCameraBackend::new();
    let device = create_device(backend.clone());

    device.close().await;
    assert_eq!(backend.calls().close, 0);

    device.open().await.unwrap();
    device.close().await;
    device.close().await;

    assert_eq!(device.state(), DeviceState::Closed);
    assert_eq!(backend.calls().close, 1);
    assert!(device.info().is_none());
    assert_eq!(
        device.capture(&CancellationToken::new()).await,
        Err(CaptureError::NotOpen)
    );
}

#[test]
fn test_image_slot_replaces_unread_image() {
    let mut slot = ImageSlot::new(4);
    slot.fill(vec![1, 2]).unwrap();
    slot.fill(vec![3, 4, 5]).unwrap();

    assert_eq!(slot.take(), Some(vec![3, 4, 5]));
    assert!(!slot.is_filled());
    assert!(slot.fill(vec![0; 5]).is_err());
}

#[test]
fn test_image_format_from_config() {
    assert_eq!(ImageFormat::from_config("MJPG"), Some(ImageFormat::Jpeg));
    assert_eq!(ImageFormat::from_config("yuyv"), Some(ImageFormat::Yuyv));
    assert_eq!(ImageFormat::from_config("H264"), None);
    assert_eq!(ImageFormat::Yuyv.slot_capacity(640, 480), 640 * 480 * 2);
}

#[tokio::test]
async fn test_unavailable_backend_reports_its_reason() {
    let device = CaptureDevice::new(
        create_test_camera_config(),
        Box::new(UnavailableBackend::new(DeviceError::NoDeviceFound)),
    );

    assert_eq!(device.open().await, Err(DeviceError::NoDeviceFound));
    assert_eq!(device.state(), DeviceState::Closed);
}
