use super::backend::CameraBackend;
use super::types::{CaptureSettings, ImageFormat};
use crate::config::CameraConfig;
use crate::error::{CaptureError, DeviceError};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// V4L2 `auto_exposure` menu value for automatic (aperture priority) mode
const V4L2_AUTO_EXPOSURE_APERTURE_PRIORITY: i32 = 3;
/// V4L2 `auto_exposure` menu value for manual exposure
const V4L2_AUTO_EXPOSURE_MANUAL: i32 = 1;

/// GStreamer-backed V4L2 camera producing one still per capture request
pub struct GstCameraBackend {
    config: CameraConfig,
    format: ImageFormat,
    device_path: Option<String>,
    pipeline: Option<Pipeline>,
    session_active: bool,
    /// State change to PLAYING still running on the blocking pool
    starting: Option<JoinHandle<Result<(), String>>>,
}

impl GstCameraBackend {
    pub fn new(config: CameraConfig) -> Result<Self, DeviceError> {
        gstreamer::init().map_err(|e| DeviceError::Backend {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let format = ImageFormat::from_config(&config.format).ok_or_else(|| {
            DeviceError::Backend {
                details: format!("Unsupported camera format '{}'", config.format),
            }
        })?;

        Ok(Self {
            config,
            format,
            device_path: None,
            pipeline: None,
            session_active: false,
            starting: None,
        })
    }

    /// Build GStreamer pipeline string for single-still capture
    fn build_pipeline_string(&self, device_path: &str) -> String {
        let (width, height) = self.config.resolution;
        let caps = match self.format {
            ImageFormat::Jpeg => format!("image/jpeg,width={},height={}", width, height),
            ImageFormat::Yuyv => {
                format!("video/x-raw,format=YUY2,width={},height={}", width, height)
            }
        };

        format!(
            "v4l2src name=source device={} io-mode=mmap ! {} ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            device_path, caps
        )
    }

    fn pipeline(&self) -> Result<Pipeline, CaptureError> {
        self.pipeline.clone().ok_or(CaptureError::NotOpen)
    }

    fn appsink(pipeline: &Pipeline) -> Result<AppSink, CaptureError> {
        pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CaptureError::SessionConfigFailed {
                details: "Pipeline has no appsink".to_string(),
            })
    }

    /// Resolution actually negotiated on the appsink pad
    fn negotiated_resolution(&self, appsink: &AppSink) -> Option<(u32, u32)> {
        let caps = appsink.static_pad("sink")?.current_caps()?;
        match self.format {
            ImageFormat::Yuyv => {
                let info = VideoInfo::from_caps(&caps).ok()?;
                Some((info.width(), info.height()))
            }
            ImageFormat::Jpeg => {
                let structure = caps.structure(0)?;
                let width = structure.get::<i32>("width").ok()?;
                let height = structure.get::<i32>("height").ok()?;
                Some((width as u32, height as u32))
            }
        }
    }
}

#[async_trait]
impl CameraBackend for GstCameraBackend {
    async fn enumerate(&mut self) -> Result<Vec<String>, DeviceError> {
        let mut entries = tokio::fs::read_dir("/dev").await.map_err(|e| DeviceError::Backend {
            details: format!("Failed to list /dev: {}", e),
        })?;

        let mut cameras = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(suffix) = name.strip_prefix("video") {
                if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                cameras.push(format!("/dev/{}", name));
            }
        }
        cameras.sort();

        let preferred = format!("/dev/video{}", self.config.index);
        if let Some(position) = cameras.iter().position(|c| *c == preferred) {
            cameras.swap(0, position);
        } else if !cameras.is_empty() {
            warn!(
                "Configured camera {} not present, falling back to {}",
                preferred, cameras[0]
            );
        }

        debug!("Cameras found: {:?}", cameras);
        Ok(cameras)
    }

    async fn open(&mut self, camera_id: &str) -> Result<(), DeviceError> {
        let path = camera_id.to_string();
        let probe_path = path.clone();
        let probe = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(Path::new(&probe_path))
                .map(|_| ())
        })
        .await
        .map_err(|e| DeviceError::Backend {
            details: format!("Camera probe task failed: {}", e),
        })?;

        if let Err(e) = probe {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => DeviceError::NoDeviceFound,
                std::io::ErrorKind::PermissionDenied => DeviceError::AccessDenied {
                    device: path,
                    details: e.to_string(),
                },
                _ => DeviceError::Backend {
                    details: format!("Failed to open {}: {}", path, e),
                },
            });
        }

        let pipeline_desc = self.build_pipeline_string(&path);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| DeviceError::Backend {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| DeviceError::Backend {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Ready)
            .map_err(|e| DeviceError::AccessDenied {
                device: path.clone(),
                details: e.to_string(),
            })?;

        if let Some(pad) = pipeline.by_name("source").and_then(|src| src.static_pad("src")) {
            debug!("Camera {} supports: {}", path, pad.query_caps(None));
        }

        self.device_path = Some(path);
        self.pipeline = Some(pipeline);
        Ok(())
    }

    async fn configure_session(&mut self) -> Result<(), CaptureError> {
        let pipeline = self.pipeline()?;
        let appsink = Self::appsink(&pipeline)?;
        let wait = self.config.session_timeout();

        // Marked before the state change so a dropped future still gets torn down
        self.session_active = true;
        let task = self.starting.insert(tokio::task::spawn_blocking(move || {
            pipeline
                .set_state(gstreamer::State::Playing)
                .map_err(|e| e.to_string())?;
            let (result, current, _pending) =
                pipeline.state(gstreamer::ClockTime::from_mseconds(wait.as_millis() as u64));
            result.map_err(|e| e.to_string())?;
            if current != gstreamer::State::Playing {
                return Err(format!("pipeline stuck in {:?}", current));
            }
            Ok(())
        }));
        let started = task.await;
        self.starting = None;

        started
            .map_err(|e| CaptureError::SessionConfigFailed {
                details: e.to_string(),
            })?
            .map_err(|details| CaptureError::SessionConfigFailed { details })?;

        if let Some(caps) = appsink.static_pad("sink").and_then(|pad| pad.current_caps()) {
            debug!("Negotiated caps: {}", caps);
        }

        if let Some(negotiated) = self.negotiated_resolution(&appsink) {
            if negotiated != self.config.resolution {
                return Err(CaptureError::SessionConfigFailed {
                    details: format!(
                        "negotiated {}x{}, requested {}x{}",
                        negotiated.0,
                        negotiated.1,
                        self.config.resolution.0,
                        self.config.resolution.1
                    ),
                });
            }
        }

        Ok(())
    }

    async fn submit_capture(
        &mut self,
        settings: &CaptureSettings,
    ) -> Result<Vec<u8>, CaptureError> {
        let pipeline = self.pipeline()?;
        let appsink = Self::appsink(&pipeline)?;

        if let Some(source) = pipeline.by_name("source") {
            let exposure = if settings.auto_exposure {
                V4L2_AUTO_EXPOSURE_APERTURE_PRIORITY
            } else {
                V4L2_AUTO_EXPOSURE_MANUAL
            };
            let controls = gstreamer::Structure::builder("c")
                .field("auto_exposure", exposure)
                .build();
            source.set_property("extra-controls", controls);
        }

        let wait = self.config.capture_timeout();
        tokio::task::spawn_blocking(move || pull_still(&appsink, wait))
            .await
            .map_err(|e| CaptureError::CaptureSubmitFailed {
                details: e.to_string(),
            })?
    }

    async fn close_session(&mut self) {
        if !self.session_active {
            return;
        }
        self.session_active = false;
        if let Some(task) = self.starting.take() {
            // Let an abandoned start finish so READY is applied after PLAYING
            let _ = task.await;
        }
        if let Some(pipeline) = self.pipeline.clone() {
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(e) = pipeline.set_state(gstreamer::State::Ready) {
                    warn!("Failed to stop capture session: {}", e);
                }
            })
            .await;
            debug!("Capture session closed");
        }
    }

    async fn close(&mut self) {
        self.session_active = false;
        if let Some(task) = self.starting.take() {
            let _ = task.await;
        }
        if let Some(pipeline) = self.pipeline.take() {
            let _ = tokio::task::spawn_blocking(move || {
                let _ = pipeline.set_state(gstreamer::State::Null);
            })
            .await;
        }
        if let Some(path) = self.device_path.take() {
            info!("Camera {} released", path);
        }
    }

    fn name(&self) -> &'static str {
        "gstreamer"
    }
}

/// Pull exactly one sample from the appsink
fn pull_still(appsink: &AppSink, wait: Duration) -> Result<Vec<u8>, CaptureError> {
    let sample = appsink
        .try_pull_sample(gstreamer::ClockTime::from_mseconds(wait.as_millis() as u64))
        .ok_or_else(|| CaptureError::CaptureSubmitFailed {
            details: "No sample delivered by camera".to_string(),
        })?;

    let buffer = sample
        .buffer()
        .ok_or_else(|| CaptureError::CaptureSubmitFailed {
            details: "No buffer in sample".to_string(),
        })?;

    let map = buffer
        .map_readable()
        .map_err(|e| CaptureError::CaptureSubmitFailed {
            details: format!("Failed to map buffer: {}", e),
        })?;

    Ok(map.as_slice().to_vec())
}
