use super::input::InputSource;
use crate::config::MotionConfig;
use crate::error::InputError;
use async_trait::async_trait;
use evdev::{Device, EventStream, EventType, InputEventKind};
use tracing::{debug, info, trace};

/// Motion sensor exposed as a `gpio-keys` style input device.
///
/// The kernel driver reports both edges of the line as key or switch
/// events: value 1 on the rising edge, 0 on the falling edge.
pub struct EvdevInput {
    line: String,
    device: Option<Device>,
    stream: Option<EventStream>,
    initial_level: Option<bool>,
}

impl EvdevInput {
    /// Resolve the input device from an explicit path or by line name
    pub fn open(config: &MotionConfig) -> Result<Self, InputError> {
        let line = config.line.clone();
        let unavailable = |details: String| InputError::InputUnavailable {
            line: line.clone(),
            details,
        };

        let device = match &config.device {
            Some(path) => Device::open(path).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => unavailable(format!("{} not found", path)),
                std::io::ErrorKind::PermissionDenied => {
                    unavailable(format!("permission denied for {}", path))
                }
                _ => unavailable(format!("failed to open {}: {}", path, e)),
            })?,
            None => evdev::enumerate()
                .find(|(_, device)| {
                    device
                        .name()
                        .map(|name| name == line || name.contains(line.as_str()))
                        .unwrap_or(false)
                })
                .map(|(path, device)| {
                    debug!("Input line {} resolved to {}", line, path.display());
                    device
                })
                .ok_or_else(|| unavailable("no input device matches the line name".to_string()))?,
        };

        let supported = device.supported_events();
        if !supported.contains(EventType::KEY) && !supported.contains(EventType::SWITCH) {
            return Err(unavailable(format!(
                "{} reports neither key nor switch events",
                device.name().unwrap_or("device")
            )));
        }

        info!(
            "Motion input {} opened ({})",
            line,
            device.name().unwrap_or("Unknown")
        );

        Ok(Self {
            line,
            device: Some(device),
            stream: None,
            initial_level: None,
        })
    }

    fn current_level(device: &Device) -> Option<bool> {
        if let Ok(keys) = device.get_key_state() {
            if device.supported_keys().is_some() {
                return Some(keys.iter().next().is_some());
            }
        }
        device
            .get_switch_state()
            .ok()
            .map(|switches| switches.iter().next().is_some())
    }
}

#[async_trait]
impl InputSource for EvdevInput {
    async fn configure(&mut self) -> Result<(), InputError> {
        let device = self.device.take().ok_or_else(|| InputError::InputUnavailable {
            line: self.line.clone(),
            details: "input already configured".to_string(),
        })?;

        self.initial_level = Self::current_level(&device);
        let stream = device
            .into_event_stream()
            .map_err(|e| InputError::InputUnavailable {
                line: self.line.clone(),
                details: format!("failed to arm input events: {}", e),
            })?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn next_level(&mut self) -> Result<Option<bool>, InputError> {
        if let Some(level) = self.initial_level.take() {
            return Ok(Some(level));
        }

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(None),
        };

        loop {
            let event = stream
                .next_event()
                .await
                .map_err(|e| InputError::InputUnavailable {
                    line: self.line.clone(),
                    details: format!("read failed: {}", e),
                })?;

            match event.kind() {
                InputEventKind::Key(_) | InputEventKind::Switch(_) => match event.value() {
                    0 => return Ok(Some(false)),
                    1 => return Ok(Some(true)),
                    // autorepeat
                    _ => continue,
                },
                _ => trace!("Ignoring input event {:?}", event),
            }
        }
    }

    fn line(&self) -> &str {
        &self.line
    }
}
