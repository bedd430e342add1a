use crate::capture::{OrchestratorState, TriggerSource};
use crate::error::EventBusError;
use crate::motion::MotionState;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events that can occur in the doorbell system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DoorbellEvent {
    /// The motion sensor changed logical state
    MotionChanged {
        state: MotionState,
        timestamp: SystemTime,
    },
    /// A trigger was accepted and a capture issued
    CaptureTriggered {
        request_id: u64,
        source: TriggerSource,
        timestamp: SystemTime,
    },
    /// A trigger arrived while a capture or upload was in flight
    TriggerDropped {
        source: TriggerSource,
        state: OrchestratorState,
    },
    /// A trigger was refused because the camera is not usable
    TriggerRejected { source: TriggerSource, reason: String },
    /// The camera delivered an image
    CaptureCompleted { request_id: u64, bytes: usize },
    /// The capture attempt failed
    CaptureFailed { request_id: u64, error: String },
    /// The image was written to the remote log
    UploadCompleted { request_id: u64, key: String },
    /// The remote log was empty so nothing was written
    UploadSkipped { request_id: u64 },
    /// The upload failed; the image is lost
    UploadFailed { request_id: u64, error: String },
    /// Camera open/close
    CameraStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl DoorbellEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            DoorbellEvent::MotionChanged { state, .. } => format!("Motion state: {}", state),
            DoorbellEvent::CaptureTriggered {
                request_id, source, ..
            } => format!("Capture {} triggered by {:?}", request_id, source),
            DoorbellEvent::TriggerDropped { source, state } => {
                format!("{:?} trigger dropped while {:?}", source, state)
            }
            DoorbellEvent::TriggerRejected { source, reason } => {
                format!("{:?} trigger rejected: {}", source, reason)
            }
            DoorbellEvent::CaptureCompleted { request_id, bytes } => {
                format!("Capture {} completed ({} bytes)", request_id, bytes)
            }
            DoorbellEvent::CaptureFailed { request_id, error } => {
                format!("Capture {} failed: {}", request_id, error)
            }
            DoorbellEvent::UploadCompleted { request_id, key } => {
                format!("Capture {} uploaded as {}", request_id, key)
            }
            DoorbellEvent::UploadSkipped { request_id } => {
                format!("Capture {} not uploaded: collection empty", request_id)
            }
            DoorbellEvent::UploadFailed { request_id, error } => {
                format!("Capture {} upload failed: {}", request_id, error)
            }
            DoorbellEvent::CameraStatusChanged { connected, .. } => {
                format!(
                    "Camera {}",
                    if *connected { "opened" } else { "closed" }
                )
            }
            DoorbellEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            DoorbellEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            DoorbellEvent::MotionChanged { .. } => "motion_changed",
            DoorbellEvent::CaptureTriggered { .. } => "capture_triggered",
            DoorbellEvent::TriggerDropped { .. } => "trigger_dropped",
            DoorbellEvent::TriggerRejected { .. } => "trigger_rejected",
            DoorbellEvent::CaptureCompleted { .. } => "capture_completed",
            DoorbellEvent::CaptureFailed { .. } => "capture_failed",
            DoorbellEvent::UploadCompleted { .. } => "upload_completed",
            DoorbellEvent::UploadSkipped { .. } => "upload_skipped",
            DoorbellEvent::UploadFailed { .. } => "upload_failed",
            DoorbellEvent::CameraStatusChanged { .. } => "camera_status_changed",
            DoorbellEvent::SystemError { .. } => "system_error",
            DoorbellEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<DoorbellEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<DoorbellEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: DoorbellEvent) -> Result<usize, EventBusError> {
        match &event {
            DoorbellEvent::MotionChanged { state, .. } => {
                info!("Motion state changed: {}", state);
            }
            DoorbellEvent::TriggerDropped { .. } | DoorbellEvent::TriggerRejected { .. } => {
                warn!("{}", event.description());
            }
            DoorbellEvent::CaptureFailed { .. } | DoorbellEvent::UploadFailed { .. } => {
                error!("{}", event.description());
            }
            DoorbellEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            DoorbellEvent::CameraStatusChanged { connected, .. } => {
                if *connected {
                    info!("Camera opened");
                } else {
                    warn!("Camera closed");
                }
            }
            DoorbellEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {
                debug!("Event: {}", event.description());
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish without caring whether anyone is listening
    pub fn emit(&self, event: DoorbellEvent) {
        let _ = self.publish(event);
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub struct EventFilter {
    types: Vec<&'static str>,
}

impl EventFilter {
    /// Accept only the named event types
    pub fn types(types: Vec<&'static str>) -> Self {
        Self { types }
    }

    /// Check if an event passes this filter
    pub fn matches(&self, event: &DoorbellEvent) -> bool {
        self.types.contains(&event.event_type())
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<DoorbellEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<DoorbellEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    /// Receive the next event that passes the filter. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Result<DoorbellEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(DoorbellEvent::CaptureCompleted {
                request_id: 7,
                bytes: 1024,
            })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            DoorbellEvent::CaptureCompleted { request_id, bytes } => {
                assert_eq!(request_id, 7);
                assert_eq!(bytes, 1024);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        let result = event_bus.publish(DoorbellEvent::UploadSkipped { request_id: 1 });
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));

        // emit swallows the same failure
        event_bus.emit(DoorbellEvent::UploadSkipped { request_id: 1 });
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::types(vec!["shutdown_requested"]),
            "test",
        );

        event_bus
            .publish(DoorbellEvent::MotionChanged {
                state: MotionState::Moving,
                timestamp: SystemTime::now(),
            })
            .unwrap();
        event_bus
            .publish(DoorbellEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "test".to_string(),
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event_type(), "shutdown_requested");
    }

    #[test]
    fn test_event_properties() {
        let event = DoorbellEvent::TriggerDropped {
            source: TriggerSource::Motion,
            state: OrchestratorState::Uploading,
        };

        assert_eq!(event.event_type(), "trigger_dropped");
        assert!(event.description().contains("Uploading"));
    }
}
