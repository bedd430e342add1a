use super::{ComponentState, DoorbellApp, MotionInput};
use crate::error::Result;
use crate::events::DoorbellEvent;
use std::time::SystemTime;
use tracing::{error, info, warn};

impl DoorbellApp {
    /// Register components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing doorbell components");

        let mut states = self.component_states.lock().await;
        states.insert("camera".to_string(), ComponentState::Stopped);
        states.insert("upload".to_string(), ComponentState::Stopped);
        if self.config.motion.enabled {
            states.insert("motion".to_string(), ComponentState::Stopped);
        }
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Open the camera and start the trigger sources.
    ///
    /// Camera and motion failures degrade the system instead of aborting it:
    /// without a camera every trigger is rejected, without motion input only
    /// manual capture remains.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting doorbell system");

        self.start_camera().await;

        self.set_component_state("upload", ComponentState::Running)
            .await;
        info!(
            "Upload stage ready ({} sink, collection '{}')",
            self.orchestrator.uploader_name(),
            self.config.sink.collection
        );

        let motion_input = self.motion_input.lock().take();
        if let Some(input) = motion_input {
            self.start_motion(input).await;
        }

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
            }
        }

        info!("Doorbell system started successfully");
        Ok(())
    }

    async fn start_camera(&self) {
        self.set_component_state("camera", ComponentState::Starting)
            .await;

        match self.orchestrator.device().open().await {
            Ok(info) => {
                self.set_component_state("camera", ComponentState::Running)
                    .await;
                self.event_bus.emit(DoorbellEvent::CameraStatusChanged {
                    connected: true,
                    timestamp: SystemTime::now(),
                });
                info!("Camera {} ready", info.camera_id);
            }
            Err(e) => {
                self.set_component_state("camera", ComponentState::Failed)
                    .await;
                self.event_bus.emit(DoorbellEvent::SystemError {
                    component: "camera".to_string(),
                    error: e.to_string(),
                });
                warn!("Capture unavailable for this session: {}", e);
            }
        }
    }

    async fn start_motion(&self, input: MotionInput) {
        self.set_component_state("motion", ComponentState::Starting)
            .await;

        let orchestrator = self.orchestrator.clone();
        let started = match input {
            Ok(input) => {
                self.watcher
                    .start(input, move |state| {
                        orchestrator.on_motion(state);
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match started {
            Ok(()) => {
                self.set_component_state("motion", ComponentState::Running)
                    .await;
            }
            Err(e) => {
                self.set_component_state("motion", ComponentState::Failed)
                    .await;
                self.event_bus.emit(DoorbellEvent::SystemError {
                    component: "motion".to_string(),
                    error: e.to_string(),
                });
                warn!("Motion-triggered capture unavailable, manual capture still works");
            }
        }
    }
}
