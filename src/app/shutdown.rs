use super::{ComponentState, DoorbellApp};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl DoorbellApp {
    /// Stop trigger sources first, then let the orchestrator release the
    /// camera within the configured shutdown timeout.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Stopping)
                    .await;
                match timeout(KEYBOARD_STOP_TIMEOUT, keyboard_handler.stop()).await {
                    Ok(Ok(())) => {
                        self.set_component_state("keyboard", ComponentState::Stopped)
                            .await;
                    }
                    Ok(Err(e)) => {
                        error!("Error stopping keyboard: {}", e);
                        self.set_component_state("keyboard", ComponentState::Failed)
                            .await;
                        exit_code = 1;
                    }
                    Err(_) => {
                        error!("keyboard component stop timeout");
                        self.set_component_state("keyboard", ComponentState::Failed)
                            .await;
                        exit_code = 1;
                    }
                }
            }
        }

        if self.get_component_state("motion").await.is_some() {
            self.set_component_state("motion", ComponentState::Stopping)
                .await;
            self.watcher.stop().await;
            self.set_component_state("motion", ComponentState::Stopped)
                .await;
        }

        self.set_component_state("camera", ComponentState::Stopping)
            .await;
        self.set_component_state("upload", ComponentState::Stopping)
            .await;
        self.orchestrator
            .shutdown(self.config.system.shutdown_timeout())
            .await;
        self.set_component_state("camera", ComponentState::Stopped)
            .await;
        self.set_component_state("upload", ComponentState::Stopped)
            .await;

        let stats = self.orchestrator.stats();
        info!(
            "Session totals: {} captures accepted, {} dropped, {} rejected, {} uploaded, {} upload failures",
            stats.accepted, stats.dropped, stats.rejected, stats.uploads_completed, stats.uploads_failed
        );

        let mut states: Vec<_> = self.get_all_component_states().await.into_iter().collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        debug!("Component states at exit: {:?}", states);

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
