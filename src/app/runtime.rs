use super::{DoorbellApp, ShutdownReason};
use crate::error::{DoorbellError, Result};
use crate::events::{EventFilter, EventReceiver};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl DoorbellApp {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Doorbell system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| DoorbellError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| DoorbellError::system("Shutdown receiver already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.setup_shutdown_listener(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| DoorbellError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Doorbell system shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedSender) {
        // SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            let cancel = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        send_reason(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                    }
                }
            });
        }

        let cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                Ok(()) = signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    send_reason(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string())).await;
                }
            }
        });
    }

    /// Shutdown requests published on the event bus, e.g. the keyboard `q`
    fn setup_shutdown_listener(&self, shutdown_sender: SharedSender) {
        let mut receiver = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::types(vec!["shutdown_requested"]),
            "shutdown_listener",
        );
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                event = receiver.recv() => {
                    if event.is_ok() {
                        send_reason(&shutdown_sender, ShutdownReason::UserRequest).await;
                    }
                }
            }
        });
    }
}

async fn send_reason(sender: &SharedSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
