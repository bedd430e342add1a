use super::record::{encode_image, IMAGE_FIELD, TIMESTAMP_FIELD};
use super::sink::{RemoteSink, ServerValue};
use crate::camera::ImagePayload;
use crate::config::SinkConfig;
use crate::error::{SinkError, UploadError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What an upload did to the remote log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// A new record was written under `key`
    Written { key: String },
    /// The collection was empty, nothing was written
    Skipped,
}

/// Prune-then-write publisher keeping at most one record in the collection
pub struct UploadStage {
    sink: Arc<dyn RemoteSink>,
    request_timeout: Duration,
    skip_when_empty: bool,
}

impl UploadStage {
    pub fn new(sink: Arc<dyn RemoteSink>, config: &SinkConfig) -> Self {
        Self {
            sink,
            request_timeout: config.request_timeout(),
            skip_when_empty: config.skip_when_empty,
        }
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    /// Publish one image. Steps run strictly in order: count, delete, push,
    /// timestamp, image. No retry.
    pub async fn upload(
        &self,
        payload: ImagePayload,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let count = self
            .step(cancel, self.sink.child_count(), |cause| UploadError::Query { cause })
            .await?;
        debug!("Remote collection holds {} record(s)", count);

        if count == 0 {
            if self.skip_when_empty {
                info!("Remote collection empty, upload skipped");
                return Ok(UploadOutcome::Skipped);
            }
        } else {
            self.step(cancel, self.sink.delete_all(), |cause| UploadError::Delete { cause })
                .await?;
        }

        let child = self
            .step(cancel, self.sink.push_child(), |cause| UploadError::Write { cause })
            .await?;

        self.step(
            cancel,
            self.sink
                .set_field(&child, TIMESTAMP_FIELD, ServerValue::ServerTimestamp),
            |cause| UploadError::Write { cause },
        )
        .await?;

        let image = encode_image(payload.bytes());
        drop(payload);
        self.step(
            cancel,
            self.sink
                .set_field(&child, IMAGE_FIELD, ServerValue::Text(image)),
            |cause| UploadError::Write { cause },
        )
        .await?;

        info!("Image uploaded to {}", child.path());
        Ok(UploadOutcome::Written { key: child.key })
    }

    async fn step<T>(
        &self,
        cancel: &CancellationToken,
        operation: impl Future<Output = Result<T, SinkError>>,
        wrap: fn(String) -> UploadError,
    ) -> Result<T, UploadError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            outcome = tokio::time::timeout(self.request_timeout, operation) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(wrap(e.to_string())),
                Err(_) => Err(UploadError::Timeout {
                    millis: self.request_timeout.as_millis() as u64,
                }),
            },
        }
    }
}
