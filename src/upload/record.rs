use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE};
use base64::engine::DecodePaddingMode;
use base64::{DecodeError, Engine};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const TIMESTAMP_FIELD: &str = "timestamp";
pub const IMAGE_FIELD: &str = "image";

/// Display format shared with the viewer
pub const TIMESTAMP_FORMAT: &str = "%Y %m %d - %H:%M:%S";

const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One entry of the remote log as it appears on the wire:
/// `{ "timestamp": <epoch millis>, "image": <base64url> }`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl LogRecord {
    pub fn new(timestamp: i64, image: &[u8]) -> Self {
        Self {
            timestamp: Some(timestamp),
            image: Some(encode_image(image)),
        }
    }

    /// Decoded image bytes.
    ///
    /// `None` when the field is missing, decodes to nothing, or is not
    /// base64url; viewers show a placeholder instead.
    pub fn image_bytes(&self) -> Option<Vec<u8>> {
        match decode_image(self.image.as_deref()?) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!("Record image is not valid base64: {}", e);
                None
            }
        }
    }

    pub fn formatted_timestamp(&self, tz: Tz) -> Option<String> {
        self.timestamp.and_then(|millis| format_timestamp(millis, tz))
    }
}

/// URL-safe alphabet, padded, never line-wrapped
pub fn encode_image(bytes: &[u8]) -> String {
    URL_SAFE.encode(bytes)
}

/// Accepts padded or unpadded input
pub fn decode_image(text: &str) -> Result<Vec<u8>, DecodeError> {
    LENIENT_URL_SAFE.decode(text.trim())
}

pub fn format_timestamp(millis: i64, tz: Tz) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|utc| utc.with_timezone(&tz).format(TIMESTAMP_FORMAT).to_string())
}

/// Tracks what a viewer has already shown so polling only reports changes.
///
/// A record counts as new when its key differs from the last one seen, or
/// when the same key comes back with different fields (the image lands
/// after the timestamp).
#[derive(Debug, Default)]
pub struct RecordFeed {
    last: Option<(String, LogRecord)>,
}

impl RecordFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the latest record; returns it when it has not been shown yet
    pub fn observe(
        &mut self,
        latest: Option<(String, LogRecord)>,
    ) -> Option<(String, LogRecord)> {
        let latest = latest?;
        if self.last.as_ref() == Some(&latest) {
            return None;
        }
        self.last = Some(latest.clone());
        Some(latest)
    }
}
