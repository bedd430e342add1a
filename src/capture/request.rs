use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What fired a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    Motion,
    Manual,
}

/// One accepted intent to take a picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub id: u64,
    pub submitted_at: SystemTime,
    pub source: TriggerSource,
}

impl CaptureRequest {
    pub fn new(id: u64, source: TriggerSource) -> Self {
        Self {
            id,
            submitted_at: SystemTime::now(),
            source,
        }
    }
}
