use crate::error::InputError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

/// Edge-triggered digital input delivering raw levels
#[async_trait]
pub trait InputSource: Send {
    /// Arm the input for notifications on both edges
    async fn configure(&mut self) -> Result<(), InputError>;

    /// Wait for the next level change notification; `None` once the input is gone
    async fn next_level(&mut self) -> Result<Option<bool>, InputError>;

    /// Line name for logging
    fn line(&self) -> &str;
}

/// Replays a fixed level sequence, optionally spaced in time
pub struct ScriptedInput {
    line: String,
    levels: VecDeque<bool>,
    spacing: Duration,
    configure_error: Option<InputError>,
}

impl ScriptedInput {
    pub fn new(line: impl Into<String>, levels: impl IntoIterator<Item = bool>) -> Self {
        Self {
            line: line.into(),
            levels: levels.into_iter().collect(),
            spacing: Duration::ZERO,
            configure_error: None,
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn failing(line: impl Into<String>, details: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            configure_error: Some(InputError::InputUnavailable {
                line: line.clone(),
                details: details.into(),
            }),
            line,
            levels: VecDeque::new(),
            spacing: Duration::ZERO,
        }
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn configure(&mut self) -> Result<(), InputError> {
        match self.configure_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn next_level(&mut self) -> Result<Option<bool>, InputError> {
        if !self.spacing.is_zero() && !self.levels.is_empty() {
            tokio::time::sleep(self.spacing).await;
        }
        Ok(self.levels.pop_front())
    }

    fn line(&self) -> &str {
        &self.line
    }
}
