use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical sensor state derived from the raw input level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Still,
    Moving,
}

impl MotionState {
    pub fn is_moving(&self) -> bool {
        matches!(self, MotionState::Moving)
    }

    /// Status text shown to the user
    pub fn status_text(&self) -> &'static str {
        match self {
            MotionState::Still => "Still",
            MotionState::Moving => "Moving",
        }
    }
}

impl Default for MotionState {
    fn default() -> Self {
        MotionState::Still
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_text())
    }
}

/// How a raw level maps onto movement for a given sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelMapping {
    ActiveHigh,
    ActiveLow,
}

impl LevelMapping {
    pub fn from_active_high(active_high: bool) -> Self {
        if active_high {
            LevelMapping::ActiveHigh
        } else {
            LevelMapping::ActiveLow
        }
    }

    pub fn state_for(&self, level: bool) -> MotionState {
        let moving = match self {
            LevelMapping::ActiveHigh => level,
            LevelMapping::ActiveLow => !level,
        };
        if moving {
            MotionState::Moving
        } else {
            MotionState::Still
        }
    }
}

/// Turns raw level notifications into logical transitions, dropping repeats
#[derive(Debug, Clone)]
pub struct EdgeFilter {
    mapping: LevelMapping,
    current: MotionState,
}

impl EdgeFilter {
    pub fn new(mapping: LevelMapping) -> Self {
        Self {
            mapping,
            current: MotionState::Still,
        }
    }

    pub fn current(&self) -> MotionState {
        self.current
    }

    /// Feed one raw level; returns the new state only when it changed
    pub fn update(&mut self, level: bool) -> Option<MotionState> {
        let next = self.mapping.state_for(level);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}
