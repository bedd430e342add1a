pub mod input;
pub mod state;
pub mod watcher;

#[cfg(all(target_os = "linux", feature = "motion_sensor"))]
pub mod evdev_input;


pub use input::{InputSource, ScriptedInput};
pub use state::{EdgeFilter, LevelMapping, MotionState};
pub use watcher::MotionWatcher;

#[cfg(all(target_os = "linux", feature = "motion_sensor"))]
pub use evdev_input::EvdevInput;

use crate::config::MotionConfig;
use crate::error::InputError;

/// Open the hardware motion input described by the configuration
pub fn open_input(config: &MotionConfig) -> Result<Box<dyn InputSource>, InputError> {
    #[cfg(all(target_os = "linux", feature = "motion_sensor"))]
    {
        Ok(Box::new(EvdevInput::open(config)?))
    }

    #[cfg(not(all(target_os = "linux", feature = "motion_sensor")))]
    {
        tracing::warn!("Motion sensor support not compiled in");
        Err(InputError::InputUnavailable {
            line: config.line.clone(),
            details: "motion_sensor feature disabled".to_string(),
        })
    }
}
