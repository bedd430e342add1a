mod orchestrator;
mod request;

pub use orchestrator::{CaptureOrchestrator, OrchestratorState, OrchestratorStats, TriggerOutcome};
pub use request::{CaptureRequest, TriggerSource};
