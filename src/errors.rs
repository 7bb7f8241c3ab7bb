//! Typed error hierarchy for the workflow engine.
//!
//! Only precondition failures are surfaced as errors: a call that cannot
//! start at all. Everything that happens inside a run (stage failures,
//! capture failures, replay failures) is data, carried in the report so the
//! caller can apply policy to it.

use thiserror::Error;
use uuid::Uuid;

/// Precondition failures: the call was rejected before any stage ran.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow already running (id {run_id})")]
    AlreadyRunning { run_id: Uuid },

    #[error("engine has not been initialized")]
    NotInitialized,

    #[error("required subsystem missing: {name}")]
    MissingSubsystem { name: &'static str },

    #[error("engine has been shut down")]
    ShutDown,
}
