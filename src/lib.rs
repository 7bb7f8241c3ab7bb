//! devflow — a workflow orchestration engine.
//!
//! Sequences named, conditionally-enabled stages (file tracking, linting,
//! testing, commit creation) into a single workflow run. The engine tracks
//! per-stage timing, keeps a bounded rollback history, emits an audit trail,
//! and applies a fail-fast policy to required stages while letting optional
//! stage failures pass through.
//!
//! The engine never performs git, lint, or test work itself: those live
//! behind the async collaborator traits in [`subsystems`], resolved once
//! into a fixed capability set at construction.

pub mod config;
pub mod engine;
pub mod errors;
pub mod recorder;
pub mod rollback;
pub mod stage;
pub mod subsystems;

pub use config::{RunOptions, WorkflowConfig};
pub use engine::observer::{TracingObserver, WorkflowObserver};
pub use engine::report::{EngineStatistics, StageOutcome, StageRecord, WorkflowReport};
pub use engine::WorkflowEngine;
pub use errors::WorkflowError;
pub use stage::{StageDescriptor, StageKind, StageRegistry};
pub use subsystems::{Subsystems, SubsystemsBuilder};
