//! Progress notification without coupling the driver to any presentation.
//!
//! The driver writes to an observer at each decision point; listeners
//! (logging, dashboards) implement whichever callbacks they care about. All
//! methods default to no-ops.

use crate::engine::report::{StageOutcome, WorkflowReport};
use crate::rollback::ReplayOutcome;
use crate::stage::StageDescriptor;
use tracing::{info, warn};
use uuid::Uuid;

pub trait WorkflowObserver: Send + Sync {
    fn on_run_started(&self, _workflow_id: Uuid) {}
    fn on_stage_started(&self, _stage: &StageDescriptor) {}
    fn on_stage_skipped(&self, _stage: &StageDescriptor, _reason: &str) {}
    fn on_stage_completed(&self, _stage: &StageDescriptor, _outcome: &StageOutcome, _duration_ms: u64) {
    }
    fn on_rollback(&self, _outcome: &ReplayOutcome) {}
    fn on_run_completed(&self, _report: &WorkflowReport) {}
}

/// Observer that forwards progress to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl WorkflowObserver for TracingObserver {
    fn on_run_started(&self, workflow_id: Uuid) {
        info!(%workflow_id, "workflow started");
    }

    fn on_stage_started(&self, stage: &StageDescriptor) {
        info!(stage = stage.name(), "stage started");
    }

    fn on_stage_skipped(&self, stage: &StageDescriptor, reason: &str) {
        info!(stage = stage.name(), reason, "stage skipped");
    }

    fn on_stage_completed(&self, stage: &StageDescriptor, outcome: &StageOutcome, duration_ms: u64) {
        if outcome.success {
            info!(stage = stage.name(), duration_ms, "stage completed");
        } else {
            warn!(
                stage = stage.name(),
                duration_ms,
                error = ?outcome.error,
                "stage failed"
            );
        }
    }

    fn on_rollback(&self, outcome: &ReplayOutcome) {
        if outcome.success {
            info!(stage = %outcome.stage, "rollback replayed");
        } else {
            warn!(stage = %outcome.stage, error = ?outcome.error, "rollback replay failed");
        }
    }

    fn on_run_completed(&self, report: &WorkflowReport) {
        info!(
            workflow_id = ?report.workflow_id,
            success = report.success,
            stages = report.stages.len(),
            duration_ms = report.execution_time_ms,
            "workflow completed"
        );
    }
}
