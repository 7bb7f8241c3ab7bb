//! Result types produced by a workflow run.

use crate::recorder::WorkflowMetrics;
use crate::rollback::ReplayOutcome;
use crate::stage::StageKind;
use crate::subsystems::SubsystemKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of one stage handler. Produced once; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage-specific payload, usually the serialized collaborator result.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl StageOutcome {
    pub fn ok(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            payload,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload: serde_json::Value::Null,
        }
    }

    pub fn from_collaborator(
        success: bool,
        error: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            success,
            error,
            payload,
        }
    }
}

/// One executed stage, in execution order. Skipped stages never produce a
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: String,
    pub kind: StageKind,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
}

/// Final report for one workflow run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReport {
    pub success: bool,
    pub workflow_id: Option<Uuid>,
    pub stages: Vec<StageRecord>,
    pub results: HashMap<String, StageOutcome>,
    pub execution_time_ms: u64,
    /// Per-stage durations for this run.
    pub performance: HashMap<String, u64>,
    pub dry_run: bool,
    /// Whether at least one rollback point was captured during this run.
    pub rollback_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<ReplayOutcome>,
}

impl WorkflowReport {
    /// A run that was rejected before any stage executed.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            workflow_id: None,
            stages: Vec::new(),
            results: HashMap::new(),
            execution_time_ms: 0,
            performance: HashMap::new(),
            dry_run: false,
            rollback_available: false,
            error: Some(error.into()),
            failed_stage: None,
            rollback: None,
        }
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|r| r.stage.as_str()).collect()
    }

    pub fn passed_count(&self) -> usize {
        self.stages.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.stages.iter().filter(|r| !r.success).count()
    }
}

/// Read-only snapshot returned by `WorkflowEngine::get_statistics`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatistics {
    pub metrics: WorkflowMetrics,
    /// Subsystems present in the capability set.
    pub subsystems: Vec<SubsystemKind>,
    /// Id of the run in flight, if any.
    pub current_workflow: Option<Uuid>,
    /// Depth of the forensic rollback stack.
    pub rollback_stack: usize,
    /// Configured (but unenforced) per-stage timeout, in milliseconds.
    pub stage_timeout_ms: Option<u64>,
}
