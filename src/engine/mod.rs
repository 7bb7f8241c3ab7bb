//! The workflow driver.
//!
//! Walks the stage registry in order, applying skip and failure policy,
//! driving rollback capture/replay and the audit recorder, and folding the
//! run into a final report. All stage handlers are awaited sequentially;
//! the driver does no concurrent work while a handler is in flight.
//!
//! One run at a time: the guard is taken non-blocking before any suspending
//! work, so a second call while a run is active is rejected synchronously
//! with no side effects and no queuing.

pub mod observer;
pub mod report;

use crate::config::{RunOptions, WorkflowConfig};
use crate::errors::WorkflowError;
use crate::recorder::{AuditEntry, Recorder};
use crate::rollback::{RollbackManager, RollbackPoint};
use crate::stage::{StageKind, StageRegistry};
use crate::subsystems::{
    CommitRequest, LintRequest, ReportRequest, StartTracking, Subsystems, TestRequest,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use observer::WorkflowObserver;
use report::{EngineStatistics, StageOutcome, StageRecord, WorkflowReport};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-invocation aggregate, exclusively owned by the driver for the run's
/// lifetime and discarded once folded into the report.
struct WorkflowRun {
    id: Uuid,
    started_at: DateTime<Utc>,
    records: Vec<StageRecord>,
    outcomes: HashMap<String, StageOutcome>,
    rollback_points: Vec<RollbackPoint>,
    durations: HashMap<String, u64>,
}

impl WorkflowRun {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            records: Vec::new(),
            outcomes: HashMap::new(),
            rollback_points: Vec::new(),
            durations: HashMap::new(),
        }
    }
}

pub struct WorkflowEngine {
    config: WorkflowConfig,
    subsystems: Subsystems,
    registry: StageRegistry,
    recorder: Recorder,
    rollback: RollbackManager,
    observer: Option<Arc<dyn WorkflowObserver>>,
    run_guard: tokio::sync::Mutex<()>,
    current_run: Mutex<Option<Uuid>>,
    initialized: AtomicBool,
    shut_down: AtomicBool,
}

impl WorkflowEngine {
    pub fn new(config: WorkflowConfig, subsystems: Subsystems) -> Self {
        let registry = StageRegistry::resolve(&subsystems);
        let recorder = Recorder::new(config.audit_enabled);
        Self {
            config,
            subsystems,
            registry,
            recorder,
            rollback: RollbackManager::new(),
            observer: None,
            run_guard: tokio::sync::Mutex::new(()),
            current_run: Mutex::new(None),
            initialized: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WorkflowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Current audit log contents, newest last.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.recorder.entries()
    }

    /// Verify the capability set and mark the engine ready. Idempotent.
    /// Returns `false` when a subsystem listed in
    /// `WorkflowConfig::required_subsystems` is absent, or after shutdown.
    pub async fn initialize(&self) -> bool {
        if self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        if self.initialized.load(Ordering::SeqCst) {
            return true;
        }
        for kind in &self.config.required_subsystems {
            if !self.subsystems.has(*kind) {
                warn!(subsystem = kind.name(), "required subsystem missing");
                self.recorder
                    .record("engine:init_failed", json!({"missing": kind.name()}));
                return false;
            }
        }
        let stages: Vec<&str> = self.registry.stages().iter().map(|s| s.name()).collect();
        self.recorder.record(
            "engine:initialized",
            json!({
                "subsystems": self.subsystems.available(),
                "stages": stages,
            }),
        );
        self.initialized.store(true, Ordering::SeqCst);
        true
    }

    /// Execute one workflow run and return its report.
    ///
    /// Never returns an `Err`: precondition rejections and run failures are
    /// both expressed in the report so callers get a uniform shape.
    pub async fn execute_workflow(&self, options: RunOptions) -> WorkflowReport {
        if self.shut_down.load(Ordering::SeqCst) {
            return self.reject(WorkflowError::ShutDown);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return self.reject(WorkflowError::NotInitialized);
        }
        // Single-run guard, taken before any suspending work. Releasing is
        // tied to guard drop, so every exit path returns the engine to idle.
        let Ok(_guard) = self.run_guard.try_lock() else {
            let run_id = self.current_run_id().unwrap_or(Uuid::nil());
            return self.reject(WorkflowError::AlreadyRunning { run_id });
        };

        let run = WorkflowRun::new();
        self.set_current_run(Some(run.id));
        let report = self.drive(run, &options).await;
        self.set_current_run(None);
        if let Some(observer) = &self.observer {
            observer.on_run_completed(&report);
        }
        report
    }

    async fn drive(&self, mut run: WorkflowRun, options: &RunOptions) -> WorkflowReport {
        let timer = Instant::now();
        let fail_fast = options.fail_fast.unwrap_or(self.config.fail_fast);
        let rollback_enabled = options
            .rollback_on_failure
            .unwrap_or(self.config.rollback_enabled);

        self.recorder.record(
            "workflow:started",
            json!({
                "workflowId": run.id,
                "startedAt": run.started_at.to_rfc3339(),
                "dryRun": options.dry_run,
                "failFast": fail_fast,
                "rollbackEnabled": rollback_enabled,
            }),
        );
        if let Some(observer) = &self.observer {
            observer.on_run_started(run.id);
        }

        let mut failed_stage: Option<String> = None;
        let mut error: Option<String> = None;

        for descriptor in self.registry.stages() {
            let stage = descriptor.name();

            if options.skips(descriptor.kind) {
                debug!(stage, "stage skipped by run options");
                self.recorder.record(
                    "stage:skipped",
                    json!({"workflowId": run.id, "stage": stage}),
                );
                if let Some(observer) = &self.observer {
                    observer.on_stage_skipped(descriptor, "disabled by run options");
                }
                continue;
            }

            // Capture happens-before the handler. A failed capture is
            // logged inside the manager and never blocks the stage.
            if descriptor.rollback_eligible && rollback_enabled {
                if let Some(point) = self.rollback.capture(stage, &self.subsystems).await {
                    self.recorder.record(
                        "rollback:captured",
                        json!({"workflowId": run.id, "stage": stage}),
                    );
                    run.rollback_points.push(point);
                }
            }

            if let Some(observer) = &self.observer {
                observer.on_stage_started(descriptor);
            }
            let started_at = Utc::now();
            let stage_timer = Instant::now();
            let result = self.run_stage(descriptor.kind, run.id, options).await;
            let duration_ms = stage_timer.elapsed().as_millis() as u64;

            // An Err escaping a handler is an unexpected failure: it aborts
            // the run regardless of stage policy.
            let (outcome, aborted) = match result {
                Ok(outcome) => (outcome, false),
                Err(e) => (
                    StageOutcome::failed(format!("workflow {} aborted: {e:#}", run.id)),
                    true,
                ),
            };

            run.records.push(StageRecord {
                stage: stage.to_string(),
                kind: descriptor.kind,
                started_at,
                duration_ms,
                success: outcome.success,
            });
            run.durations.insert(stage.to_string(), duration_ms);
            self.recorder.record(
                "stage:completed",
                json!({
                    "workflowId": run.id,
                    "stage": stage,
                    "success": outcome.success,
                    "durationMs": duration_ms,
                }),
            );
            if let Some(observer) = &self.observer {
                observer.on_stage_completed(descriptor, &outcome, duration_ms);
            }

            let failed = !outcome.success;
            let stage_error = outcome.error.clone();
            run.outcomes.insert(stage.to_string(), outcome);

            if aborted {
                warn!(stage, "unexpected error, aborting run");
                failed_stage = Some(stage.to_string());
                error = stage_error;
                break;
            }
            if failed {
                if descriptor.required && fail_fast {
                    warn!(stage, "required stage failed, aborting run");
                    failed_stage = Some(stage.to_string());
                    error =
                        stage_error.or_else(|| Some(format!("required stage {stage} failed")));
                    break;
                }
                warn!(stage, error = ?stage_error, "optional stage failed, continuing");
            }
        }

        let success = failed_stage.is_none();
        let rollback_available = !run.rollback_points.is_empty();

        // Replay is the most recent point of this run, which is not
        // necessarily the one captured before the failed stage. Earlier
        // eligible stages' changes may go uncompensated; documented
        // best-effort behavior.
        let mut rollback_outcome = None;
        if !success && rollback_enabled {
            if let Some(point) = run.rollback_points.last() {
                let outcome = self.rollback.replay(point, &self.subsystems).await;
                self.recorder.record(
                    "rollback:replayed",
                    json!({
                        "workflowId": run.id,
                        "stage": outcome.stage.clone(),
                        "success": outcome.success,
                    }),
                );
                if let Some(observer) = &self.observer {
                    observer.on_rollback(&outcome);
                }
                rollback_outcome = Some(outcome);
            }
        }

        let execution_time_ms = timer.elapsed().as_millis() as u64;
        self.recorder.update_metrics(
            success,
            execution_time_ms,
            &run.records,
            rollback_outcome.is_some(),
        );
        self.recorder.record(
            "workflow:completed",
            json!({
                "workflowId": run.id,
                "success": success,
                "durationMs": execution_time_ms,
                "failedStage": failed_stage.clone(),
            }),
        );
        info!(
            workflow_id = %run.id,
            success,
            stages = run.records.len(),
            "workflow run finished"
        );

        WorkflowReport {
            success,
            workflow_id: Some(run.id),
            stages: run.records,
            results: run.outcomes,
            execution_time_ms,
            performance: run.durations,
            dry_run: options.dry_run,
            rollback_available,
            error,
            failed_stage,
            rollback: rollback_outcome,
        }
    }

    async fn run_stage(
        &self,
        kind: StageKind,
        run_id: Uuid,
        options: &RunOptions,
    ) -> Result<StageOutcome> {
        match kind {
            StageKind::Initialize => self.stage_initialize().await,
            StageKind::StartFileTracking => self.stage_start_tracking(run_id).await,
            StageKind::ExecuteLinting => self.stage_linting().await,
            StageKind::ExecuteTesting => self.stage_testing().await,
            StageKind::StopFileTracking => self.stage_stop_tracking().await,
            StageKind::CreateCommit => self.stage_create_commit(options).await,
            StageKind::Finalize => self.stage_finalize().await,
        }
    }

    /// Pre-run invariant: external state must be readable. When git is
    /// present, an unusable status fails the stage (and, being required,
    /// the run under fail-fast).
    async fn stage_initialize(&self) -> Result<StageOutcome> {
        let mut payload = json!({"subsystems": self.subsystems.available()});
        if let Some(git) = &self.subsystems.git {
            let status = git.status().await?;
            if !status.success {
                let error = status
                    .error
                    .clone()
                    .unwrap_or_else(|| "git status failed".to_string());
                return Ok(StageOutcome::from_collaborator(
                    false,
                    Some(error),
                    to_payload(&status),
                ));
            }
            payload["gitClean"] = json!(status.is_clean);
            payload["pendingFiles"] = json!(status.files.len());
        }
        Ok(StageOutcome::ok(payload))
    }

    async fn stage_start_tracking(&self, run_id: Uuid) -> Result<StageOutcome> {
        let tracker = self
            .subsystems
            .file_tracker
            .as_ref()
            .ok_or(WorkflowError::MissingSubsystem { name: "fileTracker" })?;
        let started = tracker
            .start_tracking(StartTracking {
                session_name: format!("workflow-{run_id}"),
                initial_scan: true,
            })
            .await?;
        Ok(StageOutcome::from_collaborator(
            started.success,
            started.error.clone(),
            to_payload(&started),
        ))
    }

    async fn stage_linting(&self) -> Result<StageOutcome> {
        let linter = self
            .subsystems
            .linter
            .as_ref()
            .ok_or(WorkflowError::MissingSubsystem { name: "linter" })?;
        let outcome = linter
            .execute(LintRequest {
                auto_fix: self.config.lint_auto_fix,
                skip_warnings: self.config.lint_skip_warnings,
            })
            .await?;
        Ok(StageOutcome::from_collaborator(
            outcome.success,
            outcome.error.clone(),
            to_payload(&outcome),
        ))
    }

    async fn stage_testing(&self) -> Result<StageOutcome> {
        let tester = self
            .subsystems
            .tester
            .as_ref()
            .ok_or(WorkflowError::MissingSubsystem { name: "tester" })?;
        let outcome = tester
            .execute(TestRequest {
                coverage: self.config.test_coverage,
                verbose: self.config.test_verbose,
            })
            .await?;
        let mut payload = to_payload(&outcome);

        // Report post-processing is optional decoration; its failure never
        // affects the stage outcome.
        if let Some(reporter) = &self.subsystems.reporter {
            let request = ReportRequest {
                verbose: self.config.test_verbose,
            };
            match reporter.process_results(&outcome, request).await {
                Ok(report) => {
                    payload["report"] = report.report;
                }
                Err(e) => {
                    warn!(error = %e, "test reporter failed, continuing without report");
                }
            }
        }
        Ok(StageOutcome::from_collaborator(
            outcome.success,
            outcome.error,
            payload,
        ))
    }

    async fn stage_stop_tracking(&self) -> Result<StageOutcome> {
        let tracker = self
            .subsystems
            .file_tracker
            .as_ref()
            .ok_or(WorkflowError::MissingSubsystem { name: "fileTracker" })?;
        let stopped = tracker.stop_tracking().await?;
        Ok(StageOutcome::from_collaborator(
            stopped.success,
            stopped.error.clone(),
            to_payload(&stopped),
        ))
    }

    async fn stage_create_commit(&self, options: &RunOptions) -> Result<StageOutcome> {
        let committer = self
            .subsystems
            .committer
            .as_ref()
            .ok_or(WorkflowError::MissingSubsystem { name: "committer" })?;
        let outcome = committer
            .create_commit(CommitRequest {
                message: options.commit_message.clone(),
                template: options.commit_template.clone(),
                template_data: options.commit_template_data.clone(),
                dry_run: options.dry_run,
            })
            .await?;
        Ok(StageOutcome::from_collaborator(
            outcome.success,
            outcome.error.clone(),
            to_payload(&outcome),
        ))
    }

    /// Post-run invariant: leave a clean engine. Verifies external state is
    /// still readable when git is present; bookkeeping only otherwise.
    async fn stage_finalize(&self) -> Result<StageOutcome> {
        let mut payload = json!({});
        if let Some(git) = &self.subsystems.git {
            let status = git.status().await?;
            if !status.success {
                let error = status
                    .error
                    .clone()
                    .unwrap_or_else(|| "git status failed".to_string());
                return Ok(StageOutcome::from_collaborator(
                    false,
                    Some(error),
                    to_payload(&status),
                ));
            }
            payload["gitClean"] = json!(status.is_clean);
        }
        if let Some(tracker) = &self.subsystems.file_tracker {
            payload["trackedFiles"] = json!(tracker.tracked_files().await.len());
        }
        Ok(StageOutcome::ok(payload))
    }

    /// Read-only snapshot of cumulative metrics and engine state.
    pub fn get_statistics(&self) -> EngineStatistics {
        EngineStatistics {
            metrics: self.recorder.metrics(),
            subsystems: self.subsystems.available(),
            current_workflow: self.current_run_id(),
            rollback_stack: self.rollback.depth(),
            stage_timeout_ms: self
                .config
                .stage_timeout
                .map(|t| t.as_millis() as u64),
        }
    }

    /// Release collaborator resources. Does not cancel an in-flight run;
    /// subsequent calls are no-ops and subsequent runs are rejected.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("engine shutting down");
        self.subsystems.shutdown_all().await;
        self.recorder.record("engine:shutdown", json!({}));
    }

    fn reject(&self, error: WorkflowError) -> WorkflowReport {
        warn!(%error, "workflow invocation rejected");
        self.recorder
            .record("workflow:rejected", json!({"reason": error.to_string()}));
        WorkflowReport::rejected(error.to_string())
    }

    fn current_run_id(&self) -> Option<Uuid> {
        *self
            .current_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn set_current_run(&self, id: Option<Uuid>) {
        *self
            .current_run
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = id;
    }
}

fn to_payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
