//! Append-only audit log and cumulative run metrics.
//!
//! Both live for the process lifetime, unlike the per-run `WorkflowRun`
//! state. The audit log is bounded: once it reaches [`AUDIT_LOG_CAP`]
//! entries it is batch-truncated down to the newest [`AUDIT_LOG_RETAIN`].
//! Metrics keep no historical samples; running averages are maintained with
//! the incremental-mean formula so they can never drift from the counts.

use crate::engine::report::StageRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

pub const AUDIT_LOG_CAP: usize = 1000;
pub const AUDIT_LOG_RETAIN: usize = 500;

/// One timestamped engine-level event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMetrics {
    pub executions: u64,
    pub avg_duration_ms: f64,
}

/// Cumulative counters plus running averages, overall and per stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub rollbacks_attempted: u64,
    pub avg_duration_ms: f64,
    pub stages: HashMap<String, StageMetrics>,
}

pub struct Recorder {
    enabled: bool,
    entries: Mutex<Vec<AuditEntry>>,
    metrics: Mutex<WorkflowMetrics>,
}

impl Recorder {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(Vec::new()),
            metrics: Mutex::new(WorkflowMetrics::default()),
        }
    }

    /// Append an entry. The timestamp is engine time unless `data` carries a
    /// `timestamp` field that parses as RFC 3339, in which case the caller's
    /// clock wins.
    pub fn record(&self, event: &str, data: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let timestamp = data
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        trace!(event, "audit entry recorded");
        let mut entries = lock(&self.entries);
        entries.push(AuditEntry {
            event: event.to_string(),
            data,
            timestamp,
        });
        if entries.len() > AUDIT_LOG_CAP {
            let excess = entries.len() - AUDIT_LOG_RETAIN;
            entries.drain(0..excess);
        }
    }

    /// Fold one completed run into the cumulative metrics.
    pub fn update_metrics(
        &self,
        success: bool,
        duration_ms: u64,
        records: &[StageRecord],
        rollback_attempted: bool,
    ) {
        let mut metrics = lock(&self.metrics);
        metrics.total_runs += 1;
        if success {
            metrics.successful_runs += 1;
        } else {
            metrics.failed_runs += 1;
        }
        if rollback_attempted {
            metrics.rollbacks_attempted += 1;
        }
        metrics.avg_duration_ms =
            incremental_mean(metrics.avg_duration_ms, metrics.total_runs, duration_ms as f64);

        for record in records {
            let stage = metrics.stages.entry(record.stage.clone()).or_default();
            stage.executions += 1;
            stage.avg_duration_ms = incremental_mean(
                stage.avg_duration_ms,
                stage.executions,
                record.duration_ms as f64,
            );
        }
    }

    pub fn metrics(&self) -> WorkflowMetrics {
        lock(&self.metrics).clone()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        lock(&self.entries).clone()
    }

    pub fn entry_count(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// `new_avg = (old_avg * (n - 1) + x) / n`, where `n` already includes the
/// new sample.
fn incremental_mean(old_avg: f64, n: u64, x: f64) -> f64 {
    (old_avg * (n - 1) as f64 + x) / n as f64
}

// Audit data is forensic; recover it from a poisoned lock rather than
// propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageKind;
    use serde_json::json;

    fn stage_record(kind: StageKind, duration_ms: u64) -> StageRecord {
        StageRecord {
            stage: kind.name().to_string(),
            kind,
            started_at: Utc::now(),
            duration_ms,
            success: true,
        }
    }

    #[test]
    fn record_appends_with_engine_timestamp() {
        let recorder = Recorder::new(true);
        recorder.record("workflow:started", json!({"workflowId": "x"}));
        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "workflow:started");
        assert!((Utc::now() - entries[0].timestamp).num_seconds() < 5);
    }

    #[test]
    fn record_honors_caller_supplied_timestamp() {
        let recorder = Recorder::new(true);
        recorder.record(
            "stage:completed",
            json!({"timestamp": "2024-03-01T12:00:00Z"}),
        );
        let entries = recorder.entries();
        assert_eq!(
            entries[0].timestamp,
            "2024-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn record_falls_back_on_unparseable_timestamp() {
        let recorder = Recorder::new(true);
        recorder.record("stage:completed", json!({"timestamp": "yesterday-ish"}));
        assert!((Utc::now() - recorder.entries()[0].timestamp).num_seconds() < 5);
    }

    #[test]
    fn disabled_recorder_drops_everything() {
        let recorder = Recorder::new(false);
        recorder.record("workflow:started", json!({}));
        assert_eq!(recorder.entry_count(), 0);
        assert!(!recorder.is_enabled());
    }

    #[test]
    fn overflow_truncates_to_newest_500() {
        let recorder = Recorder::new(true);
        for i in 0..1001 {
            recorder.record("tick", json!({"seq": i}));
        }
        let entries = recorder.entries();
        assert_eq!(entries.len(), AUDIT_LOG_RETAIN);
        // The retained window is the most recent entries.
        assert_eq!(entries[0].data["seq"], 501);
        assert_eq!(entries[AUDIT_LOG_RETAIN - 1].data["seq"], 1000);
    }

    #[test]
    fn metrics_average_matches_arithmetic_mean() {
        let recorder = Recorder::new(true);
        let durations = [120u64, 340, 95, 410, 230, 60, 180, 275];
        for d in durations {
            recorder.update_metrics(true, d, &[], false);
        }
        let metrics = recorder.metrics();
        let expected = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
        assert_eq!(metrics.total_runs, durations.len() as u64);
        assert!((metrics.avg_duration_ms - expected).abs() < 1e-9);
    }

    #[test]
    fn metrics_track_per_stage_averages() {
        let recorder = Recorder::new(true);
        recorder.update_metrics(
            true,
            100,
            &[
                stage_record(StageKind::Initialize, 10),
                stage_record(StageKind::ExecuteTesting, 80),
            ],
            false,
        );
        recorder.update_metrics(
            false,
            200,
            &[
                stage_record(StageKind::Initialize, 20),
                stage_record(StageKind::ExecuteTesting, 160),
            ],
            true,
        );
        let metrics = recorder.metrics();
        assert_eq!(metrics.successful_runs, 1);
        assert_eq!(metrics.failed_runs, 1);
        assert_eq!(metrics.rollbacks_attempted, 1);
        let init = &metrics.stages["initialize"];
        assert_eq!(init.executions, 2);
        assert!((init.avg_duration_ms - 15.0).abs() < 1e-9);
        let testing = &metrics.stages["executeTesting"];
        assert!((testing.avg_duration_ms - 120.0).abs() < 1e-9);
    }

    #[test]
    fn metrics_stage_counts_stay_consistent_with_averages() {
        let recorder = Recorder::new(true);
        for i in 1..=50u64 {
            recorder.update_metrics(true, i, &[stage_record(StageKind::ExecuteLinting, i)], false);
        }
        let metrics = recorder.metrics();
        // mean of 1..=50 is 25.5
        assert!((metrics.avg_duration_ms - 25.5).abs() < 1e-9);
        let lint = &metrics.stages["executeLinting"];
        assert_eq!(lint.executions, 50);
        assert!((lint.avg_duration_ms - 25.5).abs() < 1e-9);
    }
}
