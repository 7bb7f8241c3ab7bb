//! Rollback point capture and replay.
//!
//! A rollback point is a best-effort snapshot of external state taken before
//! a stage that could leave the system partially modified. Capture must
//! never block the protected stage: any failure is logged and swallowed.
//! Replay issues compensating operations for whatever snapshot categories
//! exist and is equally best-effort — a failed replay is reported, not
//! retried.
//!
//! The manager keeps a bounded LIFO stack across runs as a forensic aid.
//! The driver does not replay from this stack; it replays the most recent
//! point captured during the current run.

use crate::subsystems::Subsystems;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Oldest points are evicted once the forensic stack reaches this depth.
pub const ROLLBACK_STACK_CAP: usize = 20;

/// Opaque snapshot data gathered from whichever collaborators were present
/// and answered at capture time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSnapshot {
    /// Paths reported modified by git at capture time.
    pub git_files: Option<Vec<String>>,
    /// Files the tracker had under observation at capture time.
    pub tracked_files: Option<Vec<PathBuf>>,
}

impl RollbackSnapshot {
    pub fn is_empty(&self) -> bool {
        self.git_files.is_none() && self.tracked_files.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPoint {
    pub stage: String,
    pub captured_at: DateTime<Utc>,
    pub snapshot: RollbackSnapshot,
}

/// Result of replaying one rollback point.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub success: bool,
    pub stage: String,
    pub error: Option<String>,
}

pub struct RollbackManager {
    stack: Mutex<VecDeque<RollbackPoint>>,
}

impl Default for RollbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RollbackManager {
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(VecDeque::with_capacity(ROLLBACK_STACK_CAP)),
        }
    }

    /// Snapshot external state before `stage` runs. Returns `None` when no
    /// collaborator could contribute anything; the caller proceeds with the
    /// stage either way.
    pub async fn capture(&self, stage: &str, subsystems: &Subsystems) -> Option<RollbackPoint> {
        let mut snapshot = RollbackSnapshot::default();

        if let Some(git) = &subsystems.git {
            match git.status().await {
                Ok(status) if status.success => {
                    snapshot.git_files = Some(status.files);
                }
                Ok(status) => {
                    warn!(stage, error = ?status.error, "git status unusable for rollback capture");
                }
                Err(e) => {
                    warn!(stage, error = %e, "rollback capture could not read git status");
                }
            }
        }

        if let Some(tracker) = &subsystems.file_tracker {
            snapshot.tracked_files = Some(tracker.tracked_files().await);
        }

        if snapshot.is_empty() {
            warn!(stage, "no snapshot data available, rollback point not captured");
            return None;
        }

        let point = RollbackPoint {
            stage: stage.to_string(),
            captured_at: Utc::now(),
            snapshot,
        };
        self.push(point.clone());
        debug!(stage, "rollback point captured");
        Some(point)
    }

    /// Issue compensating operations for the snapshot categories present in
    /// `point`. A git snapshot is compensated by unstaging index changes;
    /// tracked-file snapshots have no side effects to undo and are only
    /// logged for the forensic trail.
    pub async fn replay(&self, point: &RollbackPoint, subsystems: &Subsystems) -> ReplayOutcome {
        let mut error: Option<String> = None;

        if point.snapshot.git_files.is_some() {
            match &subsystems.git {
                Some(git) => {
                    let argv = vec!["reset".to_string(), "HEAD".to_string()];
                    match git.run_command(&argv).await {
                        Ok(output) if output.success => {
                            debug!(stage = %point.stage, "git index unstaged");
                        }
                        Ok(output) => {
                            error = Some(
                                output
                                    .error
                                    .unwrap_or_else(|| "git reset failed".to_string()),
                            );
                        }
                        Err(e) => {
                            error = Some(format!("git reset failed: {e:#}"));
                        }
                    }
                }
                None => {
                    error = Some("git snapshot present but git subsystem unavailable".to_string());
                }
            }
        }

        if let Some(tracked) = &point.snapshot.tracked_files {
            debug!(stage = %point.stage, files = tracked.len(), "tracked-file snapshot replayed (no-op)");
        }

        if let Some(error) = &error {
            warn!(stage = %point.stage, error, "rollback replay failed");
        }
        ReplayOutcome {
            success: error.is_none(),
            stage: point.stage.clone(),
            error,
        }
    }

    fn push(&self, point: RollbackPoint) {
        let mut stack = self.lock();
        if stack.len() == ROLLBACK_STACK_CAP {
            stack.pop_front();
        }
        stack.push_back(point);
    }

    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    /// Most-recent-last view of the forensic stack.
    pub fn stack_snapshot(&self) -> Vec<RollbackPoint> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RollbackPoint>> {
        // The stack is forensic data; a panicked writer must not poison it
        // for everyone else.
        self.stack.lock().unwrap_or_else(|e| e.into_inner())
    }
}
