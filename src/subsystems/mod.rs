//! Collaborator contracts and the fixed capability set.
//!
//! Abstractions over the external subsystems for testability. Real
//! implementations live with the subsystems themselves (git plumbing, the
//! lint runner, the test runner); test doubles live next to the tests. Every
//! contract is an async trait behind `Arc`, and every result type carries
//! `success` + `error` so it can become a stage payload unchanged.
//!
//! The `Subsystems` set is resolved once, before the engine is built.
//! Presence is a construction-time fact: stage registration keys off it, and
//! nothing re-checks availability per call site afterwards.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Identifies one collaborator slot in the capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubsystemKind {
    Git,
    FileTracker,
    Linter,
    Tester,
    Committer,
    Reporter,
}

impl SubsystemKind {
    pub fn name(self) -> &'static str {
        match self {
            SubsystemKind::Git => "git",
            SubsystemKind::FileTracker => "fileTracker",
            SubsystemKind::Linter => "linter",
            SubsystemKind::Tester => "tester",
            SubsystemKind::Committer => "committer",
            SubsystemKind::Reporter => "reporter",
        }
    }
}

// ---------------------------------------------------------------------------
// Result payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub success: bool,
    pub files: Vec<String>,
    pub detailed_files: Vec<GitFileStatus>,
    pub is_clean: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitFileStatus {
    pub path: String,
    pub index_status: String,
    pub worktree_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCommandOutput {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTracking {
    pub session_name: String,
    pub initial_scan: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStarted {
    pub success: bool,
    pub session_name: String,
    pub initial_files: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStopped {
    pub success: bool,
    pub tracked_files: Vec<PathBuf>,
    pub file_count: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintRequest {
    pub auto_fix: bool,
    pub skip_warnings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOutcome {
    pub success: bool,
    pub attempts: u32,
    pub auto_fix_applied: bool,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub coverage: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub success: bool,
    pub attempts: u32,
    pub execution_time_ms: u64,
    /// Parser output in whatever shape the test runner produces.
    pub parsed_results: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub message: Option<String>,
    pub template: Option<String>,
    pub template_data: Option<serde_json::Value>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub success: bool,
    pub commit_hash: Option<String>,
    pub message: String,
    pub attempts: u32,
    pub execution_time_ms: u64,
    pub dry_run: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub success: bool,
    pub report: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Read access to repository state plus a raw command escape hatch used for
/// rollback compensation. Pre-flight validation only; the engine never
/// mutates the repository through this trait on the happy path.
#[async_trait]
pub trait GitState: Send + Sync {
    async fn status(&self) -> Result<GitStatus>;
    async fn run_command(&self, argv: &[String]) -> Result<GitCommandOutput>;
    async fn shutdown(&self) {}
}

#[async_trait]
pub trait FileTracker: Send + Sync {
    async fn start_tracking(&self, request: StartTracking) -> Result<TrackingStarted>;
    async fn stop_tracking(&self) -> Result<TrackingStopped>;
    /// Snapshot of what is currently tracked, without stopping the session.
    async fn tracked_files(&self) -> Vec<PathBuf>;
    async fn shutdown(&self) {}
}

#[async_trait]
pub trait LintRunner: Send + Sync {
    async fn execute(&self, request: LintRequest) -> Result<LintOutcome>;
    async fn shutdown(&self) {}
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn execute(&self, request: TestRequest) -> Result<TestOutcome>;
    async fn shutdown(&self) {}
}

#[async_trait]
pub trait CommitCreator: Send + Sync {
    async fn create_commit(&self, request: CommitRequest) -> Result<CommitOutcome>;
    async fn shutdown(&self) {}
}

/// Optional post-processor for test runner output.
#[async_trait]
pub trait TestReporter: Send + Sync {
    async fn process_results(
        &self,
        outcome: &TestOutcome,
        request: ReportRequest,
    ) -> Result<TestReport>;
    async fn shutdown(&self) {}
}

// ---------------------------------------------------------------------------
// Capability set
// ---------------------------------------------------------------------------

/// The fixed collaborator set the engine runs against. Each slot is optional;
/// absence is decided here, once, and flows into stage registration.
#[derive(Clone, Default)]
pub struct Subsystems {
    pub git: Option<Arc<dyn GitState>>,
    pub file_tracker: Option<Arc<dyn FileTracker>>,
    pub linter: Option<Arc<dyn LintRunner>>,
    pub tester: Option<Arc<dyn TestRunner>>,
    pub committer: Option<Arc<dyn CommitCreator>>,
    pub reporter: Option<Arc<dyn TestReporter>>,
}

impl Subsystems {
    pub fn builder() -> SubsystemsBuilder {
        SubsystemsBuilder::default()
    }

    pub fn has(&self, kind: SubsystemKind) -> bool {
        match kind {
            SubsystemKind::Git => self.git.is_some(),
            SubsystemKind::FileTracker => self.file_tracker.is_some(),
            SubsystemKind::Linter => self.linter.is_some(),
            SubsystemKind::Tester => self.tester.is_some(),
            SubsystemKind::Committer => self.committer.is_some(),
            SubsystemKind::Reporter => self.reporter.is_some(),
        }
    }

    /// The kinds that are present, in declaration order.
    pub fn available(&self) -> Vec<SubsystemKind> {
        [
            SubsystemKind::Git,
            SubsystemKind::FileTracker,
            SubsystemKind::Linter,
            SubsystemKind::Tester,
            SubsystemKind::Committer,
            SubsystemKind::Reporter,
        ]
        .into_iter()
        .filter(|kind| self.has(*kind))
        .collect()
    }

    /// Release collaborator resources. Called once from engine shutdown;
    /// each hook is awaited sequentially.
    pub async fn shutdown_all(&self) {
        if let Some(git) = &self.git {
            git.shutdown().await;
        }
        if let Some(tracker) = &self.file_tracker {
            tracker.shutdown().await;
        }
        if let Some(linter) = &self.linter {
            linter.shutdown().await;
        }
        if let Some(tester) = &self.tester {
            tester.shutdown().await;
        }
        if let Some(committer) = &self.committer {
            committer.shutdown().await;
        }
        if let Some(reporter) = &self.reporter {
            reporter.shutdown().await;
        }
    }
}

#[derive(Default)]
pub struct SubsystemsBuilder {
    inner: Subsystems,
}

impl SubsystemsBuilder {
    pub fn git(mut self, git: Arc<dyn GitState>) -> Self {
        self.inner.git = Some(git);
        self
    }

    pub fn file_tracker(mut self, tracker: Arc<dyn FileTracker>) -> Self {
        self.inner.file_tracker = Some(tracker);
        self
    }

    pub fn linter(mut self, linter: Arc<dyn LintRunner>) -> Self {
        self.inner.linter = Some(linter);
        self
    }

    pub fn tester(mut self, tester: Arc<dyn TestRunner>) -> Self {
        self.inner.tester = Some(tester);
        self
    }

    pub fn committer(mut self, committer: Arc<dyn CommitCreator>) -> Self {
        self.inner.committer = Some(committer);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn TestReporter>) -> Self {
        self.inner.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Subsystems {
        self.inner
    }
}

#[cfg(test)]
pub mod test_support;
