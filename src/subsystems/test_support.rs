//! Hand-rolled test doubles for the collaborator contracts.
//!
//! Shared by the unit tests across modules. Each stub records enough of what
//! happened (commands issued, requests seen, shutdown calls) for tests to
//! assert on engine behavior without real subsystems.

use super::*;
use anyhow::anyhow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct StubGit {
    files: Vec<String>,
    fail_status: bool,
    fail_commands: bool,
    commands: Mutex<Vec<Vec<String>>>,
    shutdown_called: AtomicBool,
}

impl StubGit {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn dirty(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_status: true,
            ..Self::default()
        }
    }

    pub fn with_failing_commands(mut self) -> Self {
        self.fail_commands = true;
        self
    }

    pub fn commands_run(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn shut_down(&self) -> bool {
        self.shutdown_called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitState for StubGit {
    async fn status(&self) -> Result<GitStatus> {
        if self.fail_status {
            return Err(anyhow!("git status unavailable"));
        }
        Ok(GitStatus {
            success: true,
            files: self.files.clone(),
            detailed_files: self
                .files
                .iter()
                .map(|f| GitFileStatus {
                    path: f.clone(),
                    index_status: " ".into(),
                    worktree_status: "M".into(),
                })
                .collect(),
            is_clean: self.files.is_empty(),
            error: None,
        })
    }

    async fn run_command(&self, argv: &[String]) -> Result<GitCommandOutput> {
        self.commands.lock().unwrap().push(argv.to_vec());
        if self.fail_commands {
            return Ok(GitCommandOutput {
                success: false,
                output: String::new(),
                error: Some("exit status 128".into()),
            });
        }
        Ok(GitCommandOutput {
            success: true,
            output: String::new(),
            error: None,
        })
    }

    async fn shutdown(&self) {
        self.shutdown_called.store(true, Ordering::SeqCst);
    }
}

pub struct StubTracker {
    files: Vec<PathBuf>,
    session: Mutex<Option<String>>,
    shutdown_called: AtomicBool,
}

impl Default for StubTracker {
    fn default() -> Self {
        Self {
            files: vec![PathBuf::from("src/lib.rs")],
            session: Mutex::new(None),
            shutdown_called: AtomicBool::new(false),
        }
    }
}

impl StubTracker {
    pub fn with_files(files: &[&str]) -> Self {
        Self {
            files: files.iter().map(PathBuf::from).collect(),
            ..Self::default()
        }
    }

    pub fn session(&self) -> Option<String> {
        self.session.lock().unwrap().clone()
    }

    pub fn shut_down(&self) -> bool {
        self.shutdown_called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileTracker for StubTracker {
    async fn start_tracking(&self, request: StartTracking) -> Result<TrackingStarted> {
        *self.session.lock().unwrap() = Some(request.session_name.clone());
        Ok(TrackingStarted {
            success: true,
            session_name: request.session_name,
            initial_files: self.files.len(),
            error: None,
        })
    }

    async fn stop_tracking(&self) -> Result<TrackingStopped> {
        *self.session.lock().unwrap() = None;
        Ok(TrackingStopped {
            success: true,
            tracked_files: self.files.clone(),
            file_count: self.files.len(),
            duration_ms: 5,
            error: None,
        })
    }

    async fn tracked_files(&self) -> Vec<PathBuf> {
        self.files.clone()
    }

    async fn shutdown(&self) {
        self.shutdown_called.store(true, Ordering::SeqCst);
    }
}

pub struct StubLinter {
    outcome: Result<LintOutcome, String>,
    delay: Option<Duration>,
}

impl StubLinter {
    pub fn passing() -> Self {
        Self {
            outcome: Ok(LintOutcome {
                success: true,
                attempts: 1,
                auto_fix_applied: false,
                execution_time_ms: 12,
                error: None,
            }),
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Ok(LintOutcome {
                success: false,
                attempts: 2,
                auto_fix_applied: true,
                execution_time_ms: 40,
                error: Some(message.to_string()),
            }),
            delay: None,
        }
    }

    /// Collaborator call itself errors, as opposed to a structured failure.
    pub fn erroring(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            delay: None,
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LintRunner for StubLinter {
    async fn execute(&self, _request: LintRequest) -> Result<LintOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(anyhow!("{message}")),
        }
    }
}

pub struct StubTester {
    outcome: Result<TestOutcome, String>,
}

impl StubTester {
    pub fn passing() -> Self {
        Self {
            outcome: Ok(TestOutcome {
                success: true,
                attempts: 1,
                execution_time_ms: 80,
                parsed_results: serde_json::json!({"passed": 10, "failed": 0}),
                error: None,
            }),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Ok(TestOutcome {
                success: false,
                attempts: 1,
                execution_time_ms: 95,
                parsed_results: serde_json::json!({"passed": 8, "failed": 2}),
                error: Some(message.to_string()),
            }),
        }
    }

    pub fn erroring(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl TestRunner for StubTester {
    async fn execute(&self, _request: TestRequest) -> Result<TestOutcome> {
        match &self.outcome {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(anyhow!("{message}")),
        }
    }
}

#[derive(Default)]
pub struct StubCommitter {
    fail: bool,
    last_request: Mutex<Option<CommitRequest>>,
}

impl StubCommitter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_request(&self) -> Option<CommitRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommitCreator for StubCommitter {
    async fn create_commit(&self, request: CommitRequest) -> Result<CommitOutcome> {
        let message = request
            .message
            .clone()
            .unwrap_or_else(|| "chore: automated commit".into());
        let dry_run = request.dry_run;
        *self.last_request.lock().unwrap() = Some(request);
        if self.fail {
            return Ok(CommitOutcome {
                success: false,
                commit_hash: None,
                message,
                attempts: 1,
                execution_time_ms: 20,
                dry_run,
                error: Some("nothing to commit".into()),
            });
        }
        Ok(CommitOutcome {
            success: true,
            commit_hash: if dry_run {
                None
            } else {
                Some("a1b2c3d4e5f6".into())
            },
            message,
            attempts: 1,
            execution_time_ms: 35,
            dry_run,
            error: None,
        })
    }
}

#[derive(Default)]
pub struct StubReporter;

#[async_trait]
impl TestReporter for StubReporter {
    async fn process_results(
        &self,
        outcome: &TestOutcome,
        _request: ReportRequest,
    ) -> Result<TestReport> {
        let summary = if outcome.success {
            "all tests passed"
        } else {
            "tests failed"
        };
        Ok(TestReport {
            success: true,
            report: serde_json::json!({
                "summary": summary,
                "details": outcome.parsed_results,
            }),
        })
    }
}
