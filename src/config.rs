//! Engine-level configuration and per-invocation run options.

use crate::stage::StageKind;
use crate::subsystems::SubsystemKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide policy, fixed for the lifetime of a `WorkflowEngine`.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Abort the run when a required stage fails. Per-run override via
    /// `RunOptions::fail_fast`.
    pub fail_fast: bool,
    /// Capture rollback points before rollback-eligible stages and replay
    /// the most recent one on failure. Per-run override via
    /// `RunOptions::rollback_on_failure`.
    pub rollback_enabled: bool,
    /// When false, `Recorder::record` becomes a no-op.
    pub audit_enabled: bool,
    /// Accepted but not enforced against an in-flight stage handler: a hung
    /// collaborator call hangs the run. Surfaced in statistics so callers
    /// can see what was configured.
    pub stage_timeout: Option<Duration>,
    /// Subsystems that must be present for `initialize` to succeed.
    pub required_subsystems: Vec<SubsystemKind>,
    /// Passed to the lint collaborator on every run.
    pub lint_auto_fix: bool,
    pub lint_skip_warnings: bool,
    /// Passed to the test collaborator on every run.
    pub test_coverage: bool,
    pub test_verbose: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            rollback_enabled: true,
            audit_enabled: true,
            stage_timeout: None,
            required_subsystems: Vec::new(),
            lint_auto_fix: true,
            lint_skip_warnings: false,
            test_coverage: false,
            test_verbose: false,
        }
    }
}

/// Per-invocation parameters for `execute_workflow`. Immutable for the
/// duration of the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    pub commit_message: Option<String>,
    pub commit_template: Option<String>,
    pub commit_template_data: Option<serde_json::Value>,
    pub skip_linting: bool,
    pub skip_testing: bool,
    pub skip_commit: bool,
    pub dry_run: bool,
    /// Overrides `WorkflowConfig::rollback_enabled` for this run.
    pub rollback_on_failure: Option<bool>,
    /// Overrides `WorkflowConfig::fail_fast` for this run.
    pub fail_fast: Option<bool>,
}

impl RunOptions {
    /// Whether the caller asked to skip this stage. Required stages can
    /// never be skipped this way; they have no skip flag.
    pub fn skips(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::ExecuteLinting => self.skip_linting,
            StageKind::ExecuteTesting => self.skip_testing,
            StageKind::CreateCommit => self.skip_commit,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_fail_fast_with_rollback() {
        let config = WorkflowConfig::default();
        assert!(config.fail_fast);
        assert!(config.rollback_enabled);
        assert!(config.audit_enabled);
        assert!(config.stage_timeout.is_none());
    }

    #[test]
    fn skip_flags_map_to_their_stages() {
        let options = RunOptions {
            skip_testing: true,
            ..Default::default()
        };
        assert!(options.skips(StageKind::ExecuteTesting));
        assert!(!options.skips(StageKind::ExecuteLinting));
        assert!(!options.skips(StageKind::Initialize));
        assert!(!options.skips(StageKind::Finalize));
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: RunOptions = serde_json::from_str(
            r#"{"commitMessage":"fix: things","skipLinting":true,"dryRun":true}"#,
        )
        .unwrap();
        assert_eq!(options.commit_message.as_deref(), Some("fix: things"));
        assert!(options.skip_linting);
        assert!(options.dry_run);
        assert!(options.rollback_on_failure.is_none());
    }
}
