//! Stage definitions and the ordered registry.
//!
//! `StageKind` is a closed enum: the full set of stages the engine knows
//! about, in execution order. The registry resolves that set against the
//! fixed subsystem capability set once, at engine construction — a stage
//! whose collaborator is absent never appears in the registry at all.
//! Per-run configuration skips are the driver's job, not the registry's.

use crate::subsystems::{SubsystemKind, Subsystems};
use serde::{Deserialize, Serialize};

/// Every stage the engine can run, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    Initialize,
    StartFileTracking,
    ExecuteLinting,
    ExecuteTesting,
    StopFileTracking,
    CreateCommit,
    Finalize,
}

impl StageKind {
    /// Execution order. `Initialize` is always first, `Finalize` always last.
    pub const ALL: [StageKind; 7] = [
        StageKind::Initialize,
        StageKind::StartFileTracking,
        StageKind::ExecuteLinting,
        StageKind::ExecuteTesting,
        StageKind::StopFileTracking,
        StageKind::CreateCommit,
        StageKind::Finalize,
    ];

    /// Stable key used in reports, audit entries and metrics.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Initialize => "initialize",
            StageKind::StartFileTracking => "startFileTracking",
            StageKind::ExecuteLinting => "executeLinting",
            StageKind::ExecuteTesting => "executeTesting",
            StageKind::StopFileTracking => "stopFileTracking",
            StageKind::CreateCommit => "createCommit",
            StageKind::Finalize => "finalize",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            StageKind::Initialize => "Initialize",
            StageKind::StartFileTracking => "Start file tracking",
            StageKind::ExecuteLinting => "Lint",
            StageKind::ExecuteTesting => "Test",
            StageKind::StopFileTracking => "Stop file tracking",
            StageKind::CreateCommit => "Create commit",
            StageKind::Finalize => "Finalize",
        }
    }

    /// Required stages run on every workflow regardless of options, and
    /// their failure under fail-fast aborts the run.
    pub fn required(self) -> bool {
        matches!(self, StageKind::Initialize | StageKind::Finalize)
    }

    /// Stages that can leave external state partially modified get a
    /// rollback point captured before they run.
    pub fn rollback_eligible(self) -> bool {
        matches!(
            self,
            StageKind::ExecuteLinting | StageKind::ExecuteTesting | StageKind::CreateCommit
        )
    }

    /// The collaborator this stage needs, if any. A stage with a subsystem
    /// requirement is only registered when that subsystem is present.
    pub fn subsystem(self) -> Option<SubsystemKind> {
        match self {
            StageKind::Initialize | StageKind::Finalize => None,
            StageKind::StartFileTracking | StageKind::StopFileTracking => {
                Some(SubsystemKind::FileTracker)
            }
            StageKind::ExecuteLinting => Some(SubsystemKind::Linter),
            StageKind::ExecuteTesting => Some(SubsystemKind::Tester),
            StageKind::CreateCommit => Some(SubsystemKind::Committer),
        }
    }
}

/// Immutable description of a registered stage.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageDescriptor {
    pub kind: StageKind,
    pub display_name: &'static str,
    pub required: bool,
    pub rollback_eligible: bool,
}

impl StageDescriptor {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            display_name: kind.display_name(),
            required: kind.required(),
            rollback_eligible: kind.rollback_eligible(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// Ordered, fixed sequence of stage descriptors, resolved once against the
/// subsystem capability set.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageDescriptor>,
}

impl StageRegistry {
    pub fn resolve(subsystems: &Subsystems) -> Self {
        let stages = StageKind::ALL
            .into_iter()
            .filter(|kind| match kind.subsystem() {
                Some(required) => subsystems.has(required),
                None => true,
            })
            .map(StageDescriptor::new)
            .collect();
        Self { stages }
    }

    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn contains(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
