use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LaunchCommand;

/// What a sequence does after a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run every step regardless of earlier failures.
    #[default]
    Continue,
    /// Stop at the first failing step; the rest are skipped.
    Halt,
}

impl FailurePolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Halt => "halt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Source a runtime profile and capture the resulting environment for later steps.
    Activate { profile: String, snippet: String },
    Run(LaunchCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
}

impl Step {
    #[must_use]
    pub fn activate(profile: impl Into<String>, snippet: impl Into<String>) -> Self {
        let profile = profile.into();
        Self {
            name: "activate".to_string(),
            action: StepAction::Activate {
                profile,
                snippet: snippet.into(),
            },
        }
    }

    #[must_use]
    pub fn run(name: impl Into<String>, command: LaunchCommand) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Run(command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed { code: i32 },
    /// Not started because an earlier step failed under [`FailurePolicy::Halt`].
    Skipped,
    /// Not started because the run was interrupted.
    Interrupted,
}

impl StepOutcome {
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Succeeded
        } else {
            Self::Failed { code }
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => f.write_str("ok"),
            Self::Failed { code } => write!(f, "failed (exit code {code})"),
            Self::Skipped => f.write_str("skipped"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Shell convention for a run stopped by SIGINT (`128 + 2`).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

/// Outcome of every planned step, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    pub steps: Vec<StepReport>,
}

impl SequenceReport {
    pub fn push(&mut self, name: impl Into<String>, outcome: StepOutcome) {
        self.steps.push(StepReport {
            name: name.into(),
            outcome,
        });
    }

    /// Exit code of the first failed step. Without a failure, an interrupted run
    /// reports [`INTERRUPTED_EXIT_CODE`] and a complete run reports 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let failed = self.steps.iter().find_map(|step| match step.outcome {
            StepOutcome::Failed { code } => Some(code),
            _ => None,
        });
        if let Some(code) = failed {
            return code;
        }
        if self.was_interrupted() {
            return INTERRUPTED_EXIT_CODE;
        }
        0
    }

    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.outcome == StepOutcome::Interrupted)
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.outcome == StepOutcome::Succeeded)
    }

    #[must_use]
    pub fn outcome_of(&self, name: &str) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|step| step.name == name)
            .map(|step| step.outcome)
    }
}
