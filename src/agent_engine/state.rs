use serde::{Deserialize, Serialize};

use crate::errors::FailureDiagnostics;
use crate::knowledge::StepSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    Pending,
    Active,
    Done,
    Failed,
}

/// One tactical sub-goal of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intention {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
    pub status: IntentionStatus,
}

impl Intention {
    pub fn new(text: impl Into<String>, expected_outcome: Option<String>) -> Self {
        Self {
            text: text.into(),
            expected_outcome,
            status: IntentionStatus::Pending,
        }
    }

    pub fn to_step(&self) -> StepSpec {
        StepSpec {
            tactical_goal: self.text.clone(),
            expected_outcome: self.expected_outcome.clone(),
        }
    }
}

impl From<&StepSpec> for Intention {
    fn from(step: &StepSpec) -> Self {
        Intention::new(step.tactical_goal.clone(), step.expected_outcome.clone())
    }
}

/// One reason-act-observe cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    pub thought: String,
    pub action: String,
    pub observation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    StepBudgetExceeded { limit: u32 },
    VerificationFailed { expected: String },
    ReportedByModel { reason: String },
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::StepBudgetExceeded { limit } => write!(f, "step budget of {limit} exceeded"),
            FailureKind::VerificationFailed { expected } => {
                write!(f, "expected outcome never observed: {expected}")
            }
            FailureKind::ReportedByModel { reason } => write!(f, "reported as impossible: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentionOutcome {
    Completed { summary: String },
    Failed { kind: FailureKind },
    CapabilityGap { missing: String },
}

impl std::fmt::Display for IntentionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentionOutcome::Completed { summary } => write!(f, "completed: {summary}"),
            IntentionOutcome::Failed { kind } => write!(f, "failed: {kind}"),
            IntentionOutcome::CapabilityGap { missing } => write!(f, "missing capability: {missing}"),
        }
    }
}

/// What the tactical executor hands back for one intention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentionReport {
    pub intention: String,
    pub outcome: IntentionOutcome,
    pub trail: Vec<ReActStep>,
}

impl IntentionReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, IntentionOutcome::Completed { .. })
    }

    pub fn diagnostics(&self) -> FailureDiagnostics {
        let last = self.trail.last();
        FailureDiagnostics {
            intention: self.intention.clone(),
            thought: last.map(|s| s.thought.clone()),
            action: last.map(|s| s.action.clone()),
        }
    }

    pub fn render_trail(&self) -> String {
        render_steps(&self.trail)
    }
}

pub fn render_steps(steps: &[ReActStep]) -> String {
    if steps.is_empty() {
        return "(no steps taken)".into();
    }
    steps
        .iter()
        .map(|s| format!("Thought: {}\nAction: {}\nObservation: {}", s.thought, s.action, s.observation))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Final result of a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalReport {
    pub goal: String,
    pub objective: String,
    pub strategy: Option<String>,
    pub intentions: Vec<Intention>,
    pub replanned: bool,
    pub focused: bool,
    /// User-facing notes, e.g. rejected tool proposals.
    pub limitations: Vec<String>,
}
