use crate::agent_engine::state::{render_steps, ReActStep};

/// Reason-act-observe history of the intention being executed.
#[derive(Debug, Default)]
pub struct Scratchpad {
    steps: Vec<ReActStep>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, thought: impl Into<String>, action: impl Into<String>, observation: impl Into<String>) {
        self.steps.push(ReActStep {
            thought: thought.into(),
            action: action.into(),
            observation: observation.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&ReActStep> {
        self.steps.last()
    }

    pub fn render(&self) -> String {
        render_steps(&self.steps)
    }

    /// Hand the trail over to a report; the scratchpad is gone afterwards.
    pub fn into_trail(self) -> Vec<ReActStep> {
        self.steps
    }
}
