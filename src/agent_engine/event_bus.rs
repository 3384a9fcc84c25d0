use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::IntentionStatus;

/// Status updates for the foreground. Never carries image payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    GoalStarted { goal: String },
    FocusResolved { focused: bool, dx: i32, dy: i32 },
    PlanReady { objective: String, strategy: Option<String>, intentions: Vec<String> },
    IntentionChanged { index: usize, text: String, status: IntentionStatus },
    Step { intention: String, step: u32, thought: String, action: String, observation: String },
    ConfidenceGate { tool: String, score: f64, passed: bool },
    PlanReviewed { score: f64, approved: bool },
    Replanning { failed_intention: String },
    ToolProposed { name: String },
    ToolRegistered { name: String },
    GoalFinished { success: bool, message: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; having no subscribers is fine.
    pub fn emit(&self, event: StatusEvent) {
        tracing::trace!(?event, "status event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(StatusEvent::GoalStarted { goal: "open mail".into() });
        match rx.recv().await.unwrap() {
            StatusEvent::GoalStarted { goal } => assert_eq!(goal, "open mail"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        EventBus::new().emit(StatusEvent::Replanning {
            failed_intention: "x".into(),
        });
    }
}
