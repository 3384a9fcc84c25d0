//! Foreground-facing entry points: build the runtime, start and stop goals.
//!
//! At most one goal runs at a time, on its own tokio task. The foreground only
//! observes it through status events and the returned handle.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::{EventBus, StatusEvent};
use crate::agent_engine::runtime::Runtime;
use crate::agent_engine::state::GoalReport;
use crate::agent_engine::strategic::StrategicPlanner;
use crate::config::AppConfig;
use crate::errors::{AgentError, AgentResult};
use crate::executor::dispatcher::ToolRegistry;
use crate::executor::input::InputDevice;
use crate::human::HumanChannel;
use crate::knowledge::PlanMemory;
use crate::llm::gateway::{OracleGateway, RetryPolicy};
use crate::llm::registry::ProviderRegistry;
use crate::perception::traits::ScreenCapture;
use crate::skills::loader;

/// Wire the configured oracle backend, plan memory and tool registry around
/// the given device collaborators.
pub fn build_runtime(
    config: AppConfig,
    capture: Arc<dyn ScreenCapture>,
    input: Arc<dyn InputDevice>,
    human: Arc<dyn HumanChannel>,
) -> AgentResult<Runtime> {
    let registry = Arc::new(tokio::sync::Mutex::new(ProviderRegistry::from_config(&config)));
    let oracle = Arc::new(OracleGateway::new(registry, RetryPolicy::from_config(&config.agent)));
    let memory = Arc::new(PlanMemory::open(config.memory.resolved_knowledge_path())?);
    let tools = Arc::new(ToolRegistry::with_builtins());
    loader::load_persisted(&memory, &tools);
    Ok(Runtime {
        oracle,
        capture,
        input,
        human,
        tools,
        memory,
        events: EventBus::new(),
        config,
    })
}

struct ActiveGoal {
    id: uuid::Uuid,
    cancel: CancellationToken,
}

type Slot = Arc<Mutex<Option<ActiveGoal>>>;

/// Clears the active slot when the goal task ends, however it ends.
struct SlotGuard {
    slot: Slot,
    id: uuid::Uuid,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map(|a| a.id) == Some(self.id) {
            *slot = None;
        }
    }
}

pub struct GoalHandle {
    pub id: uuid::Uuid,
    cancel: CancellationToken,
    join: JoinHandle<AgentResult<GoalReport>>,
}

impl GoalHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> AgentResult<GoalReport> {
        self.join
            .await
            .map_err(|e| AgentError::Task(e.to_string()))?
    }
}

pub struct AgentService {
    planner: Arc<StrategicPlanner>,
    active: Slot,
}

impl AgentService {
    pub fn new(rt: Runtime) -> Self {
        Self {
            planner: Arc::new(StrategicPlanner::new(rt)),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        self.planner.runtime()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.runtime().events.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    /// Spawn `goal` on a background task. Fails with `Busy` while another
    /// goal is active.
    pub fn start_goal(&self, goal: &str) -> AgentResult<GoalHandle> {
        let goal = goal.trim().to_string();
        if goal.is_empty() {
            return Err(AgentError::planning("empty goal"));
        }
        let id = uuid::Uuid::new_v4();
        let cancel = CancellationToken::new();
        {
            let mut slot = self.lock();
            if slot.is_some() {
                tracing::warn!(goal = %goal, "rejected, another goal is running");
                return Err(AgentError::Busy);
            }
            *slot = Some(ActiveGoal {
                id,
                cancel: cancel.clone(),
            });
        }

        let guard = SlotGuard {
            slot: self.active.clone(),
            id,
        };
        let planner = self.planner.clone();
        let token = cancel.clone();
        tracing::info!(goal = %goal, %id, "spawning goal task");
        let join = tokio::spawn(async move {
            let _guard = guard;
            planner.run_goal(&goal, token).await
        });
        Ok(GoalHandle { id, cancel, join })
    }

    /// Cancel the active goal, if any.
    pub fn stop(&self) -> bool {
        match self.lock().as_ref() {
            Some(active) => {
                tracing::info!(id = %active.id, "stopping active goal");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveGoal>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}
