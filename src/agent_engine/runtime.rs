use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::EventBus;
use crate::config::AppConfig;
use crate::executor::dispatcher::{ToolContext, ToolRegistry};
use crate::executor::input::InputDevice;
use crate::human::HumanChannel;
use crate::knowledge::PlanMemory;
use crate::llm::gateway::{CancellableOracle, Oracle};
use crate::perception::focus_crop::FocusRegion;
use crate::perception::traits::ScreenCapture;
use crate::perception::wait::WaitConfig;
use crate::perception::world_model::WorldModel;

/// Long-lived collaborators shared by every task.
#[derive(Clone)]
pub struct Runtime {
    pub oracle: Arc<dyn Oracle>,
    pub capture: Arc<dyn ScreenCapture>,
    pub input: Arc<dyn InputDevice>,
    pub human: Arc<dyn HumanChannel>,
    pub tools: Arc<ToolRegistry>,
    pub memory: Arc<PlanMemory>,
    pub events: EventBus,
    pub config: AppConfig,
}

/// State that lives exactly as long as one goal.
pub struct TaskScope {
    pub goal: String,
    /// The shared oracle, bound to this goal's cancellation.
    pub oracle: Arc<dyn Oracle>,
    pub region: FocusRegion,
    pub ignore_list: Vec<String>,
    pub world: WorldModel,
    pub wait: WaitConfig,
    pub cancel: CancellationToken,
}

impl TaskScope {
    pub fn new(rt: &Runtime, goal: impl Into<String>, cancel: CancellationToken) -> Self {
        let oracle: Arc<dyn Oracle> = Arc::new(CancellableOracle::new(rt.oracle.clone(), cancel.clone()));
        Self {
            goal: goal.into(),
            oracle: oracle.clone(),
            region: FocusRegion::full_screen(),
            ignore_list: rt.memory.get_ignore_list(),
            world: WorldModel::new(oracle),
            wait: WaitConfig::from_config(&rt.config.agent),
            cancel,
        }
    }

    pub fn tool_context<'a>(&'a self, rt: &'a Runtime) -> ToolContext<'a> {
        ToolContext {
            input: rt.input.as_ref(),
            human: rt.human.as_ref(),
            oracle: self.oracle.as_ref(),
            capture: rt.capture.as_ref(),
            world: &self.world,
            region: &self.region,
            ignore_list: &self.ignore_list,
            wait: &self.wait,
            cancel: &self.cancel,
        }
    }

    pub fn check_cancelled(&self) -> crate::errors::AgentResult<()> {
        if self.cancel.is_cancelled() {
            return Err(crate::errors::AgentError::Aborted);
        }
        Ok(())
    }
}
