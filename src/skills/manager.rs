//! Capability gap handling: draft a tool with the oracle, validate it, get
//! explicit human approval, then persist and register it.

use crate::agent_engine::event_bus::StatusEvent;
use crate::agent_engine::prompts;
use crate::agent_engine::runtime::{Runtime, TaskScope};
use crate::errors::{AgentError, AgentResult};
use crate::executor::dispatcher::ToolRegistry;
use crate::executor::tool::SynthesizedTool;
use crate::llm::parse::extract_json;
use crate::llm::types::ModelTier;
use crate::skills::types::{render_proposal, GapResolution};

pub struct CapabilityGapHandler<'a> {
    rt: &'a Runtime,
    scope: &'a TaskScope,
}

impl<'a> CapabilityGapHandler<'a> {
    pub fn new(rt: &'a Runtime, scope: &'a TaskScope) -> Self {
        Self { rt, scope }
    }

    pub async fn handle(&self, intention: &str, missing: &str) -> AgentResult<GapResolution> {
        tracing::info!(intention = %intention, missing = %missing, "capability gap reported");

        let tool = match self.draft(intention, missing).await? {
            Ok(tool) => tool,
            Err(reason) => {
                tracing::warn!(reason = %reason, "tool draft discarded");
                return Ok(GapResolution::DraftInvalid { reason });
            }
        };
        let name = tool.spec.name.clone();
        self.rt.events.emit(StatusEvent::ToolProposed { name: name.clone() });

        let proposal = render_proposal(&tool, missing);
        let approved = tokio::select! {
            _ = self.scope.cancel.cancelled() => return Err(AgentError::Aborted),
            answer = self.rt.human.confirm(&proposal) => answer?,
        };
        if !approved {
            tracing::info!(tool = %name, "tool proposal rejected");
            return Ok(GapResolution::Rejected { name });
        }

        self.rt.memory.save_synthesized_tool(tool.clone())?;
        self.rt.tools.register_synthesized(tool)?;
        self.rt.events.emit(StatusEvent::ToolRegistered { name: name.clone() });
        Ok(GapResolution::Registered { name })
    }

    /// Inner `Err` is a draft that cannot be offered, including a failed oracle
    /// call; outer `Err` is cancellation.
    async fn draft(&self, intention: &str, missing: &str) -> AgentResult<Result<SynthesizedTool, String>> {
        let prompt = prompts::synthesize(intention, missing, &ToolRegistry::primitives_for_prompt());
        let reply = match self.scope.oracle.call(&prompt, None, ModelTier::Deep).await {
            Ok(reply) => reply,
            Err(AgentError::Aborted) => return Err(AgentError::Aborted),
            Err(e) => return Ok(Err(format!("no draft could be produced: {e}"))),
        };
        let Some(value) = extract_json(&reply) else {
            return Ok(Err("reply was not JSON".into()));
        };
        let tool: SynthesizedTool = match serde_json::from_value(value) {
            Ok(tool) => tool,
            Err(e) => return Ok(Err(format!("malformed tool: {e}"))),
        };
        Ok(self
            .rt
            .tools
            .validate_synthesized(&tool)
            .map(|()| tool)
            .map_err(|e| e.to_string()))
    }
}
