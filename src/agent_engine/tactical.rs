//! Reason-act-observe loop for a single intention.
//!
//! Each cycle asks the oracle for a thought and one tool call, passes UI
//! actions through the confidence gate, dispatches through the tool registry,
//! verifies declared outcomes and refreshes perception. The loop ends on a
//! reserved control tool, a verification failure or the step budget.
//! Finishing an intention that declares an expected outcome requires that
//! outcome to be visible first.

use serde_json::{Map, Value};

use crate::agent_engine::confidence::ConfidenceGate;
use crate::agent_engine::event_bus::StatusEvent;
use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::prompts;
use crate::agent_engine::runtime::{Runtime, TaskScope};
use crate::agent_engine::scratchpad::Scratchpad;
use crate::agent_engine::state::{FailureKind, Intention, IntentionOutcome, IntentionReport};
use crate::errors::{AgentError, AgentResult};
use crate::executor::dispatcher::observe_condition;
use crate::executor::tool::BuiltinTool;
use crate::llm::parse::extract_json;
use crate::llm::types::ModelTier;
use crate::perception::pipeline::{observe, Observation};
use crate::perception::world_model::render_for_prompt;

/// A tool call proposed by the THINK step.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub thought: String,
    pub tool: String,
    pub params: Map<String, Value>,
}

impl Proposal {
    /// Accepts `{"thought", "action": {"tool", "params"}}` and the flatter
    /// `{"tool", "args"}` shape produced from native tool calls.
    pub fn parse(reply: &str) -> Option<Self> {
        let v = extract_json(reply)?;
        let thought = v
            .get("thought")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let action = v.get("action").filter(|a| a.is_object()).unwrap_or(&v);
        let tool = action
            .get("tool")
            .or_else(|| action.get("name"))
            .and_then(Value::as_str)?
            .trim()
            .to_string();
        if tool.is_empty() {
            return None;
        }
        let params = ["params", "args", "arguments"]
            .iter()
            .find_map(|k| action.get(*k).and_then(Value::as_object))
            .cloned()
            .unwrap_or_default();
        Some(Self { thought, tool, params })
    }

    pub fn render(&self) -> String {
        render_action(&self.tool, &self.params)
    }
}

pub fn render_action(tool: &str, params: &Map<String, Value>) -> String {
    if params.is_empty() {
        return tool.to_string();
    }
    format!("{tool}({})", Value::Object(params.clone()))
}

pub struct TacticalExecutor<'a> {
    rt: &'a Runtime,
    scope: &'a TaskScope,
    gate: ConfidenceGate,
    max_steps: u32,
}

impl<'a> TacticalExecutor<'a> {
    pub fn new(rt: &'a Runtime, scope: &'a TaskScope) -> Self {
        Self {
            rt,
            scope,
            gate: ConfidenceGate::new(rt.config.agent.confidence_threshold),
            max_steps: rt.config.agent.max_steps_per_intention,
        }
    }

    /// Drive `intention` to a terminal outcome. Only cancellation and
    /// unrecoverable collaborator failures surface as `Err`.
    pub async fn execute(&self, intention: &Intention, history: &mut SessionHistory) -> AgentResult<IntentionReport> {
        let rt = self.rt;
        let scope = self.scope;
        let ctx = scope.tool_context(rt);
        let mut pad = Scratchpad::new();
        let mut budget = LoopController::new(self.max_steps);

        tracing::info!(intention = %intention.text, max_steps = self.max_steps, "intention started");
        let mut obs = self.observe().await?;

        let outcome = loop {
            scope.check_cancelled()?;
            if !budget.try_step() {
                tracing::warn!(intention = %intention.text, "step budget exhausted");
                break IntentionOutcome::Failed {
                    kind: FailureKind::StepBudgetExceeded { limit: budget.limit() },
                };
            }
            let step = budget.steps();

            // THINK
            let prompt = prompts::react(
                &scope.goal,
                &intention.text,
                intention.expected_outcome.as_deref(),
                &render_for_prompt(&obs.entities),
                &pad.render(),
                &rt.tools.describe_for_prompt(),
            );
            let reply = scope
                .oracle
                .call(&prompt, Some(&obs.snapshot.png), ModelTier::Balanced)
                .await?;
            scope.check_cancelled()?;

            let Some(proposal) = Proposal::parse(&reply) else {
                tracing::warn!(step, "reasoning reply unreadable");
                pad.push(reply.trim(), "none", "error: reply was not a JSON action; answer with the required JSON");
                continue;
            };
            tracing::info!(step, tool = %proposal.tool, thought = %proposal.thought, "proposed action");

            match BuiltinTool::from_name(&proposal.tool) {
                Some(BuiltinTool::FinishIntention) => {
                    let summary = str_param(&proposal.params, "summary").unwrap_or("intention achieved");
                    if let Some(expected) = intention.expected_outcome.as_deref() {
                        if !observe_condition(&ctx, expected, None).await?.is_satisfied() {
                            tracing::warn!(step, expected = %expected, "finished without the expected outcome");
                            pad.push(&proposal.thought, proposal.render(), format!("not observed: {expected}"));
                            break IntentionOutcome::Failed {
                                kind: FailureKind::VerificationFailed {
                                    expected: expected.to_string(),
                                },
                            };
                        }
                    }
                    pad.push(&proposal.thought, proposal.render(), "intention finished");
                    break IntentionOutcome::Completed {
                        summary: summary.to_string(),
                    };
                }
                Some(BuiltinTool::ReportFailure) => {
                    let reason = str_param(&proposal.params, "reason")
                        .unwrap_or(proposal.thought.as_str())
                        .to_string();
                    pad.push(&proposal.thought, proposal.render(), "failure reported");
                    break IntentionOutcome::Failed {
                        kind: FailureKind::ReportedByModel { reason },
                    };
                }
                Some(BuiltinTool::ReportCapabilityGap) => {
                    let missing = str_param(&proposal.params, "missing_capability")
                        .unwrap_or(proposal.thought.as_str())
                        .to_string();
                    pad.push(&proposal.thought, proposal.render(), "capability gap reported");
                    break IntentionOutcome::CapabilityGap { missing };
                }
                _ => {}
            }

            // Confidence gate, UI-mutating tools only.
            let (tool, params) = if rt.tools.is_ui_mutating(&proposal.tool) {
                let score = self
                    .gate
                    .score(
                        scope.oracle.as_ref(),
                        &intention.text,
                        &proposal.thought,
                        &proposal.render(),
                        &render_for_prompt(&obs.entities),
                        &obs.snapshot.png,
                    )
                    .await;
                let passed = self.gate.passes(score);
                rt.events.emit(StatusEvent::ConfidenceGate {
                    tool: proposal.tool.clone(),
                    score,
                    passed,
                });
                if passed {
                    (proposal.tool.clone(), proposal.params.clone())
                } else {
                    tracing::info!(step, score, threshold = self.gate.threshold(), "low confidence, asking user");
                    let mut ask = Map::new();
                    ask.insert("question".into(), Value::String(clarification(&proposal)));
                    (BuiltinTool::AskUser.name().to_string(), ask)
                }
            } else {
                (proposal.tool.clone(), proposal.params.clone())
            };
            scope.check_cancelled()?;

            // ACT
            let action = render_action(&tool, &params);
            let mut observation = match rt.tools.invoke(&tool, &params, &ctx).await {
                Ok(result) => {
                    let mut text = result.summary();
                    if result.success && rt.tools.is_ui_mutating(&tool) {
                        if let Some(expected) = str_param(&params, "expected_outcome") {
                            if !observe_condition(&ctx, expected, None).await?.is_satisfied() {
                                pad.push(&proposal.thought, &action, format!("{text}; not observed: {expected}"));
                                history.record(
                                    HistoryEntry::new("agent", "verification failed")
                                        .with_action(action_json(&tool, &params)),
                                );
                                break IntentionOutcome::Failed {
                                    kind: FailureKind::VerificationFailed {
                                        expected: expected.to_string(),
                                    },
                                };
                            }
                            text.push_str(&format!("; verified: {expected}"));
                        }
                    }
                    text
                }
                Err(AgentError::Aborted) => return Err(AgentError::Aborted),
                Err(e) => {
                    tracing::warn!(step, tool = %tool, error = %e, "tool invocation failed");
                    format!("error: {e}")
                }
            };

            // OBSERVE
            obs = self.observe().await?;
            if obs.stale {
                observation.push_str(" (screen description may be outdated)");
            }
            rt.events.emit(StatusEvent::Step {
                intention: intention.text.clone(),
                step,
                thought: proposal.thought.clone(),
                action: action.clone(),
                observation: observation.clone(),
            });
            history.record(HistoryEntry::new("agent", &proposal.thought).with_action(action_json(&tool, &params)));
            pad.push(&proposal.thought, action, observation);
        };

        tracing::info!(intention = %intention.text, steps = pad.len(), ?outcome, "intention ended");
        Ok(IntentionReport {
            intention: intention.text.clone(),
            outcome,
            trail: pad.into_trail(),
        })
    }

    async fn observe(&self) -> AgentResult<Observation> {
        let scope = self.scope;
        observe(
            self.rt.capture.as_ref(),
            &scope.region,
            &scope.world,
            &scope.ignore_list,
        )
        .await
    }
}

fn str_param<'p>(params: &'p Map<String, Value>, key: &str) -> Option<&'p str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn clarification(proposal: &Proposal) -> String {
    let thought = if proposal.thought.trim().is_empty() {
        "I am not sure how to proceed."
    } else {
        proposal.thought.trim()
    };
    format!("{thought}\nI was about to run {}. Is that right, or what should I do instead?", proposal.render())
}

fn action_json(tool: &str, params: &Map<String, Value>) -> Value {
    serde_json::json!({ "tool": tool, "params": params })
}
