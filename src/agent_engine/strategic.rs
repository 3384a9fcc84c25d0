//! Goal-level planning: focus, plan resolution against plan memory,
//! intention-by-intention execution with one self-correction, and folding
//! the outcome back into plan memory.

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent_engine::event_bus::StatusEvent;
use crate::agent_engine::foresight::PlanReviewer;
use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::prompts;
use crate::agent_engine::runtime::{Runtime, TaskScope};
use crate::agent_engine::state::{
    GoalReport, Intention, IntentionOutcome, IntentionReport, IntentionStatus,
};
use crate::agent_engine::tactical::TacticalExecutor;
use crate::errors::{AgentError, AgentResult, FailureDiagnostics};
use crate::knowledge::{Objective, StepSpec, Strategy};
use crate::llm::parse::{extract_json, parse_choice};
use crate::llm::types::ModelTier;
use crate::perception::focus_crop::{FocusProposal, FocusRegion};
use crate::perception::pipeline::{observe, Observation};
use crate::skills::{CapabilityGapHandler, GapResolution};

const OBJECTIVE_NAME_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
enum PlanSource {
    Reused { strategy: String },
    Fresh,
}

#[derive(Debug, Clone)]
struct Plan {
    objective: String,
    goal_prompt: String,
    source: PlanSource,
    intentions: Vec<Intention>,
}

/// Name given to an objective created for a novel goal.
pub fn objective_name_for(goal: &str) -> String {
    let head: String = goal.trim().chars().take(OBJECTIVE_NAME_CHARS).collect();
    format!("Objective: {head}")
}

/// Read `{"intentions": [...]}`, a bare array, or items given as plain strings.
pub fn parse_intentions(reply: &str) -> Vec<Intention> {
    let Some(v) = extract_json(reply) else {
        return Vec::new();
    };
    let items: &[Value] = match &v {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("intentions")
            .or_else(|| map.get("steps"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items
        .iter()
        .filter_map(|item| {
            let (text, expected) = match item {
                Value::String(s) => (s.as_str(), None),
                Value::Object(o) => (
                    ["tactical_goal", "intention", "text"]
                        .iter()
                        .find_map(|k| o.get(*k).and_then(Value::as_str))?,
                    o.get("expected_outcome")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                _ => return None,
            };
            let text = text.trim();
            (!text.is_empty()).then(|| Intention::new(text, expected))
        })
        .collect()
}

pub struct StrategicPlanner {
    rt: Runtime,
}

impl StrategicPlanner {
    pub fn new(rt: Runtime) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Run one goal to completion. On `Aborted` plan memory is left untouched.
    pub async fn run_goal(&self, goal: &str, cancel: CancellationToken) -> AgentResult<GoalReport> {
        let mut history = SessionHistory::open(self.rt.config.memory.resolved_sessions_dir());
        history.record(HistoryEntry::new("user", goal));
        self.rt.events.emit(StatusEvent::GoalStarted { goal: goal.to_string() });
        tracing::info!(goal = %goal, session = %history.session_id, "goal started");

        let result = self.run(goal, cancel, &mut history).await;
        let (success, message) = match &result {
            Ok(report) => (true, format!("done ({} intentions)", report.intentions.len())),
            Err(AgentError::PlanningFailure {
                reason,
                diagnostics: Some(d),
            }) => (false, format!("{reason}; {d}")),
            Err(e) => (false, e.to_string()),
        };
        match &result {
            Ok(report) => history.record(
                HistoryEntry::new("system", &message)
                    .with_action(serde_json::to_value(report).unwrap_or(Value::Null)),
            ),
            Err(_) => history.record(HistoryEntry::new("system", &message)),
        }
        tracing::info!(goal = %goal, success, message = %message, "goal finished");
        self.rt.events.emit(StatusEvent::GoalFinished { success, message });
        result
    }

    async fn run(&self, goal: &str, cancel: CancellationToken, history: &mut SessionHistory) -> AgentResult<GoalReport> {
        let rt = &self.rt;
        let resolved = rt.memory.resolve_aliases(goal);
        let mut scope = TaskScope::new(rt, resolved, cancel);

        scope.region = self.focus(&scope).await?;
        scope.check_cancelled()?;
        rt.events.emit(StatusEvent::FocusResolved {
            focused: scope.region.is_focused(),
            dx: scope.region.offset.dx,
            dy: scope.region.offset.dy,
        });

        let obs = self.observe(&scope).await?;
        let plan = self.resolve_plan(&scope, &obs).await?;
        scope.check_cancelled()?;
        rt.events.emit(StatusEvent::PlanReady {
            objective: plan.objective.clone(),
            strategy: reused_name(&plan).map(String::from),
            intentions: plan.intentions.iter().map(|i| i.text.clone()).collect(),
        });
        history.record(
            HistoryEntry::new("planner", &plan.objective).with_action(serde_json::json!({
                "strategy": reused_name(&plan),
                "intentions": plan.intentions.iter().map(|i| &i.text).collect::<Vec<_>>(),
            })),
        );

        let mut intentions = plan.intentions.clone();
        let mut limitations = Vec::new();
        let replanned = match self
            .iterate(&scope, &mut intentions, &mut limitations, history)
            .await
        {
            Ok(replanned) => replanned,
            Err(e) => {
                if let (AgentError::PlanningFailure { .. }, Some(strategy)) = (&e, reused_name(&plan)) {
                    self.record_outcome(&plan.objective, strategy, false);
                }
                return Err(e);
            }
        };

        let strategy = self.persist_success(&plan, &intentions, replanned, &mut limitations);
        Ok(GoalReport {
            goal: goal.to_string(),
            objective: plan.objective,
            strategy,
            intentions,
            replanned,
            focused: scope.region.is_focused(),
            limitations,
        })
    }

    /// Execute intentions in order. Returns whether a re-plan happened.
    async fn iterate(
        &self,
        scope: &TaskScope,
        intentions: &mut Vec<Intention>,
        limitations: &mut Vec<String>,
        history: &mut SessionHistory,
    ) -> AgentResult<bool> {
        let exec = TacticalExecutor::new(&self.rt, scope);
        let mut replanned = false;
        let mut idx = 0;

        while idx < intentions.len() {
            scope.check_cancelled()?;
            self.set_status(intentions, idx, IntentionStatus::Active);

            let report = self
                .run_intention(&exec, scope, &intentions[idx], limitations, history)
                .await?;
            if report.is_success() {
                self.set_status(intentions, idx, IntentionStatus::Done);
                idx += 1;
                continue;
            }
            self.set_status(intentions, idx, IntentionStatus::Failed);
            tracing::warn!(intention = %report.intention, outcome = %report.outcome, "intention failed");

            if replanned {
                return Err(AgentError::PlanningFailure {
                    reason: format!("'{}' {} after re-planning", report.intention, report.outcome),
                    diagnostics: Some(report.diagnostics()),
                });
            }
            replanned = true;
            self.rt.events.emit(StatusEvent::Replanning {
                failed_intention: report.intention.clone(),
            });

            let fresh = self.correct(scope, &intentions[..idx], &report).await?;
            history.record(HistoryEntry::new("planner", "re-planned").with_action(serde_json::json!({
                "failed": report.intention,
                "intentions": fresh.iter().map(|i| &i.text).collect::<Vec<_>>(),
            })));
            intentions.truncate(idx + 1);
            intentions.extend(fresh);
            idx += 1;
        }
        Ok(replanned)
    }

    /// One intention, with a single retry after a newly approved tool.
    async fn run_intention(
        &self,
        exec: &TacticalExecutor<'_>,
        scope: &TaskScope,
        intention: &Intention,
        limitations: &mut Vec<String>,
        history: &mut SessionHistory,
    ) -> AgentResult<IntentionReport> {
        let report = exec.execute(intention, history).await?;
        let IntentionOutcome::CapabilityGap { missing } = &report.outcome else {
            return Ok(report);
        };

        let resolution = CapabilityGapHandler::new(&self.rt, scope)
            .handle(&intention.text, missing)
            .await?;
        history.record(
            HistoryEntry::new("planner", "capability gap")
                .with_action(serde_json::to_value(&resolution).unwrap_or(Value::Null)),
        );
        match resolution {
            GapResolution::Registered { name } => {
                tracing::info!(tool = %name, intention = %intention.text, "retrying with new tool");
                exec.execute(intention, history).await
            }
            other => {
                limitations.extend(other.limitation(missing));
                Ok(report)
            }
        }
    }

    async fn focus(&self, scope: &TaskScope) -> AgentResult<FocusRegion> {
        let cfg = &self.rt.config.focus;
        if !cfg.enabled {
            return Ok(FocusRegion::full_screen());
        }
        let screen = self.rt.capture.capture_full_screen().await?;
        let reply = match scope
            .oracle
            .call(&prompts::focus(&scope.goal), Some(&screen.png), ModelTier::Fast)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(error = %e, "focus call failed, using full screen");
                return Ok(FocusRegion::full_screen());
            }
        };
        let region = FocusProposal::parse(&reply)
            .ok_or_else(|| "unreadable focus reply".to_string())
            .and_then(|p| FocusRegion::from_proposal(&p, screen.width, screen.height, cfg));
        Ok(match region {
            Ok(region) => {
                tracing::info!(dx = region.offset.dx, dy = region.offset.dy, "focused on application window");
                region
            }
            Err(reason) => {
                tracing::debug!(reason = %reason, "focus rejected, using full screen");
                FocusRegion::full_screen()
            }
        })
    }

    async fn observe(&self, scope: &TaskScope) -> AgentResult<Observation> {
        observe(
            self.rt.capture.as_ref(),
            &scope.region,
            &scope.world,
            &scope.ignore_list,
        )
        .await
    }

    async fn resolve_plan(&self, scope: &TaskScope, obs: &Observation) -> AgentResult<Plan> {
        let matched = self.match_objective(scope).await;
        match matched {
            Some(objective) if !objective.strategies.is_empty() => {
                let strategy = self.select_strategy(scope, &objective, obs).await;
                tracing::info!(
                    objective = %objective.objective_name,
                    strategy = %strategy.strategy_name,
                    rate = strategy.success_rate,
                    "reusing stored strategy"
                );
                Ok(Plan {
                    objective: objective.objective_name.clone(),
                    goal_prompt: objective.goal_prompt.clone(),
                    source: PlanSource::Reused {
                        strategy: strategy.strategy_name.clone(),
                    },
                    intentions: strategy.steps.iter().map(Intention::from).collect(),
                })
            }
            matched => {
                let intentions = self.decompose(scope, obs).await?;
                self.review_plan(scope, &intentions, obs).await?;
                let name = matched
                    .map(|o| o.objective_name)
                    .unwrap_or_else(|| objective_name_for(&scope.goal));
                tracing::info!(objective = %name, intentions = intentions.len(), "new plan decomposed");
                Ok(Plan {
                    objective: name,
                    goal_prompt: scope.goal.clone(),
                    source: PlanSource::Fresh,
                    intentions,
                })
            }
        }
    }

    /// Exact match first, then one fast oracle call over the known objectives.
    async fn match_objective(&self, scope: &TaskScope) -> Option<Objective> {
        let goal = scope.goal.as_str();
        let memory = &self.rt.memory;
        if let Some(exact) = memory.match_exact(goal) {
            return Some(exact);
        }
        let objectives = memory.objectives();
        if objectives.is_empty() {
            return None;
        }
        let listing = objectives
            .iter()
            .map(|o| format!("- {}: {}", o.objective_name, o.goal_prompt))
            .collect::<Vec<_>>()
            .join("\n");
        let reply = match scope
            .oracle
            .call(&prompts::match_objective(goal, &listing), None, ModelTier::Fast)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "objective matching failed, treating goal as new");
                return None;
            }
        };
        let name = parse_choice(&reply)?;
        objectives
            .into_iter()
            .find(|o| o.objective_name.eq_ignore_ascii_case(&name))
    }

    /// Oracle choice among stored strategies, falling back to the best rate.
    async fn select_strategy<'o>(
        &self,
        scope: &TaskScope,
        objective: &'o Objective,
        obs: &Observation,
    ) -> &'o Strategy {
        let fallback = || objective.best_strategy().unwrap_or(&objective.strategies[0]);
        if objective.strategies.len() == 1 {
            return &objective.strategies[0];
        }
        let listing = objective
            .strategies
            .iter()
            .map(|s| {
                let steps = s
                    .steps
                    .iter()
                    .map(|st| st.tactical_goal.as_str())
                    .collect::<Vec<_>>()
                    .join(" > ");
                format!("- {} (success rate {:.2}): {steps}", s.strategy_name, s.success_rate)
            })
            .collect::<Vec<_>>()
            .join("\n");
        match scope
            .oracle
            .call(
                &prompts::select_strategy(&scope.goal, &listing),
                Some(&obs.snapshot.png),
                ModelTier::Balanced,
            )
            .await
        {
            Ok(reply) => parse_choice(&reply)
                .and_then(|name| {
                    objective
                        .strategies
                        .iter()
                        .find(|s| s.strategy_name.eq_ignore_ascii_case(&name))
                })
                .unwrap_or_else(fallback),
            Err(e) => {
                tracing::warn!(error = %e, "strategy selection failed, using best success rate");
                fallback()
            }
        }
    }

    async fn decompose(&self, scope: &TaskScope, obs: &Observation) -> AgentResult<Vec<Intention>> {
        let reply = scope
            .oracle
            .call(&prompts::decompose(&scope.goal), Some(&obs.snapshot.png), ModelTier::Deep)
            .await
            .map_err(|e| planning_error("decomposition", e, None))?;
        let intentions = parse_intentions(&reply);
        if intentions.is_empty() {
            return Err(AgentError::planning("the goal could not be decomposed into intentions"));
        }
        Ok(intentions)
    }

    /// Optional risk review of a fresh plan. A plan the user turns down ends
    /// the goal before any input is sent.
    async fn review_plan(&self, scope: &TaskScope, intentions: &[Intention], obs: &Observation) -> AgentResult<()> {
        let cfg = &self.rt.config.agent;
        if !cfg.plan_review {
            return Ok(());
        }
        let reviewer = PlanReviewer::new(cfg.plan_review_threshold);
        let review = reviewer
            .review(scope.oracle.as_ref(), &scope.goal, intentions, &obs.snapshot.png)
            .await?;
        let approved = tokio::select! {
            _ = scope.cancel.cancelled() => return Err(AgentError::Aborted),
            answer = reviewer.approve(&review, self.rt.human.as_ref(), &scope.goal, intentions) => answer?,
        };
        tracing::info!(score = review.score, approved, "plan reviewed");
        self.rt.events.emit(StatusEvent::PlanReviewed {
            score: review.score,
            approved,
        });
        if !approved {
            return Err(AgentError::planning(format!(
                "the plan was turned down after a risk review (confidence {:.2})",
                review.score
            )));
        }
        Ok(())
    }

    /// The one allowed regeneration of the remaining plan.
    async fn correct(
        &self,
        scope: &TaskScope,
        completed: &[Intention],
        failed: &IntentionReport,
    ) -> AgentResult<Vec<Intention>> {
        let obs = self.observe(scope).await?;
        let done = completed
            .iter()
            .filter(|i| i.status == IntentionStatus::Done)
            .map(|i| format!("- {}", i.text))
            .collect::<Vec<_>>();
        let done = if done.is_empty() { "(none)".to_string() } else { done.join("\n") };
        let prompt = prompts::correct(
            &scope.goal,
            &done,
            &format!("{} ({})", failed.intention, failed.outcome),
            &failed.render_trail(),
        );
        let reply = scope
            .oracle
            .call(&prompt, Some(&obs.snapshot.png), ModelTier::Deep)
            .await
            .map_err(|e| planning_error("self-correction", e, Some(failed.diagnostics())))?;
        let fresh = parse_intentions(&reply);
        if fresh.is_empty() {
            return Err(AgentError::PlanningFailure {
                reason: "self-correction produced no usable plan".into(),
                diagnostics: Some(failed.diagnostics()),
            });
        }
        tracing::info!(intentions = fresh.len(), "plan regenerated");
        Ok(fresh)
    }

    /// Fold a successful run into plan memory. Returns the strategy the run
    /// is now filed under. Store errors become report limitations.
    fn persist_success(
        &self,
        plan: &Plan,
        intentions: &[Intention],
        replanned: bool,
        limitations: &mut Vec<String>,
    ) -> Option<String> {
        if let PlanSource::Reused { strategy } = &plan.source {
            self.record_outcome(&plan.objective, strategy, !replanned);
            if !replanned {
                return Some(strategy.clone());
            }
        }

        let steps: Vec<StepSpec> = intentions
            .iter()
            .filter(|i| i.status == IntentionStatus::Done)
            .map(Intention::to_step)
            .collect();
        if steps.is_empty() {
            return None;
        }
        let memory = &self.rt.memory;
        let ordinal = match memory.ensure_objective(&plan.objective, &plan.goal_prompt) {
            Ok(objective) => objective.strategies.len() + 1,
            Err(e) => {
                tracing::warn!(objective = %plan.objective, error = %e, "objective not saved");
                limitations.push(format!("The successful plan could not be saved: {e}"));
                return None;
            }
        };
        let strategy = Strategy {
            strategy_name: format!("Strategy {ordinal}"),
            steps,
            success_rate: self.rt.config.memory.new_strategy_success_rate.clamp(0.0, 1.0),
            last_used: Some(Utc::now()),
        };
        match memory.save_strategy(&plan.objective, strategy) {
            Ok(name) => Some(name),
            Err(e) => {
                tracing::warn!(objective = %plan.objective, error = %e, "strategy not saved");
                limitations.push(format!("The successful plan could not be saved: {e}"));
                None
            }
        }
    }

    fn record_outcome(&self, objective: &str, strategy: &str, success: bool) {
        let weight = self.rt.config.memory.success_rate_weight;
        if let Err(e) = self.rt.memory.record_outcome(objective, strategy, success, weight) {
            tracing::warn!(objective = %objective, strategy = %strategy, error = %e, "outcome not recorded");
        }
    }

    fn set_status(&self, intentions: &mut [Intention], idx: usize, status: IntentionStatus) {
        intentions[idx].status = status;
        self.rt.events.emit(StatusEvent::IntentionChanged {
            index: idx,
            text: intentions[idx].text.clone(),
            status,
        });
    }
}

/// An oracle failure while planning ends the goal as a planning failure.
/// Cancellation keeps its own meaning.
fn planning_error(stage: &str, err: AgentError, diagnostics: Option<FailureDiagnostics>) -> AgentError {
    match err {
        AgentError::Aborted => AgentError::Aborted,
        AgentError::PlanningFailure { .. } => err,
        other => AgentError::PlanningFailure {
            reason: format!("{stage} call failed: {other}"),
            diagnostics,
        },
    }
}

fn reused_name(plan: &Plan) -> Option<&str> {
    match &plan.source {
        PlanSource::Reused { strategy } => Some(strategy),
        PlanSource::Fresh => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_names_are_truncated() {
        let goal = "x".repeat(80);
        let name = objective_name_for(&goal);
        assert_eq!(name.len(), "Objective: ".len() + 50);
    }

    #[test]
    fn intentions_parse_from_common_shapes() {
        let wrapped = parse_intentions(
            r#"{"intentions":[{"tactical_goal":"open File menu","expected_outcome":"menu visible"},{"tactical_goal":"click Save"}]}"#,
        );
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[0].expected_outcome.as_deref(), Some("menu visible"));
        assert_eq!(wrapped[1].status, IntentionStatus::Pending);

        let bare = parse_intentions(r#"["open File menu", "  ", "click Save"]"#);
        assert_eq!(bare.len(), 2);

        assert!(parse_intentions("I cannot help with that").is_empty());
    }

    #[test]
    fn oracle_errors_while_planning_become_planning_failures() {
        let err = planning_error("decomposition", AgentError::Oracle("HTTP 503".into()), None);
        match err {
            AgentError::PlanningFailure { reason, diagnostics } => {
                assert!(reason.contains("decomposition call failed"));
                assert!(reason.contains("HTTP 503"));
                assert!(diagnostics.is_none());
            }
            other => panic!("expected planning failure, got {other:?}"),
        }
        assert!(matches!(
            planning_error("self-correction", AgentError::Aborted, None),
            AgentError::Aborted
        ));
    }
}
