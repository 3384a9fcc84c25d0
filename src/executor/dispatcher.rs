//! Tool registry: the name-keyed table of everything the model may invoke.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

use regex::Regex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::agent_engine::prompts;
use crate::errors::{AgentError, AgentResult};
use crate::executor::coordinator::{entity_center, find_entity};
use crate::executor::input::{parse_hotkey, InputDevice};
use crate::executor::safety;
use crate::executor::tool::{BuiltinTool, RecipeStep, SynthesizedTool, Tool, ToolKind, ToolResult, ToolSpec};
use crate::human::HumanChannel;
use crate::llm::gateway::Oracle;
use crate::llm::parse::parse_verdict;
use crate::llm::types::ModelTier;
use crate::perception::focus_crop::FocusRegion;
use crate::perception::traits::ScreenCapture;
use crate::perception::wait::{wait_for_condition, WaitConfig, WaitOutcome};
use crate::perception::world_model::WorldModel;

/// Collaborators a tool invocation may touch.
pub struct ToolContext<'a> {
    pub input: &'a dyn InputDevice,
    pub human: &'a dyn HumanChannel,
    pub oracle: &'a dyn Oracle,
    pub capture: &'a dyn ScreenCapture,
    pub world: &'a WorldModel,
    pub region: &'a FocusRegion,
    pub ignore_list: &'a [String],
    pub wait: &'a WaitConfig,
    pub cancel: &'a CancellationToken,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"))
}

pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ToolRegistry {
    pub fn with_builtins() -> Self {
        let tools = BuiltinTool::ALL
            .into_iter()
            .map(|b| (b.name().to_string(), Tool::from(b)))
            .collect();
        Self {
            tools: RwLock::new(tools),
        }
    }

    /// Every registered tool, builtins and synthesized alike, in name order.
    pub fn describe(&self) -> Vec<ToolSpec> {
        self.read().values().map(|t| t.spec.clone()).collect()
    }

    /// Tool schemas as a JSON array of function definitions.
    pub fn describe_for_prompt(&self) -> String {
        let defs: Vec<_> = self.describe().iter().map(ToolSpec::to_tool_def).collect();
        serde_json::to_string_pretty(&defs).unwrap_or_else(|_| "[]".into())
    }

    /// Schemas of the primitives a synthesized tool may be built from.
    pub fn primitives_for_prompt() -> String {
        let defs: Vec<_> = BuiltinTool::ALL
            .into_iter()
            .filter(|b| !b.is_reserved())
            .map(|b| b.spec().to_tool_def())
            .collect();
        serde_json::to_string_pretty(&defs).unwrap_or_else(|_| "[]".into())
    }

    pub fn get(&self, name: &str) -> Option<Tool> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn is_ui_mutating(&self, name: &str) -> bool {
        self.read()
            .get(name)
            .map(|t| safety::is_ui_mutating(&t.kind))
            .unwrap_or(false)
    }

    /// Structural checks a draft must pass before a human ever sees it.
    pub fn validate_synthesized(&self, tool: &SynthesizedTool) -> AgentResult<()> {
        let name = tool.spec.name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AgentError::Synthesis(format!("invalid tool name '{name}'")));
        }
        if self.contains(name) {
            return Err(AgentError::Synthesis(format!("a tool named '{name}' already exists")));
        }
        if tool.recipe.is_empty() {
            return Err(AgentError::Synthesis("recipe is empty".into()));
        }
        let mut seen = BTreeSet::new();
        for p in &tool.spec.parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(AgentError::Synthesis(format!("duplicate parameter '{}'", p.name)));
            }
        }
        for (i, step) in tool.recipe.iter().enumerate() {
            match BuiltinTool::from_name(&step.tool) {
                Some(b) if !b.is_reserved() => {}
                _ => {
                    return Err(AgentError::Synthesis(format!(
                        "step {} uses '{}', which is not a built-in primitive",
                        i + 1,
                        step.tool
                    )))
                }
            }
            for placeholder in placeholders(&step.params) {
                if tool.spec.param(&placeholder).is_none() {
                    return Err(AgentError::Synthesis(format!(
                        "step {} references undeclared parameter '{{{{{placeholder}}}}}'",
                        i + 1
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn register_synthesized(&self, tool: SynthesizedTool) -> AgentResult<()> {
        self.validate_synthesized(&tool)?;
        let name = tool.spec.name.clone();
        self.write().insert(name.clone(), Tool::from(tool));
        tracing::info!(tool = %name, "synthesized tool registered");
        Ok(())
    }

    /// Invoke a tool by name. Unknown names and parameter mismatches are
    /// `ToolInvocation` errors; a tool that ran but did not achieve its effect
    /// returns `Ok` with `success == false`.
    pub async fn invoke(
        &self,
        name: &str,
        params: &Map<String, Value>,
        ctx: &ToolContext<'_>,
    ) -> AgentResult<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolInvocation(format!("unknown tool '{name}'")))?;
        let params = tool
            .spec
            .validate(params)
            .map_err(|e| AgentError::ToolInvocation(format!("{name}: {e}")))?;

        tracing::info!(tool = %name, "invoking tool");
        match tool.kind {
            ToolKind::Builtin(b) => invoke_builtin(b, &params, ctx).await,
            ToolKind::Synthesized(recipe) => run_recipe(name, &recipe, &params, ctx).await,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Tool>> {
        self.tools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Tool>> {
        self.tools.write().unwrap_or_else(|e| e.into_inner())
    }
}

async fn invoke_builtin(
    tool: BuiltinTool,
    params: &Map<String, Value>,
    ctx: &ToolContext<'_>,
) -> AgentResult<ToolResult> {
    let str_param = |k: &str| params.get(k).and_then(Value::as_str).unwrap_or("");

    match tool {
        BuiltinTool::Click => {
            let target = params.get("target").and_then(Value::as_str);
            let entities = ctx.world.entities();
            let relative = match (
                target.and_then(|t| find_entity(&entities, t)),
                coordinate(params, "x")?,
                coordinate(params, "y")?,
            ) {
                (Some(entity), _, _) => entity_center(entity),
                (None, Some(x), Some(y)) => (x, y),
                (None, _, _) => {
                    return match target {
                        Some(t) => Ok(ToolResult::fail(format!("no visible entity labelled '{t}'"))),
                        None => Err(AgentError::ToolInvocation(
                            "click: needs a target label or both x and y".into(),
                        )),
                    }
                }
            };
            let (x, y) = absolute(ctx, relative.0, relative.1)?;
            ctx.input.click(x, y).await?;
            Ok(ToolResult::ok(serde_json::json!({ "x": x, "y": y })))
        }
        BuiltinTool::TypeText => {
            ctx.input.type_text(str_param("text")).await?;
            Ok(ToolResult::ok(Value::Null))
        }
        BuiltinTool::Hotkey => {
            let keys = parse_hotkey(str_param("keys"));
            if keys.is_empty() {
                return Err(AgentError::ToolInvocation("hotkey: no keys given".into()));
            }
            ctx.input.hotkey(&keys).await?;
            Ok(ToolResult::ok(Value::Null))
        }
        BuiltinTool::MoveMouse => {
            let (x, y) = match (coordinate(params, "x")?, coordinate(params, "y")?) {
                (Some(x), Some(y)) => absolute(ctx, x, y)?,
                _ => return Err(AgentError::ToolInvocation("move_mouse: needs x and y".into())),
            };
            ctx.input.move_to(x, y).await?;
            Ok(ToolResult::ok(serde_json::json!({ "x": x, "y": y })))
        }
        BuiltinTool::WaitForCondition => {
            let timeout = params
                .get("timeout_ms")
                .and_then(Value::as_u64)
                .map(Duration::from_millis);
            let outcome = observe_condition(ctx, str_param("condition"), timeout).await?;
            Ok(match outcome {
                WaitOutcome::Satisfied { polls, elapsed } => ToolResult::ok(serde_json::json!({
                    "polls": polls,
                    "elapsed_ms": elapsed.as_millis() as u64,
                })),
                WaitOutcome::TimedOut { polls } => {
                    ToolResult::fail(format!("condition not observed after {polls} checks"))
                }
            })
        }
        BuiltinTool::AskUser => {
            let answer = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(AgentError::Aborted),
                answer = ctx.human.ask(str_param("question")) => answer?,
            };
            Ok(ToolResult::ok(serde_json::json!({ "answer": answer })))
        }
        BuiltinTool::Reason => {
            let prompt = prompts::reason(str_param("question"), str_param("context"));
            let answer = ctx.oracle.call(&prompt, None, ModelTier::Balanced).await?;
            Ok(ToolResult::ok(serde_json::json!({ "answer": answer })))
        }
        BuiltinTool::FinishIntention | BuiltinTool::ReportFailure | BuiltinTool::ReportCapabilityGap => {
            Err(AgentError::ToolInvocation(format!(
                "'{}' is a control signal, not an action",
                tool.name()
            )))
        }
    }
}

/// Integer coordinate parameter. Values outside `i32` are rejected rather
/// than truncated.
fn coordinate(params: &Map<String, Value>, key: &str) -> AgentResult<Option<i32>> {
    let Some(v) = params.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    v.as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .map(Some)
        .ok_or_else(|| AgentError::ToolInvocation(format!("{key}={v} is not a screen coordinate")))
}

fn absolute(ctx: &ToolContext<'_>, x: i32, y: i32) -> AgentResult<(i32, i32)> {
    ctx.region.offset.to_absolute(x, y).ok_or_else(|| {
        AgentError::ToolInvocation(format!("({x}, {y}) lies outside the screen once translated"))
    })
}

async fn run_recipe(
    name: &str,
    recipe: &[RecipeStep],
    params: &Map<String, Value>,
    ctx: &ToolContext<'_>,
) -> AgentResult<ToolResult> {
    let mut outputs = Vec::with_capacity(recipe.len());
    for (i, step) in recipe.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(AgentError::Aborted);
        }
        let primitive = BuiltinTool::from_name(&step.tool)
            .filter(|b| !b.is_reserved())
            .ok_or_else(|| AgentError::ToolInvocation(format!("{name}: bad primitive '{}'", step.tool)))?;
        let bound = substitute(&step.params, params);
        let bound = primitive
            .spec()
            .validate(&bound)
            .map_err(|e| AgentError::ToolInvocation(format!("{name} step {}: {e}", i + 1)))?;
        tracing::debug!(tool = %name, step = i + 1, primitive = primitive.name(), "recipe step");
        let result = invoke_builtin(primitive, &bound, ctx).await?;
        if !result.success {
            return Ok(ToolResult::fail(format!(
                "step {} ({}) {}",
                i + 1,
                primitive.name(),
                result.summary()
            )));
        }
        outputs.push(result.data);
    }
    Ok(ToolResult::ok(Value::Array(outputs)))
}

/// Poll until `condition` is visible in the focused region, refreshing the
/// world model on every poll.
pub async fn observe_condition(
    ctx: &ToolContext<'_>,
    condition: &str,
    timeout: Option<Duration>,
) -> AgentResult<WaitOutcome> {
    let cfg = match timeout {
        Some(t) => ctx.wait.clone().with_timeout(t),
        None => ctx.wait.clone(),
    };
    wait_for_condition(move || check_condition(ctx, condition), &cfg, ctx.cancel).await
}

async fn check_condition(ctx: &ToolContext<'_>, condition: &str) -> AgentResult<bool> {
    let snapshot = ctx.region.capture(ctx.capture).await?;
    if let Err(e) = ctx.world.refresh(&snapshot.png, ctx.ignore_list).await {
        tracing::debug!(error = %e, "refresh during wait failed");
    }
    let reply = ctx
        .oracle
        .call(&prompts::verify(condition), Some(&snapshot.png), ModelTier::Fast)
        .await?;
    Ok(parse_verdict(&reply).unwrap_or(false))
}

fn placeholders(params: &Map<String, Value>) -> Vec<String> {
    params
        .values()
        .filter_map(Value::as_str)
        .flat_map(|s| placeholder_re().captures_iter(s).map(|c| c[1].to_string()))
        .collect()
}

/// Bind `{{param}}` references. A value that is exactly one placeholder takes
/// the argument's JSON value; placeholders inside longer strings are spliced
/// in as text.
fn substitute(template: &Map<String, Value>, args: &Map<String, Value>) -> Map<String, Value> {
    template
        .iter()
        .map(|(k, v)| {
            let bound = match v {
                Value::String(s) => {
                    let whole = placeholder_re()
                        .captures(s)
                        .filter(|c| c.get(0).map(|m| m.as_str()) == Some(s.trim()));
                    match whole {
                        Some(c) => args.get(&c[1]).cloned().unwrap_or(Value::Null),
                        None => Value::String(
                            placeholder_re()
                                .replace_all(s, |c: &regex::Captures| match args.get(&c[1]) {
                                    Some(Value::String(text)) => text.clone(),
                                    Some(Value::Null) | None => String::new(),
                                    Some(other) => other.to_string(),
                                })
                                .into_owned(),
                        ),
                    }
                }
                other => other.clone(),
            };
            (k.clone(), bound)
        })
        .collect()
}
