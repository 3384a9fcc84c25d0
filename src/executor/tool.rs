use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::types::{FunctionDef, ToolDef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }

    /// Accept `value` as this type, coercing the loose encodings models tend
    /// to produce ("42" for 42, 3.0 for 3, "true" for true).
    fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamType::String, Value::String(_)) => Some(value.clone()),
            (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParamType::Integer, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Value::from),
            (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamType::Number, Value::Number(_)) => Some(value.clone()),
            (ParamType::Number, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ParamType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }
}

/// Name, description and typed parameters of a tool, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.parameters {
            properties.insert(
                p.name.clone(),
                serde_json::json!({ "type": p.param_type.as_str(), "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_tool_def(&self) -> ToolDef {
        ToolDef {
            def_type: "function".into(),
            function: FunctionDef {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.json_schema(),
            },
        }
    }

    /// Check `params` against the declared parameters and return the coerced
    /// map. Undeclared keys are dropped.
    pub fn validate(&self, params: &Map<String, Value>) -> Result<Map<String, Value>, String> {
        let mut out = Map::new();
        for spec in &self.parameters {
            match params.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(format!("missing required parameter '{}'", spec.name));
                    }
                }
                Some(v) => {
                    let coerced = spec.param_type.coerce(v).ok_or_else(|| {
                        format!(
                            "parameter '{}' must be {}, got {}",
                            spec.name,
                            spec.param_type.as_str(),
                            v
                        )
                    })?;
                    out.insert(spec.name.clone(), coerced);
                }
            }
        }
        for key in params.keys().filter(|k| self.param(k).is_none()) {
            tracing::debug!(tool = %self.name, param = %key, "dropping undeclared parameter");
        }
        Ok(out)
    }
}

/// Built-in primitives. The last three are reserved control signals that the
/// tactical executor interprets itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTool {
    Click,
    TypeText,
    Hotkey,
    MoveMouse,
    WaitForCondition,
    AskUser,
    Reason,
    FinishIntention,
    ReportFailure,
    ReportCapabilityGap,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 10] = [
        BuiltinTool::Click,
        BuiltinTool::TypeText,
        BuiltinTool::Hotkey,
        BuiltinTool::MoveMouse,
        BuiltinTool::WaitForCondition,
        BuiltinTool::AskUser,
        BuiltinTool::Reason,
        BuiltinTool::FinishIntention,
        BuiltinTool::ReportFailure,
        BuiltinTool::ReportCapabilityGap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinTool::Click => "click",
            BuiltinTool::TypeText => "type_text",
            BuiltinTool::Hotkey => "hotkey",
            BuiltinTool::MoveMouse => "move_mouse",
            BuiltinTool::WaitForCondition => "wait_for_condition",
            BuiltinTool::AskUser => "ask_user",
            BuiltinTool::Reason => "reason",
            BuiltinTool::FinishIntention => "finish_intention",
            BuiltinTool::ReportFailure => "report_failure",
            BuiltinTool::ReportCapabilityGap => "report_capability_gap",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            BuiltinTool::FinishIntention | BuiltinTool::ReportFailure | BuiltinTool::ReportCapabilityGap
        )
    }

    pub fn spec(&self) -> ToolSpec {
        use ParamType::*;
        let outcome = || {
            ParamSpec::optional(
                "expected_outcome",
                String,
                "What the screen should show after the action; it is verified before continuing.",
            )
        };
        let (description, parameters) = match self {
            BuiltinTool::Click => (
                "Left-click a UI element, either by its entity label or by x/y coordinates relative to the screenshot.",
                vec![
                    ParamSpec::optional("target", String, "Label of the entity to click."),
                    ParamSpec::optional("x", Integer, "X coordinate in the screenshot."),
                    ParamSpec::optional("y", Integer, "Y coordinate in the screenshot."),
                    outcome(),
                ],
            ),
            BuiltinTool::TypeText => (
                "Type text into the focused element.",
                vec![ParamSpec::required("text", String, "Text to type."), outcome()],
            ),
            BuiltinTool::Hotkey => (
                "Press a key combination such as ctrl+s.",
                vec![
                    ParamSpec::required("keys", String, "Keys joined with '+'."),
                    outcome(),
                ],
            ),
            BuiltinTool::MoveMouse => (
                "Move the pointer to x/y coordinates relative to the screenshot.",
                vec![
                    ParamSpec::required("x", Integer, "X coordinate in the screenshot."),
                    ParamSpec::required("y", Integer, "Y coordinate in the screenshot."),
                    outcome(),
                ],
            ),
            BuiltinTool::WaitForCondition => (
                "Wait until a described condition is visible on screen, up to a timeout.",
                vec![
                    ParamSpec::required("condition", String, "Visible condition to wait for."),
                    ParamSpec::optional("timeout_ms", Integer, "Maximum wait in milliseconds."),
                ],
            ),
            BuiltinTool::AskUser => (
                "Ask the user a clarifying question and wait for the answer.",
                vec![ParamSpec::required("question", String, "Question for the user.")],
            ),
            BuiltinTool::Reason => (
                "Think through a question without touching the screen; returns a text answer.",
                vec![
                    ParamSpec::required("question", String, "Question to reason about."),
                    ParamSpec::optional("context", String, "Extra context for the question."),
                ],
            ),
            BuiltinTool::FinishIntention => (
                "Declare the current intention achieved.",
                vec![ParamSpec::optional("summary", String, "What was done.")],
            ),
            BuiltinTool::ReportFailure => (
                "Declare the current intention impossible to achieve.",
                vec![ParamSpec::required("reason", String, "Why it cannot be done.")],
            ),
            BuiltinTool::ReportCapabilityGap => (
                "Report that no available tool can perform a needed operation.",
                vec![ParamSpec::required(
                    "missing_capability",
                    String,
                    "The operation that is missing.",
                )],
            ),
        };
        ToolSpec {
            name: self.name().into(),
            description: description.into(),
            parameters,
        }
    }
}

/// One primitive invocation inside a synthesized tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub tool: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// A runtime-authored tool: a spec plus an ordered recipe of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedTool {
    #[serde(flatten)]
    pub spec: ToolSpec,
    pub recipe: Vec<RecipeStep>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolKind {
    Builtin(BuiltinTool),
    Synthesized(Vec<RecipeStep>),
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub spec: ToolSpec,
    pub kind: ToolKind,
}

impl From<BuiltinTool> for Tool {
    fn from(b: BuiltinTool) -> Self {
        Self {
            spec: b.spec(),
            kind: ToolKind::Builtin(b),
        }
    }
}

impl From<SynthesizedTool> for Tool {
    fn from(s: SynthesizedTool) -> Self {
        Self {
            spec: s.spec,
            kind: ToolKind::Synthesized(s.recipe),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
        }
    }

    /// One-line form used as a ReAct observation.
    pub fn summary(&self) -> String {
        match (&self.error, self.success) {
            (Some(e), _) => format!("failed: {e}"),
            (None, true) if self.data.is_null() => "ok".into(),
            (None, true) => format!("ok: {}", self.data),
            (None, false) => "failed".into(),
        }
    }
}
