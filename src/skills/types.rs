use serde::{Deserialize, Serialize};

use crate::executor::tool::SynthesizedTool;

/// How a reported capability gap was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum GapResolution {
    /// Approved, persisted and registered under this name.
    Registered { name: String },
    Rejected { name: String },
    /// The oracle's draft could not be used; nothing was shown to the user.
    DraftInvalid { reason: String },
}

impl GapResolution {
    /// User-facing note for the task report, if the gap stays open.
    pub fn limitation(&self, missing: &str) -> Option<String> {
        match self {
            GapResolution::Registered { .. } => None,
            GapResolution::Rejected { name } => Some(format!(
                "Proposed tool '{name}' was rejected; continuing without: {missing}"
            )),
            GapResolution::DraftInvalid { reason } => {
                Some(format!("No usable tool could be drafted for: {missing} ({reason})"))
            }
        }
    }
}

/// Text shown to the approver: what the tool does and every primitive it runs.
pub fn render_proposal(tool: &SynthesizedTool, missing: &str) -> String {
    let mut out = format!(
        "The agent needs a new capability: {missing}\n\nProposed tool `{}`: {}\n",
        tool.spec.name, tool.spec.description
    );
    if !tool.spec.parameters.is_empty() {
        out.push_str("Parameters:\n");
        for p in &tool.spec.parameters {
            let req = if p.required { "required" } else { "optional" };
            out.push_str(&format!("  - {} ({}, {req}): {}\n", p.name, p.param_type.as_str(), p.description));
        }
    }
    out.push_str("Steps:\n");
    for (i, step) in tool.recipe.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} {}\n",
            i + 1,
            step.tool,
            serde_json::Value::Object(step.params.clone())
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tool::{ParamSpec, ParamType, RecipeStep, ToolSpec};

    #[test]
    fn proposal_lists_every_step() {
        let tool = SynthesizedTool {
            spec: ToolSpec {
                name: "save_as".into(),
                description: "Save under a new name".into(),
                parameters: vec![ParamSpec::required("filename", ParamType::String, "target file")],
            },
            recipe: vec![
                RecipeStep {
                    tool: "hotkey".into(),
                    params: serde_json::from_str(r#"{"keys":"ctrl+shift+s"}"#).unwrap(),
                },
                RecipeStep {
                    tool: "type_text".into(),
                    params: serde_json::from_str(r#"{"text":"{{filename}}"}"#).unwrap(),
                },
            ],
        };
        let text = render_proposal(&tool, "save with a different file name");
        assert!(text.contains("`save_as`"));
        assert!(text.contains("1. hotkey"));
        assert!(text.contains("2. type_text"));
        assert!(text.contains("filename (string, required)"));
    }

    #[test]
    fn only_open_gaps_have_limitations() {
        assert!(GapResolution::Registered { name: "x".into() }.limitation("m").is_none());
        let note = GapResolution::Rejected { name: "drag".into() }.limitation("drag files").unwrap();
        assert!(note.contains("drag files"));
    }
}
