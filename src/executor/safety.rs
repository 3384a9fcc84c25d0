// Which tools change the screen and therefore pass the confidence gate.
use crate::executor::tool::{BuiltinTool, RecipeStep, ToolKind};

pub fn is_ui_mutating_builtin(tool: BuiltinTool) -> bool {
    matches!(
        tool,
        BuiltinTool::Click | BuiltinTool::TypeText | BuiltinTool::Hotkey | BuiltinTool::MoveMouse
    )
}

/// A synthesized tool is UI-mutating if any recipe step is.
pub fn is_ui_mutating(kind: &ToolKind) -> bool {
    match kind {
        ToolKind::Builtin(b) => is_ui_mutating_builtin(*b),
        ToolKind::Synthesized(recipe) => recipe_mutates_ui(recipe),
    }
}

fn recipe_mutates_ui(recipe: &[RecipeStep]) -> bool {
    recipe
        .iter()
        .filter_map(|s| BuiltinTool::from_name(&s.tool))
        .any(is_ui_mutating_builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_tools_skip_the_gate() {
        assert!(is_ui_mutating(&ToolKind::Builtin(BuiltinTool::Click)));
        assert!(!is_ui_mutating(&ToolKind::Builtin(BuiltinTool::WaitForCondition)));
        assert!(!is_ui_mutating(&ToolKind::Builtin(BuiltinTool::Reason)));
    }

    #[test]
    fn recipe_with_any_ui_step_is_mutating() {
        let step = |tool: &str| RecipeStep {
            tool: tool.into(),
            params: Default::default(),
        };
        assert!(is_ui_mutating(&ToolKind::Synthesized(vec![step("reason"), step("hotkey")])));
        assert!(!is_ui_mutating(&ToolKind::Synthesized(vec![step("ask_user")])));
    }
}
