//! Prompt templates for every oracle call the agent makes.
//!
//! Each template opens with a fixed header line naming the task, so replies in
//! logs can be attributed and test oracles can route on it.

pub const REACT_HEADER: &str = "TASK: decide the next action for the current intention.";
pub const CONFIDENCE_HEADER: &str = "TASK: rate your certainty in the proposed action.";
pub const ENTITY_HEADER: &str = "TASK: list the visible UI entities.";
pub const FOCUS_HEADER: &str = "TASK: locate the application window for this goal.";
pub const DECOMPOSE_HEADER: &str = "TASK: break the goal into intentions.";
pub const SELECT_HEADER: &str = "TASK: choose the best strategy.";
pub const CORRECT_HEADER: &str = "TASK: repair the plan after a failed intention.";
pub const VERIFY_HEADER: &str = "TASK: check whether the expected outcome is visible.";
pub const MATCH_HEADER: &str = "TASK: match the goal to a known objective.";
pub const SYNTHESIZE_HEADER: &str = "TASK: design a new tool.";
pub const REASON_HEADER: &str = "TASK: answer a reasoning question.";
pub const FORESIGHT_HEADER: &str = "TASK: review the plan for risks before it runs.";

const INTENTION_FORMAT: &str = r#"Respond with JSON only:
{"intentions": [{"tactical_goal": "<one concrete UI sub-goal>", "expected_outcome": "<what the screen shows once it is done>"}]}"#;

pub fn react(
    goal: &str,
    intention: &str,
    expected_outcome: Option<&str>,
    entities: &str,
    history: &str,
    tools: &str,
) -> String {
    let expected = expected_outcome
        .map(|e| format!("Expected outcome of this intention: {e}\n"))
        .unwrap_or_default();
    format!(
        "{REACT_HEADER}
Overall goal: {goal}
Current intention: {intention}
{expected}
Visible entities (coordinates are relative to the attached image):
{entities}

Previous steps for this intention:
{history}

Available tools (JSON Schema):
{tools}

Think about the current screen, then pick exactly one tool.
Call `finish_intention` once the intention is achieved, `report_failure` if it cannot be achieved,
and `report_capability_gap` if no available tool can do what is needed.
For UI actions you may add an `expected_outcome` parameter describing what should be visible afterwards.
Respond with JSON only:
{{\"thought\": \"<your reasoning>\", \"action\": {{\"tool\": \"<tool name>\", \"params\": {{...}}}}}}"
    )
}

pub fn confidence(intention: &str, thought: &str, action: &str, entities: &str) -> String {
    format!(
        "{CONFIDENCE_HEADER}
Intention: {intention}
Visible entities:
{entities}

Reasoning: {thought}
Proposed action: {action}

How certain is it that this exact action is correct right now and targets the right element?
Respond with JSON only: {{\"confidence\": <number between 0.0 and 1.0>}}"
    )
}

pub fn entity_extraction(ignore_list: &[String]) -> String {
    let ignore = if ignore_list.is_empty() {
        "(none)".to_string()
    } else {
        ignore_list
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "{ENTITY_HEADER}
Describe every interactive or informative element in the attached screenshot.
Skip anything matching these descriptions:
{ignore}

Respond with a JSON array only:
[{{\"kind\": \"button|text_field|link|menu|checkbox|label|icon|window|other\", \"label\": \"<visible text or name>\",
  \"bounding_box\": {{\"x\": 0, \"y\": 0, \"width\": 0, \"height\": 0}}, \"state\": \"<enabled|disabled|focused|checked|...>\", \"value\": \"<current value, optional>\"}}]"
    )
}

pub fn focus(goal: &str) -> String {
    format!(
        "{FOCUS_HEADER}
Command: \"{goal}\"
Identify the primary application window the user most likely wants to interact with.
Prefer the active window and dialogs that belong to the target application.
Respond with JSON only:
{{\"found_target_application\": true, \"application_name\": \"<name>\",
 \"bounding_box\": {{\"x\": 0, \"y\": 0, \"width\": 0, \"height\": 0}}, \"confidence\": 0.0}}
Set found_target_application to false if no clear window can be identified."
    )
}

pub fn decompose(goal: &str) -> String {
    format!(
        "{DECOMPOSE_HEADER}
Goal: {goal}
Split the goal into the smallest ordered list of sub-goals that each can be achieved on screen
with a handful of clicks or keystrokes, looking at the attached screenshot.
{INTENTION_FORMAT}"
    )
}

pub fn foresight(goal: &str, plan: &str) -> String {
    format!(
        "{FORESIGHT_HEADER}
Goal: {goal}
Proposed plan, in order:
{plan}

Walk through the plan against the attached screenshot and look for what could go wrong:
wrong window, destructive actions, missing preconditions, ambiguous targets.
Respond with JSON only:
{{\"risk_analysis\": {{\"overall_confidence_score\": <number between 0.0 and 1.0>,
 \"potential_risks\": [\"<risk>\"], \"suggested_mitigation\": \"<one sentence>\"}}}}"
    )
}

pub fn select_strategy(goal: &str, strategies: &str) -> String {
    format!(
        "{SELECT_HEADER}
Goal: {goal}
Known strategies for this objective:
{strategies}

Given the attached screenshot, which strategy is most likely to succeed from the current screen?
Answer with the strategy name only."
    )
}

pub fn correct(goal: &str, completed: &str, failed: &str, trail: &str) -> String {
    format!(
        "{CORRECT_HEADER}
Goal: {goal}
Intentions already completed:
{completed}

Intention that failed: {failed}
What happened:
{trail}

Looking at the attached screenshot, produce the intentions that remain to reach the goal from here.
{INTENTION_FORMAT}"
    )
}

pub fn verify(outcome: &str) -> String {
    format!(
        "{VERIFY_HEADER}
Expected outcome: {outcome}
Does the attached screenshot show this outcome? Answer true or false only."
    )
}

pub fn match_objective(goal: &str, objectives: &str) -> String {
    format!(
        "{MATCH_HEADER}
New goal: {goal}
Known objectives:
{objectives}

If the new goal asks for the same thing as one known objective, answer with that objective's name.
Otherwise answer None."
    )
}

pub fn synthesize(intention: &str, missing: &str, primitives: &str) -> String {
    format!(
        "{SYNTHESIZE_HEADER}
While working on \"{intention}\" the agent reported a missing capability:
{missing}

Compose a new tool out of these primitives only:
{primitives}

Recipe parameters may reference the new tool's own parameters as {{{{param_name}}}}.
Respond with JSON only:
{{\"name\": \"<snake_case>\", \"description\": \"<what it does>\",
 \"parameters\": [{{\"name\": \"<name>\", \"type\": \"string|integer|number|boolean\", \"description\": \"<text>\", \"required\": true}}],
 \"recipe\": [{{\"tool\": \"<primitive>\", \"params\": {{...}}}}]}}"
    )
}

pub fn reason(question: &str, context: &str) -> String {
    format!(
        "{REASON_HEADER}
Question: {question}
Context:
{context}

Answer concisely in plain text."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_start_with_their_header() {
        assert!(focus("open mail").starts_with(FOCUS_HEADER));
        assert!(verify("dialog closed").starts_with(VERIFY_HEADER));
        assert!(react("g", "i", None, "", "", "[]").starts_with(REACT_HEADER));
        assert!(entity_extraction(&[]).starts_with(ENTITY_HEADER));
        assert!(foresight("g", "1. open mail").starts_with(FORESIGHT_HEADER));
    }

    #[test]
    fn ignore_list_is_rendered_as_bullets() {
        let p = entity_extraction(&["clock widget".into(), "taskbar".into()]);
        assert!(p.contains("- clock widget\n- taskbar"));
    }

    #[test]
    fn synthesis_template_keeps_literal_placeholder_braces() {
        let p = synthesize("rename file", "no rename tool", "click, type_text");
        assert!(p.contains("{{param_name}}"));
    }
}
