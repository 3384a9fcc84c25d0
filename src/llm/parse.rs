//! Defensive parsing of oracle replies.
//!
//! Oracle output is untrusted text: it may wrap JSON in markdown fences, prepend
//! prose, or answer a yes/no question with a sentence. Every helper here returns
//! `None` rather than guessing when the shape is not recognisable.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?|-?\.\d+").expect("static regex"))
}

fn ratio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\d\s*(?:/|\bout\s+of\b)\s*\d").expect("static regex"))
}

/// Extract the first JSON object or array embedded in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    if let Some(caps) = fence_re().captures(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Some(v);
        }
    }

    // Outermost brace/bracket span.
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }
    None
}

/// Certainty score in `[0, 1]`. A JSON `confidence` / `score` field wins;
/// otherwise a bare number or percentage. Ratios ("1/10", "7 out of 10") are
/// refused, since their first number alone reads as a high score.
pub fn parse_score(text: &str) -> Option<f64> {
    if let Some(v) = extract_json(text) {
        if let Some(n) = v
            .get("confidence")
            .or_else(|| v.get("score"))
            .and_then(Value::as_f64)
        {
            return normalise_score(n);
        }
    }
    if ratio_re().is_match(text) {
        return None;
    }
    let m = number_re().find(text)?;
    let n: f64 = m.as_str().parse().ok()?;
    normalise_score(n)
}

fn normalise_score(n: f64) -> Option<f64> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    if n <= 1.0 {
        Some(n)
    } else if n <= 100.0 {
        Some(n / 100.0)
    } else {
        None
    }
}

/// A true/false verdict, e.g. for "is this condition visible" checks.
pub fn parse_verdict(text: &str) -> Option<bool> {
    if let Some(v) = extract_json(text) {
        for key in ["result", "observed", "verdict", "value"] {
            if let Some(b) = v.get(key).and_then(Value::as_bool) {
                return Some(b);
            }
        }
    }
    let word: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    match word.as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

/// A single name, or `None` when the oracle answered "None"/empty.
pub fn parse_choice(text: &str) -> Option<String> {
    let cleaned = text
        .trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.')
        .trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("none") || cleaned.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_inside_fences_and_prose() {
        let v = extract_json("Sure!\n```json\n{\"thought\": \"x\"}\n```\nDone").unwrap();
        assert_eq!(v["thought"], "x");

        let v = extract_json("Here you go: {\"a\": [1, 2]} hope it helps").unwrap();
        assert_eq!(v["a"][1], 2);

        assert!(extract_json("no structure at all").is_none());
    }

    #[test]
    fn scores_accept_several_shapes() {
        assert_eq!(parse_score("0.92"), Some(0.92));
        assert_eq!(parse_score("{\"confidence\": 0.4}"), Some(0.4));
        assert_eq!(parse_score("I'd say 85"), Some(0.85));
        assert_eq!(parse_score("certainly"), None);
        assert_eq!(parse_score("250"), None);
    }

    #[test]
    fn ratios_are_not_scores() {
        assert_eq!(parse_score("1/10"), None);
        assert_eq!(parse_score("I'd give it 1 / 10"), None);
        assert_eq!(parse_score("7 out of 10"), None);
        assert_eq!(parse_score("Confidence: 1 OUT OF 5, the label is ambiguous"), None);
        // the structured field is still trusted when prose around it has a ratio
        assert_eq!(parse_score("2/3 buttons match. {\"confidence\": 0.3}"), Some(0.3));
    }

    #[test]
    fn verdicts() {
        assert_eq!(parse_verdict("true"), Some(true));
        assert_eq!(parse_verdict("False."), Some(false));
        assert_eq!(parse_verdict("{\"observed\": true}"), Some(true));
        assert_eq!(parse_verdict("maybe"), None);
    }

    #[test]
    fn choices() {
        assert_eq!(parse_choice("`Open report`"), Some("Open report".into()));
        assert_eq!(parse_choice(" None "), None);
    }
}
