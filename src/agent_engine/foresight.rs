//! Risk review of a freshly decomposed plan before any of it runs.
//!
//! One deep oracle call walks the plan against the current screen and scores
//! it. A plan scoring under the threshold needs the user's go-ahead.

use serde_json::Value;

use crate::agent_engine::prompts;
use crate::agent_engine::state::Intention;
use crate::errors::{AgentError, AgentResult};
use crate::human::HumanChannel;
use crate::llm::gateway::Oracle;
use crate::llm::parse::extract_json;
use crate::llm::types::ModelTier;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskReview {
    pub score: f64,
    pub risks: Vec<String>,
    pub mitigation: Option<String>,
}

impl RiskReview {
    fn unreadable() -> Self {
        Self {
            score: 0.0,
            risks: vec!["the plan could not be reviewed".into()],
            mitigation: None,
        }
    }

    /// Reads `risk_analysis.overall_confidence_score` or a flat score.
    /// Risks may be plain strings or objects with a `description`.
    pub fn parse(reply: &str) -> Option<Self> {
        let v = extract_json(reply)?;
        let analysis = v.get("risk_analysis").unwrap_or(&v);
        let score = ["overall_confidence_score", "confidence", "score"]
            .iter()
            .find_map(|k| analysis.get(*k).and_then(Value::as_f64))
            .filter(|n| (0.0..=1.0).contains(n))?;
        let risks = analysis
            .get("potential_risks")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| match r {
                        Value::String(s) => Some(s.trim().to_string()),
                        Value::Object(o) => o
                            .get("description")
                            .and_then(Value::as_str)
                            .map(|s| s.trim().to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let mitigation = analysis
            .get("suggested_mitigation")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        Some(Self { score, risks, mitigation })
    }

    fn render(&self, goal: &str, intentions: &[Intention]) -> String {
        let mut out = format!("The plan for \"{goal}\" was reviewed with confidence {:.2}.\n", self.score);
        for (i, intention) in intentions.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, intention.text));
        }
        if !self.risks.is_empty() {
            out.push_str("Risks:\n");
            for risk in &self.risks {
                out.push_str(&format!("  - {risk}\n"));
            }
        }
        if let Some(m) = &self.mitigation {
            out.push_str(&format!("Suggested mitigation: {m}\n"));
        }
        out.push_str("Run this plan?");
        out
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlanReviewer {
    threshold: f64,
}

impl PlanReviewer {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Score the plan. An oracle failure or unreadable reply scores 0 so the
    /// user is asked. Only cancellation propagates.
    pub async fn review(
        &self,
        oracle: &dyn Oracle,
        goal: &str,
        intentions: &[Intention],
        image: &[u8],
    ) -> AgentResult<RiskReview> {
        let plan = intentions
            .iter()
            .enumerate()
            .map(|(i, it)| match &it.expected_outcome {
                Some(e) => format!("{}. {} (expect: {e})", i + 1, it.text),
                None => format!("{}. {}", i + 1, it.text),
            })
            .collect::<Vec<_>>()
            .join("\n");
        match oracle
            .call(&prompts::foresight(goal, &plan), Some(image), ModelTier::Deep)
            .await
        {
            Ok(reply) => Ok(RiskReview::parse(&reply).unwrap_or_else(|| {
                tracing::warn!(reply = %reply, "risk review unreadable, scoring 0");
                RiskReview::unreadable()
            })),
            Err(AgentError::Aborted) => Err(AgentError::Aborted),
            Err(e) => {
                tracing::warn!(error = %e, "risk review failed, scoring 0");
                Ok(RiskReview::unreadable())
            }
        }
    }

    /// Whether the plan may run: above the threshold, or confirmed by the user.
    pub async fn approve(
        &self,
        review: &RiskReview,
        human: &dyn HumanChannel,
        goal: &str,
        intentions: &[Intention],
    ) -> AgentResult<bool> {
        if review.score >= self.threshold {
            return Ok(true);
        }
        tracing::info!(score = review.score, risks = review.risks.len(), "plan needs confirmation");
        human.confirm(&review.render(goal, intentions)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_and_flat_replies_parse() {
        let nested = RiskReview::parse(
            r#"{"risk_analysis":{"overall_confidence_score":0.4,
                "potential_risks":["may close unsaved work",{"description":"wrong window"}],
                "suggested_mitigation":"save first"}}"#,
        )
        .unwrap();
        assert_eq!(nested.score, 0.4);
        assert_eq!(nested.risks, vec!["may close unsaved work", "wrong window"]);
        assert_eq!(nested.mitigation.as_deref(), Some("save first"));

        let flat = RiskReview::parse(r#"{"score": 0.9}"#).unwrap();
        assert_eq!(flat.score, 0.9);
        assert!(flat.risks.is_empty());

        assert!(RiskReview::parse("looks fine to me").is_none());
    }

    #[test]
    fn confirmation_text_lists_plan_and_risks() {
        let review = RiskReview {
            score: 0.3,
            risks: vec!["deletes the file".into()],
            mitigation: Some("move it to trash instead".into()),
        };
        let text = review.render("clean up", &[Intention::new("delete report.txt", None)]);
        assert!(text.contains("1. delete report.txt"));
        assert!(text.contains("- deletes the file"));
        assert!(text.contains("move it to trash instead"));
        assert!(text.contains("0.30"));
    }
}
