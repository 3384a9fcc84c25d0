use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::tool::SynthesizedTool;

/// The durable knowledge document. Every key is optional on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    /// Free-form; kept verbatim.
    #[serde(default = "empty_object")]
    pub user_data: serde_json::Value,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub perceptual_filters: PerceptualFilters,
    #[serde(default)]
    pub synthesized_tools: Vec<SynthesizedTool>,
    /// Top-level keys this version does not know; written back unchanged.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for KnowledgeDocument {
    fn default() -> Self {
        Self {
            aliases: BTreeMap::new(),
            user_data: empty_object(),
            objectives: Vec::new(),
            perceptual_filters: PerceptualFilters::default(),
            synthesized_tools: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptualFilters {
    #[serde(default)]
    pub ignore_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub objective_name: String,
    #[serde(default)]
    pub goal_prompt: String,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

impl Objective {
    pub fn strategy(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.strategy_name == name)
    }

    /// Highest success rate; ties go to the most recently used.
    pub fn best_strategy(&self) -> Option<&Strategy> {
        self.strategies.iter().max_by(|a, b| {
            a.success_rate
                .partial_cmp(&b.success_rate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.last_used.cmp(&b.last_used))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub strategy_name: String,
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

impl Strategy {
    pub fn same_steps(&self, steps: &[StepSpec]) -> bool {
        self.steps.len() == steps.len()
            && self
                .steps
                .iter()
                .zip(steps)
                .all(|(a, b)| a.tactical_goal == b.tactical_goal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub tactical_goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
}

impl StepSpec {
    pub fn new(tactical_goal: impl Into<String>) -> Self {
        Self {
            tactical_goal: tactical_goal.into(),
            expected_outcome: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_document_fills_defaults() {
        let doc: KnowledgeDocument =
            serde_json::from_str(r#"{"objectives":[{"objective_name":"Send mail"}]}"#).unwrap();
        assert!(doc.aliases.is_empty());
        assert!(doc.perceptual_filters.ignore_list.is_empty());
        assert!(doc.objectives[0].strategies.is_empty());
        assert_eq!(doc.user_data, serde_json::json!({}));
    }

    #[test]
    fn best_strategy_prefers_rate_then_recency() {
        let s = |name: &str, rate: f64, used: Option<DateTime<Utc>>| Strategy {
            strategy_name: name.into(),
            steps: vec![StepSpec::new("x")],
            success_rate: rate,
            last_used: used,
        };
        let now = Utc::now();
        let obj = Objective {
            objective_name: "o".into(),
            goal_prompt: String::new(),
            strategies: vec![s("a", 0.5, Some(now)), s("b", 0.8, None), s("c", 0.8, Some(now))],
        };
        assert_eq!(obj.best_strategy().unwrap().strategy_name, "c");
    }

    #[test]
    fn step_equality_ignores_outcome_text() {
        let stored = Strategy {
            strategy_name: "s".into(),
            steps: vec![StepSpec {
                tactical_goal: "open menu".into(),
                expected_outcome: Some("menu open".into()),
            }],
            success_rate: 0.9,
            last_used: None,
        };
        assert!(stored.same_steps(&[StepSpec::new("open menu")]));
        assert!(!stored.same_steps(&[StepSpec::new("open menu"), StepSpec::new("save")]));
    }
}
