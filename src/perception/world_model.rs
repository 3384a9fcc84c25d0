use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::agent_engine::prompts;
use crate::errors::{AgentError, AgentResult};
use crate::llm::gateway::Oracle;
use crate::llm::parse::extract_json;
use crate::llm::types::ModelTier;
use crate::perception::types::Entity;

/// Statistics of the most recent successful refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStats {
    pub entities: usize,
    pub filtered: usize,
    pub latency: Duration,
}

/// Latest structured view of the current screen.
///
/// `refresh` replaces the entity list only when the oracle reply parses; on
/// failure the previous list stays in place and can still be read.
pub struct WorldModel {
    oracle: Arc<dyn Oracle>,
    entities: Mutex<Vec<Entity>>,
    stats: Mutex<Option<RefreshStats>>,
}

impl WorldModel {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            entities: Mutex::new(Vec::new()),
            stats: Mutex::new(None),
        }
    }

    pub async fn refresh(&self, image: &[u8], ignore_list: &[String]) -> AgentResult<Vec<Entity>> {
        let started = Instant::now();
        let prompt = prompts::entity_extraction(ignore_list);
        let reply = self.oracle.call(&prompt, Some(image), ModelTier::Fast).await?;

        let parsed = parse_entities(&reply).ok_or_else(|| {
            tracing::warn!(reply_len = reply.len(), "entity reply did not parse, keeping previous entities");
            AgentError::Perception("entity list could not be parsed".into())
        })?;

        let (kept, filtered) = apply_ignore_list(parsed, ignore_list);
        let stats = RefreshStats {
            entities: kept.len(),
            filtered,
            latency: started.elapsed(),
        };
        tracing::info!(
            entities = stats.entities,
            filtered = stats.filtered,
            latency_ms = stats.latency.as_millis() as u64,
            "world model refreshed"
        );

        *self.entities.lock().unwrap_or_else(|e| e.into_inner()) = kept.clone();
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = Some(stats);
        Ok(kept)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entities.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_stats(&self) -> Option<RefreshStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.entities.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Accepts a bare array or an object with an `entities` array. Elements that
/// are not entity-shaped are dropped; a reply with no array at all is `None`.
fn parse_entities(reply: &str) -> Option<Vec<Entity>> {
    let value = extract_json(reply)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("entities") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };
    Some(
        items
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Entity>(v).ok())
            .collect(),
    )
}

/// Every alphanumeric word of the pattern must occur in the entity description.
pub fn matches_ignore(entity: &Entity, pattern: &str) -> bool {
    let description = entity.description().to_lowercase();
    let mut words = pattern
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .peekable();
    if words.peek().is_none() {
        return false;
    }
    words.all(|w| description.contains(&w.to_lowercase()))
}

/// Drop entities matching any ignore pattern; returns survivors and hit count.
pub fn apply_ignore_list(entities: Vec<Entity>, ignore_list: &[String]) -> (Vec<Entity>, usize) {
    let before = entities.len();
    let kept: Vec<Entity> = entities
        .into_iter()
        .filter(|e| !ignore_list.iter().any(|p| matches_ignore(e, p)))
        .collect();
    let filtered = before - kept.len();
    (kept, filtered)
}

pub fn render_for_prompt(entities: &[Entity]) -> String {
    if entities.is_empty() {
        return "(no entities detected)".into();
    }
    entities
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let b = e.bounding_box;
            let mut line = format!(
                "{}. [{}] \"{}\" at ({}, {}, {}x{})",
                i + 1,
                e.kind,
                e.label,
                b.x,
                b.y,
                b.width,
                b.height
            );
            if !e.state.is_empty() {
                line.push_str(&format!(" state={}", e.state));
            }
            if let Some(v) = &e.value {
                line.push_str(&format!(" value=\"{v}\""));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::BoundingBox;
    use async_trait::async_trait;

    struct Canned(&'static str);

    #[async_trait]
    impl Oracle for Canned {
        async fn call(&self, _prompt: &str, _image: Option<&[u8]>, _tier: ModelTier) -> AgentResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn entity(kind: &str, label: &str) -> Entity {
        Entity {
            kind: kind.into(),
            label: label.into(),
            bounding_box: BoundingBox::new(0, 0, 10, 10),
            state: String::new(),
            value: None,
        }
    }

    #[test]
    fn ignore_match_needs_every_word() {
        let clock = entity("widget", "Clock 12:45");
        assert!(matches_ignore(&clock, "clock widget"));
        assert!(matches_ignore(&clock, "CLOCK"));
        assert!(!matches_ignore(&clock, "weather widget"));
        assert!(!matches_ignore(&clock, "  "));
    }

    #[test]
    fn filter_counts_hits() {
        let (kept, hits) = apply_ignore_list(
            vec![entity("widget", "Clock"), entity("button", "Submit")],
            &["clock widget".into()],
        );
        assert_eq!(hits, 1);
        assert_eq!(kept[0].label, "Submit");
    }

    #[tokio::test]
    async fn refresh_filters_locally_and_records_stats() {
        let wm = WorldModel::new(Arc::new(Canned(
            r#"{"entities": [
                {"kind": "widget", "label": "Clock", "bounding_box": {"x": 0, "y": 0, "width": 40, "height": 20}},
                {"kind": "button", "label": "Submit", "bounding_box": {"x": 100, "y": 80, "width": 60, "height": 24}}
            ]}"#,
        )));
        let entities = wm.refresh(b"png", &["clock widget".into()]).await.unwrap();
        assert_eq!(entities.len(), 1);
        let stats = wm.last_stats().unwrap();
        assert_eq!((stats.entities, stats.filtered), (1, 1));
    }

    #[tokio::test]
    async fn unparsable_reply_keeps_stale_entities() {
        let good = WorldModel::new(Arc::new(Canned(r#"[{"kind":"button","label":"OK"}]"#)));
        good.refresh(b"png", &[]).await.unwrap();
        let wm = WorldModel {
            oracle: Arc::new(Canned("I cannot see anything useful.")),
            entities: Mutex::new(good.entities()),
            stats: Mutex::new(None),
        };
        let err = wm.refresh(b"png", &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Perception(_)));
        assert_eq!(wm.entities()[0].label, "OK");
    }

    #[test]
    fn render_lists_state_and_value() {
        let mut e = entity("text_field", "Name");
        e.state = "focused".into();
        e.value = Some("Ada".into());
        let text = render_for_prompt(&[e]);
        assert_eq!(text, "1. [text_field] \"Name\" at (0, 0, 10x10) state=focused value=\"Ada\"");
        assert_eq!(render_for_prompt(&[]), "(no entities detected)");
    }
}
