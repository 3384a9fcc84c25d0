use crate::agent_engine::prompts;
use crate::llm::gateway::Oracle;
use crate::llm::parse::parse_score;
use crate::llm::types::ModelTier;

/// Second-opinion check on a proposed UI action. Below the threshold the
/// action is replaced by a clarification question to the user.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn passes(&self, score: f64) -> bool {
        score >= self.threshold
    }

    /// Score in `[0, 1]`. An oracle failure or an unreadable reply scores 0.
    pub async fn score(
        &self,
        oracle: &dyn Oracle,
        intention: &str,
        thought: &str,
        action: &str,
        entities: &str,
        image: &[u8],
    ) -> f64 {
        let prompt = prompts::confidence(intention, thought, action, entities);
        match oracle.call(&prompt, Some(image), ModelTier::Fast).await {
            Ok(reply) => parse_score(&reply).unwrap_or_else(|| {
                tracing::warn!(reply = %reply, "confidence reply unreadable, scoring 0");
                0.0
            }),
            Err(e) => {
                tracing::warn!(error = %e, "confidence call failed, scoring 0");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentResult;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl Oracle for Fixed {
        async fn call(&self, _p: &str, _i: Option<&[u8]>, _t: ModelTier) -> AgentResult<String> {
            Ok(self.0.into())
        }
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let gate = ConfidenceGate::new(0.85);
        let score = gate.score(&Fixed("0.85"), "i", "t", "a", "e", &[]).await;
        assert!(gate.passes(score));
        assert!(!gate.passes(0.849));
    }

    #[tokio::test]
    async fn garbage_scores_zero() {
        let gate = ConfidenceGate::new(0.5);
        assert_eq!(gate.score(&Fixed("no idea"), "i", "t", "a", "e", &[]).await, 0.0);
    }
}
