use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::errors::{AgentError, AgentResult};
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{ChatMessage, LlmResponse, ModelTier};

/// Call boundary to the multimodal inference service.
///
/// The returned text is untrusted; callers parse it with [`crate::llm::parse`]
/// and handle failure explicitly.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn call(&self, prompt: &str, image: Option<&[u8]>, tier: ModelTier) -> AgentResult<String>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self {
            max_attempts: cfg.oracle_max_attempts.max(1),
            backoff: Duration::from_millis(cfg.oracle_backoff_ms),
        }
    }
}

const SYSTEM_PROMPT: &str = "\
You are the perception and reasoning service of a desktop automation agent. \
Follow the requested output format exactly and never add commentary outside it.";

/// Provider-backed [`Oracle`] with tier selection, retries and shape coercion.
pub struct OracleGateway {
    registry: Arc<Mutex<ProviderRegistry>>,
    retry: RetryPolicy,
}

impl OracleGateway {
    pub fn new(registry: Arc<Mutex<ProviderRegistry>>, retry: RetryPolicy) -> Self {
        Self { registry, retry }
    }
}

#[async_trait]
impl Oracle for OracleGateway {
    async fn call(&self, prompt: &str, image: Option<&[u8]>, tier: ModelTier) -> AgentResult<String> {
        let (provider, cfg) = {
            let reg = self.registry.lock().await;
            reg.call_config_for_tier(tier)?
        };

        let image_url = image.map(|bytes| {
            format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(bytes)
            )
        });
        let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt, image_url)];

        let mut delay = self.retry.backoff;
        let mut attempt = 1;
        loop {
            let started = std::time::Instant::now();
            let result = provider
                .chat(messages.clone(), &cfg)
                .await
                .and_then(coerce_response);
            match result {
                Ok(text) => {
                    tracing::debug!(
                        tier = %tier,
                        attempt,
                        latency_ms = started.elapsed().as_millis() as u64,
                        chars = text.len(),
                        "oracle replied"
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(tier = %tier, attempt, error = %e, "oracle call failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(tier = %tier, attempt, error = %e, "oracle call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Per-task view of an [`Oracle`]: every call, retries and backoff included,
/// ends with `Aborted` as soon as the task is cancelled.
pub struct CancellableOracle {
    inner: Arc<dyn Oracle>,
    cancel: CancellationToken,
}

impl CancellableOracle {
    pub fn new(inner: Arc<dyn Oracle>, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }
}

#[async_trait]
impl Oracle for CancellableOracle {
    async fn call(&self, prompt: &str, image: Option<&[u8]>, tier: ModelTier) -> AgentResult<String> {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                tracing::debug!(tier = %tier, "oracle call abandoned, task cancelled");
                Err(AgentError::Aborted)
            }
            reply = self.inner.call(prompt, image, tier) => reply,
        }
    }
}

/// Collapse a provider response into plain text. Models that answer through a
/// function call instead of content get their call arguments returned verbatim.
fn coerce_response(resp: LlmResponse) -> AgentResult<String> {
    let content = resp.content.trim();
    if !content.is_empty() {
        return Ok(content.to_string());
    }
    if let Some(tc) = resp.tool_calls.first() {
        return Ok(serde_json::json!({
            "tool": tc.function.name,
            "args": serde_json::from_str::<serde_json::Value>(&tc.function.arguments)
                .unwrap_or(serde_json::Value::Null),
        })
        .to_string());
    }
    Err(AgentError::Oracle("empty response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::LlmProvider;
    use crate::llm::types::{CallConfig, FunctionCall, ToolCall};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> AgentResult<LlmResponse> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AgentError::Oracle("503 Service Unavailable".into()));
            }
            Ok(LlmResponse {
                content: "  0.9 ".into(),
                ..Default::default()
            })
        }
    }

    fn gateway(failures: u32, attempts: u32) -> OracleGateway {
        let mut reg = ProviderRegistry::new("flaky".into());
        reg.register(Arc::new(Flaky {
            failures_left: AtomicU32::new(failures),
        }));
        OracleGateway::new(
            Arc::new(Mutex::new(reg)),
            RetryPolicy {
                max_attempts: attempts,
                backoff: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let text = gateway(2, 3).call("score", None, ModelTier::Fast).await.unwrap();
        assert_eq!(text, "0.9");
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let err = gateway(5, 2).call("score", None, ModelTier::Fast).await.unwrap_err();
        assert!(matches!(err, AgentError::Oracle(_)));
    }

    #[tokio::test]
    async fn cancellation_cuts_the_backoff_short() {
        let mut reg = ProviderRegistry::new("flaky".into());
        reg.register(Arc::new(Flaky {
            failures_left: AtomicU32::new(10),
        }));
        let slow = OracleGateway::new(
            Arc::new(Mutex::new(reg)),
            RetryPolicy {
                max_attempts: 5,
                backoff: Duration::from_secs(30),
            },
        );
        let cancel = CancellationToken::new();
        let oracle = CancellableOracle::new(Arc::new(slow), cancel.clone());
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), oracle.call("score", None, ModelTier::Fast))
            .await
            .expect("cancelled call should return promptly");
        assert!(matches!(result, Err(AgentError::Aborted)));
        stopper.await.unwrap();
    }

    #[test]
    fn tool_call_only_reply_is_coerced_to_json_text() {
        let resp = LlmResponse {
            content: String::new(),
            reasoning: String::new(),
            tool_calls: vec![ToolCall {
                id: "1".into(),
                call_type: "function".into(),
                function: FunctionCall {
                    name: "click".into(),
                    arguments: r#"{"target":"OK"}"#.into(),
                },
            }],
        };
        let text = coerce_response(resp).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["tool"], "click");
        assert_eq!(v["args"]["target"], "OK");
    }
}
