use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{AgentError, AgentResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ModelTier};

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    /// Kept for tier-to-model lookups.
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn with_config(llm_config: LlmConfig) -> Self {
        Self {
            providers: HashMap::new(),
            active: llm_config.active_provider.clone(),
            llm_config,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> AgentResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            AgentError::Config(format!("Active provider '{}' not found in registry", self.active))
        })
    }

    pub fn set_active(&mut self, name: String) -> AgentResult<()> {
        if self.providers.contains_key(&name) {
            self.active = name;
            Ok(())
        } else {
            Err(AgentError::Config(format!("Provider '{name}' not registered")))
        }
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Return the provider and call configuration for a model tier.
    ///
    /// Resolution order:
    /// 1. `[llm.tiers.<tier>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, non-streaming
    pub fn call_config_for_tier(&self, tier: ModelTier) -> AgentResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let tier_entry = match tier {
            ModelTier::Fast => self.llm_config.tiers.fast.as_ref(),
            ModelTier::Balanced => self.llm_config.tiers.balanced.as_ref(),
            ModelTier::Deep => self.llm_config.tiers.deep.as_ref(),
        };

        if let Some(entry) = tier_entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                AgentError::Config(format!(
                    "Tier '{}' references unknown provider '{}'",
                    tier, entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                tier = %tier,
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved tier config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                },
            ));
        }

        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            tier = %tier,
            provider = %self.active,
            model = %model,
            "tier not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
            },
        ))
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `DESKPILOT_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::with_config(config.llm.clone());
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider = OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key);
            registry.register(Arc::new(provider));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderEntry, TierEntry};
    use crate::llm::types::{ChatMessage, LlmResponse};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl LlmProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> AgentResult<LlmResponse> {
            Ok(LlmResponse::default())
        }
    }

    fn config() -> LlmConfig {
        let mut cfg = LlmConfig {
            active_provider: "a".into(),
            ..Default::default()
        };
        cfg.providers.insert(
            "a".into(),
            ProviderEntry {
                display_name: "A".into(),
                api_base: "http://a".into(),
                model: "a-default".into(),
                temperature: 0.2,
                api_key: None,
            },
        );
        cfg.tiers.deep = Some(TierEntry {
            provider: "b".into(),
            model: "b-large".into(),
            stream: true,
            temperature: None,
        });
        cfg
    }

    #[test]
    fn unconfigured_tier_falls_back_to_active_provider() {
        let mut reg = ProviderRegistry::with_config(config());
        reg.register(Arc::new(Named("a")));
        let (provider, cfg) = reg.call_config_for_tier(ModelTier::Fast).unwrap();
        assert_eq!(provider.name(), "a");
        assert_eq!(cfg.model, "a-default");
        assert_eq!(cfg.temperature, 0.2);
        assert!(!cfg.stream);
    }

    #[test]
    fn tier_with_unknown_provider_is_a_config_error() {
        let mut reg = ProviderRegistry::with_config(config());
        reg.register(Arc::new(Named("a")));
        let err = reg.call_config_for_tier(ModelTier::Deep).err().unwrap();
        assert!(matches!(err, AgentError::Config(_)));

        reg.register(Arc::new(Named("b")));
        let (provider, cfg) = reg.call_config_for_tier(ModelTier::Deep).unwrap();
        assert_eq!(provider.name(), "b");
        assert_eq!(cfg.model, "b-large");
        assert!(cfg.stream);
    }
}
