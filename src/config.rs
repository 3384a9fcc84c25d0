use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AgentError, AgentResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Tier-to-model mapping. If a tier is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub tiers: TiersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used when no tier entry exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var DESKPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps oracle model tiers to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TiersConfig {
    /// Cheap, low-latency calls: confidence scoring, verification, focus detection.
    pub fast: Option<TierEntry>,
    /// Per-step reasoning in the tactical loop.
    pub balanced: Option<TierEntry>,
    /// Decomposition, self-correction and tool synthesis.
    pub deep: Option<TierEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this tier.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps_per_intention: u32,
    #[serde(default = "default_verify_timeout_ms")]
    pub verification_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_oracle_attempts")]
    pub oracle_max_attempts: u32,
    #[serde(default = "default_oracle_backoff_ms")]
    pub oracle_backoff_ms: u64,
    /// Score freshly decomposed plans for risk before running them.
    #[serde(default)]
    pub plan_review: bool,
    /// Below this risk-review score the user must confirm the plan.
    #[serde(default = "default_plan_review_threshold")]
    pub plan_review_threshold: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_steps_per_intention: default_max_steps(),
            verification_timeout_ms: default_verify_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            oracle_max_attempts: default_oracle_attempts(),
            oracle_backoff_ms: default_oracle_backoff_ms(),
            plan_review: false,
            plan_review_threshold: default_plan_review_threshold(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.85
}

fn default_max_steps() -> u32 {
    15
}

fn default_verify_timeout_ms() -> u64 {
    7000
}

fn default_poll_interval_ms() -> u64 {
    750
}

fn default_oracle_attempts() -> u32 {
    3
}

fn default_oracle_backoff_ms() -> u64 {
    500
}

fn default_plan_review_threshold() -> f64 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_focus_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_min_window")]
    pub min_width: u32,
    #[serde(default = "default_min_window")]
    pub min_height: u32,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence_threshold: default_focus_threshold(),
            min_width: default_min_window(),
            min_height: default_min_window(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_focus_threshold() -> f64 {
    0.6
}

fn default_min_window() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Knowledge document location. Defaults to `<data dir>/deskpilot/knowledge_base.json`.
    #[serde(default)]
    pub knowledge_path: Option<PathBuf>,
    /// Weight of the latest outcome in the success-rate moving average.
    #[serde(default = "default_ema_weight")]
    pub success_rate_weight: f64,
    #[serde(default = "default_new_strategy_rate")]
    pub new_strategy_success_rate: f64,
    /// Session audit logs. Defaults to `<data dir>/deskpilot/sessions`.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            knowledge_path: None,
            success_rate_weight: default_ema_weight(),
            new_strategy_success_rate: default_new_strategy_rate(),
            sessions_dir: None,
        }
    }
}

fn default_ema_weight() -> f64 {
    0.25
}

fn default_new_strategy_rate() -> f64 {
    0.9
}

impl MemoryConfig {
    pub fn resolved_knowledge_path(&self) -> PathBuf {
        if let Some(path) = &self.knowledge_path {
            return path.clone();
        }
        crate::data_dir().join("knowledge_base.json")
    }

    pub fn resolved_sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| crate::data_dir().join("sessions"))
    }
}

fn resolve_config_path() -> AgentResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(AgentError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> AgentResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Like [`load_config`] but degrades to built-in defaults when no file is present.
pub fn load_config_or_default() -> AppConfig {
    match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "using default configuration");
            AppConfig::default()
        }
    }
}

pub fn parse_config(content: &str) -> AgentResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !(0.0..=1.0).contains(&config.agent.confidence_threshold) {
        return Err(AgentError::Config(format!(
            "agent.confidence_threshold must be within [0, 1], got {}",
            config.agent.confidence_threshold
        )));
    }
    if config.agent.max_steps_per_intention == 0 {
        return Err(AgentError::Config("agent.max_steps_per_intention must be positive".into()));
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> AgentResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.agent.confidence_threshold, 0.85);
        assert_eq!(cfg.agent.max_steps_per_intention, 15);
        assert_eq!(cfg.focus.confidence_threshold, 0.6);
        assert_eq!(cfg.focus.min_width, 100);
        assert!(cfg.llm.providers.is_empty());
    }

    #[test]
    fn tiers_and_overrides_parse() {
        let cfg = parse_config(
            r#"
            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "Local"
            api_base = "http://localhost:8080/v1/chat/completions"
            model = "vision-small"

            [llm.tiers.deep]
            provider = "local"
            model = "vision-large"
            temperature = 0.3

            [agent]
            confidence_threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.confidence_threshold, 0.7);
        let deep = cfg.llm.tiers.deep.unwrap();
        assert_eq!(deep.model, "vision-large");
        assert!(!deep.stream);
        assert_eq!(cfg.llm.providers["local"].temperature, 0.1);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = parse_config("[agent]\nconfidence_threshold = 1.5\n").unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}
