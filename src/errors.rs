use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Last known position of a task when it was surfaced to the user as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDiagnostics {
    pub intention: String,
    pub thought: Option<String>,
    pub action: Option<String>,
}

impl std::fmt::Display for FailureDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "intention '{}'", self.intention)?;
        if let Some(thought) = &self.thought {
            write!(f, ", last thought '{thought}'")?;
        }
        if let Some(action) = &self.action {
            write!(f, ", last action '{action}'")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Tool invocation error: {0}")]
    ToolInvocation(String),

    #[error("Planning failure: {reason}")]
    PlanningFailure {
        reason: String,
        diagnostics: Option<FailureDiagnostics>,
    },

    #[error("Plan memory error: {0}")]
    Store(String),

    #[error("Tool synthesis error: {0}")]
    Synthesis(String),

    #[error("Human channel error: {0}")]
    Human(String),

    #[error("Another goal is already running")]
    Busy,

    #[error("Goal task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Task aborted")]
    Aborted,
}

impl AgentError {
    pub fn planning(reason: impl Into<String>) -> Self {
        Self::PlanningFailure {
            reason: reason.into(),
            diagnostics: None,
        }
    }

    /// Errors that are worth another attempt against the oracle backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Oracle(_) | Self::Http(_) | Self::SseParsing(_))
    }
}

impl serde::Serialize for AgentError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_render_known_fields_only() {
        let d = FailureDiagnostics {
            intention: "open the File menu".into(),
            thought: Some("menu is hidden".into()),
            action: None,
        };
        assert_eq!(d.to_string(), "intention 'open the File menu', last thought 'menu is hidden'");
    }

    #[test]
    fn aborted_is_not_transient() {
        assert!(!AgentError::Aborted.is_transient());
        assert!(AgentError::Oracle("503".into()).is_transient());
    }
}
