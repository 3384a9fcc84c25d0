// Input device boundary. All coordinates are absolute screen pixels.
use async_trait::async_trait;

use crate::errors::AgentResult;

#[async_trait]
pub trait InputDevice: Send + Sync {
    async fn click(&self, x: i32, y: i32) -> AgentResult<()>;
    async fn type_text(&self, text: &str) -> AgentResult<()>;
    async fn hotkey(&self, keys: &[String]) -> AgentResult<()>;
    async fn move_to(&self, x: i32, y: i32) -> AgentResult<()>;
}

/// Logs every action instead of emitting it.
#[derive(Debug, Default)]
pub struct DryRunInput;

#[async_trait]
impl InputDevice for DryRunInput {
    async fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        tracing::info!(x, y, "dry-run click");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> AgentResult<()> {
        tracing::info!(chars = text.chars().count(), "dry-run type_text");
        Ok(())
    }

    async fn hotkey(&self, keys: &[String]) -> AgentResult<()> {
        tracing::info!(keys = %keys.join("+"), "dry-run hotkey");
        Ok(())
    }

    async fn move_to(&self, x: i32, y: i32) -> AgentResult<()> {
        tracing::info!(x, y, "dry-run move");
        Ok(())
    }
}

/// Split "ctrl+shift+s" into its keys.
pub fn parse_hotkey(keys: &str) -> Vec<String> {
    keys.split('+')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotkey_parsing() {
        assert_eq!(parse_hotkey("Ctrl + Shift+S"), vec!["ctrl", "shift", "s"]);
        assert!(parse_hotkey(" + ").is_empty());
    }
}
