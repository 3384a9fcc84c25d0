use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AgentResult;

/// One line of the session audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub role: String,
    pub content: Option<String>,
    pub action: Option<serde_json::Value>,
}

impl HistoryEntry {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            role: role.to_string(),
            content: Some(content.into()),
            action: None,
        }
    }

    pub fn with_action(mut self, action: serde_json::Value) -> Self {
        self.action = Some(action);
        self
    }
}

/// Append-only JSONL log of one task.
pub struct SessionHistory {
    pub session_id: String,
    entries: Vec<HistoryEntry>,
    file_path: Option<PathBuf>,
}

impl SessionHistory {
    /// Log into `dir`, falling back to memory only if it cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            tracing::warn!(error = %e, "session directory unavailable, history stays in memory");
            return Self::in_memory();
        }
        Self::in_dir(dir)
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = dir.into().join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            entries: Vec::new(),
            file_path: Some(file_path),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            entries: Vec::new(),
            file_path: None,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record `entry` and append it to the log file. Write failures are logged,
    /// never fatal to the task.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "history entry not persisted");
        }
    }

    /// Append the latest entry to the JSONL file.
    pub fn flush(&self) -> AgentResult<()> {
        let (Some(path), Some(last)) = (&self.file_path, self.entries.last()) else {
            return Ok(());
        };
        let line = serde_json::to_string(last)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(path = %path.display(), "history entry flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SessionHistory::open(dir.path());
        history.record(HistoryEntry::new("user", "open the mail client"));
        history.record(
            HistoryEntry::new("agent", "clicking Compose")
                .with_action(serde_json::json!({"tool": "click", "params": {"target": "Compose"}})),
        );
        let path = dir.path().join(format!("session_{}.jsonl", history.session_id));
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: HistoryEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action.unwrap()["tool"], "click");
    }
}
