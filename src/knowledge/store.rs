use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use regex::RegexBuilder;

use crate::errors::{AgentError, AgentResult};
use crate::executor::tool::SynthesizedTool;
use crate::knowledge::document::{KnowledgeDocument, Objective, StepSpec, Strategy};

/// Durable plan memory.
///
/// All mutations go through one writer lock, are flushed to disk before they
/// become visible, and then replace the shared snapshot readers clone from.
pub struct PlanMemory {
    path: PathBuf,
    writer: Mutex<()>,
    snapshot: RwLock<Arc<KnowledgeDocument>>,
}

impl PlanMemory {
    /// Load the document at `path`. A missing file is an empty document; a
    /// file that exists but does not parse is an error.
    pub fn open(path: impl Into<PathBuf>) -> AgentResult<Self> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => KnowledgeDocument::default(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| AgentError::Store(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no knowledge file yet, starting empty");
                KnowledgeDocument::default()
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(
            path = %path.display(),
            objectives = doc.objectives.len(),
            ignore = doc.perceptual_filters.ignore_list.len(),
            "plan memory loaded"
        );
        Ok(Self {
            path,
            writer: Mutex::new(()),
            snapshot: RwLock::new(Arc::new(doc)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<KnowledgeDocument> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    // ── objectives ──────────────────────────────────────────────────────────

    pub fn objectives(&self) -> Vec<Objective> {
        self.snapshot().objectives.clone()
    }

    pub fn get_objective(&self, name: &str) -> Option<Objective> {
        self.snapshot()
            .objectives
            .iter()
            .find(|o| o.objective_name == name)
            .cloned()
    }

    /// Case-insensitive match of `goal` against objective names and goal prompts.
    pub fn match_exact(&self, goal: &str) -> Option<Objective> {
        let goal = goal.trim();
        self.snapshot()
            .objectives
            .iter()
            .find(|o| o.objective_name.eq_ignore_ascii_case(goal) || o.goal_prompt.eq_ignore_ascii_case(goal))
            .cloned()
    }

    pub fn ensure_objective(&self, name: &str, goal_prompt: &str) -> AgentResult<Objective> {
        self.mutate(|doc| {
            if let Some(existing) = doc.objectives.iter().find(|o| o.objective_name == name) {
                return Ok((existing.clone(), false));
            }
            let objective = Objective {
                objective_name: name.to_string(),
                goal_prompt: goal_prompt.to_string(),
                strategies: Vec::new(),
            };
            doc.objectives.push(objective.clone());
            tracing::info!(objective = %name, "objective created");
            Ok((objective, true))
        })
    }

    // ── strategies ──────────────────────────────────────────────────────────

    /// Append `strategy` to `objective` unless one with the same step sequence
    /// exists. Returns the stored strategy's name. Name clashes get a suffix.
    pub fn save_strategy(&self, objective: &str, strategy: Strategy) -> AgentResult<String> {
        if strategy.steps.is_empty() {
            return Err(AgentError::Store("a strategy needs at least one step".into()));
        }
        self.mutate(|doc| {
            let obj = find_objective_mut(doc, objective)?;
            if let Some(existing) = obj.strategies.iter().find(|s| s.same_steps(&strategy.steps)) {
                tracing::debug!(
                    objective = %objective,
                    strategy = %existing.strategy_name,
                    "identical strategy already stored"
                );
                return Ok((existing.strategy_name.clone(), false));
            }
            let mut strategy = strategy;
            strategy.strategy_name = unique_name(obj, &strategy.strategy_name);
            let name = strategy.strategy_name.clone();
            obj.strategies.push(strategy);
            tracing::info!(objective = %objective, strategy = %name, "strategy appended");
            Ok((name, true))
        })
    }

    /// Fold one execution outcome into the strategy's success rate:
    /// `rate = (1 - weight) * rate + weight * outcome`.
    pub fn record_outcome(&self, objective: &str, strategy: &str, success: bool, weight: f64) -> AgentResult<f64> {
        let weight = weight.clamp(0.0, 1.0);
        self.mutate(|doc| {
            let obj = find_objective_mut(doc, objective)?;
            let s = obj
                .strategies
                .iter_mut()
                .find(|s| s.strategy_name == strategy)
                .ok_or_else(|| AgentError::Store(format!("unknown strategy '{strategy}' in '{objective}'")))?;
            let observed = if success { 1.0 } else { 0.0 };
            s.success_rate = ((1.0 - weight) * s.success_rate + weight * observed).clamp(0.0, 1.0);
            s.last_used = Some(Utc::now());
            tracing::info!(
                objective = %objective,
                strategy = %strategy,
                success,
                rate = s.success_rate,
                "strategy outcome recorded"
            );
            Ok((s.success_rate, true))
        })
    }

    /// Explicit user deletion; the only way a strategy list shrinks.
    pub fn delete_strategy(&self, objective: &str, strategy: &str) -> AgentResult<bool> {
        self.mutate(|doc| {
            let obj = find_objective_mut(doc, objective)?;
            let before = obj.strategies.len();
            obj.strategies.retain(|s| s.strategy_name != strategy);
            let removed = obj.strategies.len() != before;
            Ok((removed, removed))
        })
    }

    // ── perceptual filters ──────────────────────────────────────────────────

    pub fn get_ignore_list(&self) -> Vec<String> {
        self.snapshot().perceptual_filters.ignore_list.clone()
    }

    /// Returns whether the entry was new. Adding an existing entry is a no-op.
    pub fn add_to_ignore_list(&self, description: &str) -> AgentResult<bool> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AgentError::Store("ignore-list entry is empty".into()));
        }
        self.mutate(|doc| {
            let list = &mut doc.perceptual_filters.ignore_list;
            if list.iter().any(|d| d == description) {
                return Ok((false, false));
            }
            list.push(description.to_string());
            tracing::info!(entry = %description, "added to ignore list");
            Ok((true, true))
        })
    }

    pub fn remove_from_ignore_list(&self, description: &str) -> AgentResult<bool> {
        let description = description.trim();
        self.mutate(|doc| {
            let list = &mut doc.perceptual_filters.ignore_list;
            let before = list.len();
            list.retain(|d| d != description);
            let removed = list.len() != before;
            Ok((removed, removed))
        })
    }

    // ── aliases ─────────────────────────────────────────────────────────────

    pub fn set_alias(&self, alias: &str, replacement: &str) -> AgentResult<()> {
        let alias = alias.trim();
        if alias.is_empty() {
            return Err(AgentError::Store("alias is empty".into()));
        }
        self.mutate(|doc| {
            let changed = doc.aliases.get(alias).map(String::as_str) != Some(replacement);
            doc.aliases.insert(alias.to_string(), replacement.to_string());
            Ok(((), changed))
        })
    }

    /// Replace whole-word, case-insensitive alias occurrences in `goal`,
    /// longest alias first.
    pub fn resolve_aliases(&self, goal: &str) -> String {
        let doc = self.snapshot();
        let mut aliases: Vec<(&String, &String)> = doc.aliases.iter().collect();
        aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));

        let mut resolved = goal.to_string();
        for (alias, replacement) in aliases {
            let pattern = format!(r"\b{}\b", regex::escape(alias));
            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(re) => resolved = re.replace_all(&resolved, regex::NoExpand(replacement)).into_owned(),
                Err(e) => tracing::warn!(alias = %alias, error = %e, "alias pattern rejected"),
            }
        }
        if resolved != goal {
            tracing::debug!(from = %goal, to = %resolved, "aliases resolved");
        }
        resolved
    }

    // ── synthesized tools ───────────────────────────────────────────────────

    pub fn synthesized_tools(&self) -> Vec<SynthesizedTool> {
        self.snapshot().synthesized_tools.clone()
    }

    pub fn save_synthesized_tool(&self, tool: SynthesizedTool) -> AgentResult<()> {
        self.mutate(|doc| {
            doc.synthesized_tools.retain(|t| t.spec.name != tool.spec.name);
            doc.synthesized_tools.push(tool);
            Ok(((), true))
        })
    }

    // ── persistence ─────────────────────────────────────────────────────────

    /// Apply `f` to a copy of the current document. When it reports a change
    /// the copy is flushed and published; on any error nothing changes.
    fn mutate<R>(&self, f: impl FnOnce(&mut KnowledgeDocument) -> AgentResult<(R, bool)>) -> AgentResult<R> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = (*self.snapshot()).clone();
        let (result, changed) = f(&mut doc)?;
        if changed {
            write_atomically(&self.path, &doc)?;
            *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(doc);
        }
        Ok(result)
    }
}

fn find_objective_mut<'a>(doc: &'a mut KnowledgeDocument, name: &str) -> AgentResult<&'a mut Objective> {
    doc.objectives
        .iter_mut()
        .find(|o| o.objective_name == name)
        .ok_or_else(|| AgentError::Store(format!("unknown objective '{name}'")))
}

fn unique_name(obj: &Objective, wanted: &str) -> String {
    let base = if wanted.trim().is_empty() {
        "Strategy".to_string()
    } else {
        wanted.trim().to_string()
    };
    if obj.strategy(&base).is_none() && !wanted.trim().is_empty() {
        return base;
    }
    (obj.strategies.len() + 1..)
        .map(|n| format!("{base} {n}"))
        .find(|candidate| obj.strategy(candidate).is_none())
        .unwrap_or(base)
}

/// Sibling temp file, fsync, rename.
fn write_atomically(path: &Path, doc: &KnowledgeDocument) -> AgentResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), bytes = json.len(), "knowledge flushed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(name: &str, goals: &[&str]) -> Strategy {
        Strategy {
            strategy_name: name.into(),
            steps: goals.iter().map(|g| StepSpec::new(*g)).collect(),
            success_rate: 0.9,
            last_used: None,
        }
    }

    fn memory() -> (tempfile::TempDir, PlanMemory) {
        let dir = tempfile::tempdir().unwrap();
        let mem = PlanMemory::open(dir.path().join("knowledge_base.json")).unwrap();
        (dir, mem)
    }

    #[test]
    fn saved_strategy_survives_reload() {
        let (dir, mem) = memory();
        mem.ensure_objective("Objective: send report", "send report").unwrap();
        let name = mem
            .save_strategy("Objective: send report", strategy("Strategy", &["open mail", "attach file"]))
            .unwrap();

        let reloaded = PlanMemory::open(dir.path().join("knowledge_base.json")).unwrap();
        let obj = reloaded.get_objective("Objective: send report").unwrap();
        let s = obj.strategy(&name).unwrap();
        assert_eq!(s.steps, vec![StepSpec::new("open mail"), StepSpec::new("attach file")]);
        assert_eq!(s.success_rate, 0.9);
    }

    #[test]
    fn strategies_append_and_dedupe() {
        let (_dir, mem) = memory();
        mem.ensure_objective("o", "goal").unwrap();
        let a = mem.save_strategy("o", strategy("Strategy", &["a", "b"])).unwrap();
        let b = mem.save_strategy("o", strategy("Strategy", &["a", "c"])).unwrap();
        let again = mem.save_strategy("o", strategy("Other", &["a", "b"])).unwrap();
        assert_ne!(a, b);
        assert_eq!(again, a);
        assert_eq!(mem.get_objective("o").unwrap().strategies.len(), 2);
    }

    #[test]
    fn outcome_is_a_moving_average() {
        let (_dir, mem) = memory();
        mem.ensure_objective("o", "goal").unwrap();
        let name = mem.save_strategy("o", strategy("s", &["a"])).unwrap();
        let rate = mem.record_outcome("o", &name, false, 0.25).unwrap();
        assert!((rate - 0.675).abs() < 1e-9);
        let rate = mem.record_outcome("o", &name, true, 0.25).unwrap();
        assert!((rate - 0.75625).abs() < 1e-9);
        assert!(mem.get_objective("o").unwrap().strategies[0].last_used.is_some());
    }

    #[test]
    fn ignore_list_add_is_idempotent() {
        let (_dir, mem) = memory();
        assert!(mem.add_to_ignore_list("clock widget").unwrap());
        assert!(!mem.add_to_ignore_list(" clock widget ").unwrap());
        assert_eq!(mem.get_ignore_list(), vec!["clock widget"]);
        assert!(mem.remove_from_ignore_list("clock widget").unwrap());
        assert!(!mem.remove_from_ignore_list("clock widget").unwrap());
        assert!(mem.add_to_ignore_list("  ").is_err());
    }

    #[test]
    fn aliases_replace_whole_words() {
        let (_dir, mem) = memory();
        mem.set_alias("my boss", "Dana Whitfield").unwrap();
        mem.set_alias("boss", "manager").unwrap();
        assert_eq!(mem.resolve_aliases("Email My Boss the report"), "Email Dana Whitfield the report");
        assert_eq!(mem.resolve_aliases("bossy tone"), "bossy tone");
    }

    #[test]
    fn unknown_keys_and_user_data_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"{"user_data": {"name": "Ada"}, "aliases": {"home": "Desktop"},
                "calibration": {"scale": 1.25}, "schema_version": 3}"#,
        )
        .unwrap();
        let mem = PlanMemory::open(&path).unwrap();
        mem.add_to_ignore_list("taskbar").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["user_data"]["name"], "Ada");
        assert_eq!(v["aliases"]["home"], "Desktop");
        assert_eq!(v["calibration"]["scale"], 1.25);
        assert_eq!(v["schema_version"], 3);
        assert_eq!(v["perceptual_filters"]["ignore_list"][0], "taskbar");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(PlanMemory::open(&path), Err(AgentError::Store(_))));
    }

    #[test]
    fn delete_is_explicit_and_reported() {
        let (_dir, mem) = memory();
        mem.ensure_objective("o", "goal").unwrap();
        let name = mem.save_strategy("o", strategy("s", &["a"])).unwrap();
        assert!(!mem.delete_strategy("o", "nope").unwrap());
        assert!(mem.delete_strategy("o", &name).unwrap());
        assert!(mem.get_objective("o").unwrap().strategies.is_empty());
    }
}
