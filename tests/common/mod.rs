#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use deskpilot_lib::agent_engine::event_bus::EventBus;
use deskpilot_lib::agent_engine::prompts;
use deskpilot_lib::agent_engine::runtime::Runtime;
use deskpilot_lib::config::AppConfig;
use deskpilot_lib::errors::{AgentError, AgentResult};
use deskpilot_lib::executor::dispatcher::ToolRegistry;
use deskpilot_lib::executor::input::InputDevice;
use deskpilot_lib::human::HumanChannel;
use deskpilot_lib::knowledge::PlanMemory;
use deskpilot_lib::llm::gateway::Oracle;
use deskpilot_lib::llm::types::ModelTier;
use deskpilot_lib::perception::traits::{encode_png, ScreenCapture};
use deskpilot_lib::perception::types::Snapshot;

pub const SCREEN_W: u32 = 800;
pub const SCREEN_H: u32 = 600;

pub const ALL_HEADERS: [&str; 12] = [
    prompts::REACT_HEADER,
    prompts::CONFIDENCE_HEADER,
    prompts::ENTITY_HEADER,
    prompts::FOCUS_HEADER,
    prompts::DECOMPOSE_HEADER,
    prompts::SELECT_HEADER,
    prompts::CORRECT_HEADER,
    prompts::VERIFY_HEADER,
    prompts::MATCH_HEADER,
    prompts::SYNTHESIZE_HEADER,
    prompts::REASON_HEADER,
    prompts::FORESIGHT_HEADER,
];

#[derive(Default)]
struct Route {
    queue: VecDeque<String>,
    fallback: Option<String>,
}

/// Oracle that answers by prompt header: queued replies first, then the
/// route's standing reply. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedOracle {
    routes: Mutex<HashMap<&'static str, Route>>,
    prompts: Mutex<Vec<(&'static str, String)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standing reply for every call with this header.
    pub fn always(self, header: &'static str, reply: &str) -> Self {
        self.routes.lock().unwrap().entry(header).or_default().fallback = Some(reply.to_string());
        self
    }

    /// One-shot reply, used before the standing reply.
    pub fn then(self, header: &'static str, reply: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(header)
            .or_default()
            .queue
            .push_back(reply.to_string());
        self
    }

    pub fn calls(&self, header: &str) -> usize {
        self.prompts.lock().unwrap().iter().filter(|(h, _)| *h == header).count()
    }

    pub fn prompts_for(&self, header: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| *h == header)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn call(&self, prompt: &str, _image: Option<&[u8]>, _tier: ModelTier) -> AgentResult<String> {
        let header = ALL_HEADERS
            .into_iter()
            .find(|h| prompt.starts_with(h))
            .ok_or_else(|| AgentError::Oracle("unrecognised prompt".into()))?;
        self.prompts.lock().unwrap().push((header, prompt.to_string()));
        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .get_mut(header)
            .ok_or_else(|| AgentError::Oracle(format!("no script for {header}")))?;
        route
            .queue
            .pop_front()
            .or_else(|| route.fallback.clone())
            .ok_or_else(|| AgentError::Oracle(format!("script exhausted for {header}")))
    }
}

/// Blank screen that records which areas were captured.
#[derive(Default)]
pub struct FakeScreen {
    pub regions: Mutex<Vec<(i32, i32, u32, u32)>>,
    pub full_captures: Mutex<usize>,
}

impl FakeScreen {
    pub fn regions(&self) -> Vec<(i32, i32, u32, u32)> {
        self.regions.lock().unwrap().clone()
    }
}

fn blank(width: u32, height: u32) -> AgentResult<Snapshot> {
    encode_png(&image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height)))
}

#[async_trait]
impl ScreenCapture for FakeScreen {
    async fn capture_region(&self, x: i32, y: i32, width: u32, height: u32) -> AgentResult<Snapshot> {
        self.regions.lock().unwrap().push((x, y, width, height));
        blank(width, height)
    }

    async fn capture_full_screen(&self) -> AgentResult<Snapshot> {
        *self.full_captures.lock().unwrap() += 1;
        blank(SCREEN_W, SCREEN_H)
    }
}

#[derive(Default)]
pub struct RecordingInput {
    actions: Mutex<Vec<String>>,
}

impl RecordingInput {
    pub fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputDevice for RecordingInput {
    async fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.actions.lock().unwrap().push(format!("click {x},{y}"));
        Ok(())
    }
    async fn type_text(&self, text: &str) -> AgentResult<()> {
        self.actions.lock().unwrap().push(format!("type {text}"));
        Ok(())
    }
    async fn hotkey(&self, keys: &[String]) -> AgentResult<()> {
        self.actions.lock().unwrap().push(format!("hotkey {}", keys.join("+")));
        Ok(())
    }
    async fn move_to(&self, x: i32, y: i32) -> AgentResult<()> {
        self.actions.lock().unwrap().push(format!("move {x},{y}"));
        Ok(())
    }
}

/// Answers questions from a queue (then "ok") and approvals with a fixed verdict.
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<String>>,
    approve: bool,
    pub questions: Mutex<Vec<String>>,
    pub proposals: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new(approve: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            approve,
            questions: Mutex::new(Vec::new()),
            proposals: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(self, answer: &str) -> Self {
        self.answers.lock().unwrap().push_back(answer.to_string());
        self
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub fn proposals(&self) -> Vec<String> {
        self.proposals.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanChannel for ScriptedHuman {
    async fn ask(&self, question: &str) -> AgentResult<String> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ok".into()))
    }

    async fn confirm(&self, proposal: &str) -> AgentResult<bool> {
        self.proposals.lock().unwrap().push(proposal.to_string());
        Ok(self.approve)
    }
}

pub const NO_FOCUS: &str =
    r#"{"found_target_application": false, "bounding_box": {"x": 0, "y": 0, "width": 0, "height": 0}, "confidence": 0.0}"#;

pub fn entities_json(items: &[(&str, &str, i32, i32, i32, i32)]) -> String {
    let list: Vec<_> = items
        .iter()
        .map(|(kind, label, x, y, w, h)| {
            serde_json::json!({
                "kind": kind,
                "label": label,
                "bounding_box": {"x": x, "y": y, "width": w, "height": h},
                "state": "enabled",
            })
        })
        .collect();
    serde_json::Value::Array(list).to_string()
}

pub fn react_reply(thought: &str, tool: &str, params: serde_json::Value) -> String {
    serde_json::json!({"thought": thought, "action": {"tool": tool, "params": params}}).to_string()
}

pub fn finish() -> String {
    react_reply("the intention is done", "finish_intention", serde_json::json!({"summary": "done"}))
}

pub fn intentions(goals: &[&str]) -> String {
    let list: Vec<_> = goals
        .iter()
        .map(|g| serde_json::json!({"tactical_goal": g}))
        .collect();
    serde_json::json!({ "intentions": list }).to_string()
}

/// Everything a scenario needs, with plan memory and session logs in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub oracle: Arc<ScriptedOracle>,
    pub screen: Arc<FakeScreen>,
    pub input: Arc<RecordingInput>,
    pub human: Arc<ScriptedHuman>,
    pub rt: Runtime,
}

pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.memory.knowledge_path = Some(dir.path().join("knowledge_base.json"));
    cfg.memory.sessions_dir = Some(dir.path().join("sessions"));
    cfg.agent.max_steps_per_intention = 3;
    cfg.agent.verification_timeout_ms = 200;
    cfg.agent.poll_interval_ms = 40;
    cfg.agent.oracle_max_attempts = 1;
    cfg
}

impl Harness {
    pub fn new(oracle: ScriptedOracle, human: ScriptedHuman) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::with_config(dir, oracle, human, |_| {})
    }

    pub fn with_config(
        dir: TempDir,
        oracle: ScriptedOracle,
        human: ScriptedHuman,
        tweak: impl FnOnce(&mut AppConfig),
    ) -> Self {
        let mut cfg = test_config(&dir);
        tweak(&mut cfg);
        let memory = PlanMemory::open(cfg.memory.resolved_knowledge_path()).unwrap();
        let oracle = Arc::new(oracle);
        let screen = Arc::new(FakeScreen::default());
        let input = Arc::new(RecordingInput::default());
        let human = Arc::new(human);
        let rt = Runtime {
            oracle: oracle.clone(),
            capture: screen.clone(),
            input: input.clone(),
            human: human.clone(),
            tools: Arc::new(ToolRegistry::with_builtins()),
            memory: Arc::new(memory),
            events: EventBus::new(),
            config: cfg,
        };
        Self {
            dir,
            oracle,
            screen,
            input,
            human,
            rt,
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.rt.config.agent.verification_timeout_ms)
    }
}
