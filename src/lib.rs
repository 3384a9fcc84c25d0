pub mod agent_engine;
pub mod commands;
pub mod config;
pub mod errors;
pub mod executor;
pub mod human;
pub mod knowledge;
pub mod llm;
pub mod perception;
pub mod skills;

use std::path::PathBuf;

pub use commands::{build_runtime, AgentService, GoalHandle};
pub use errors::{AgentError, AgentResult};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Per-user application data directory, e.g. `~/.local/share/deskpilot` on
/// Linux, falling back to the current working directory.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("deskpilot"))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
