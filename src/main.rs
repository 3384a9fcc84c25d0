use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use deskpilot_lib::agent_engine::event_bus::StatusEvent;
use deskpilot_lib::config;
use deskpilot_lib::executor::input::DryRunInput;
use deskpilot_lib::human::ConsoleHuman;
use deskpilot_lib::knowledge::PlanMemory;
use deskpilot_lib::llm::registry::ProviderRegistry;
use deskpilot_lib::perception::traits::StaticImageCapture;
use deskpilot_lib::{build_runtime, AgentResult, AgentService};

#[derive(Parser)]
#[command(name = "deskpilot", version, about = "Desktop automation agent driven by a multimodal model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a goal against a screenshot; input actions are logged, not performed.
    Run {
        goal: String,
        #[arg(long)]
        screenshot: PathBuf,
    },
    /// List known objectives and their strategies.
    Objectives,
    /// Manage the perceptual ignore list.
    Ignore {
        #[command(subcommand)]
        action: IgnoreAction,
    },
    /// Manage goal aliases.
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },
    /// Manage stored strategies.
    Strategy {
        #[command(subcommand)]
        action: StrategyAction,
    },
    /// Inspect or switch the configured oracle provider.
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },
}

#[derive(Subcommand)]
enum IgnoreAction {
    Add { description: String },
    Remove { description: String },
    List,
}

#[derive(Subcommand)]
enum AliasAction {
    Set { alias: String, replacement: String },
}

#[derive(Subcommand)]
enum StrategyAction {
    Delete { objective: String, strategy: String },
}

#[derive(Subcommand)]
enum ProviderAction {
    List,
    /// Make `name` the active provider and write it back to config.toml.
    Use { name: String },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    deskpilot_lib::init_tracing();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli.command).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Command) -> AgentResult<()> {
    let cfg = config::load_config_or_default();
    match command {
        Command::Run { goal, screenshot } => run_goal(cfg, &goal, &screenshot).await,
        Command::Objectives => {
            let memory = PlanMemory::open(cfg.memory.resolved_knowledge_path())?;
            for objective in memory.objectives() {
                println!("{}  ({})", objective.objective_name, objective.goal_prompt);
                for s in &objective.strategies {
                    let used = s
                        .last_used
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".into());
                    println!("  - {}  rate {:.2}, last used {used}", s.strategy_name, s.success_rate);
                    for step in &s.steps {
                        println!("      * {}", step.tactical_goal);
                    }
                }
            }
            Ok(())
        }
        Command::Ignore { action } => {
            let memory = PlanMemory::open(cfg.memory.resolved_knowledge_path())?;
            match action {
                IgnoreAction::Add { description } => {
                    if !memory.add_to_ignore_list(&description)? {
                        println!("already ignored");
                    }
                }
                IgnoreAction::Remove { description } => {
                    if !memory.remove_from_ignore_list(&description)? {
                        println!("not in the ignore list");
                    }
                }
                IgnoreAction::List => {
                    for entry in memory.get_ignore_list() {
                        println!("{entry}");
                    }
                }
            }
            Ok(())
        }
        Command::Alias {
            action: AliasAction::Set { alias, replacement },
        } => {
            let memory = PlanMemory::open(cfg.memory.resolved_knowledge_path())?;
            memory.set_alias(&alias, &replacement)
        }
        Command::Strategy {
            action: StrategyAction::Delete { objective, strategy },
        } => {
            let memory = PlanMemory::open(cfg.memory.resolved_knowledge_path())?;
            if !memory.delete_strategy(&objective, &strategy)? {
                println!("no strategy '{strategy}' under '{objective}'");
            }
            Ok(())
        }
        Command::Provider { action } => {
            let mut registry = ProviderRegistry::from_config(&cfg);
            match action {
                ProviderAction::List => {
                    let mut names = registry.list_names();
                    names.sort();
                    for name in names {
                        let marker = if name == cfg.llm.active_provider { "*" } else { " " };
                        println!("{marker} {name}");
                    }
                    Ok(())
                }
                ProviderAction::Use { name } => {
                    registry.set_active(name.clone())?;
                    let mut cfg = cfg;
                    cfg.llm.active_provider = name;
                    config::save_config(&cfg)
                }
            }
        }
    }
}

async fn run_goal(cfg: config::AppConfig, goal: &str, screenshot: &std::path::Path) -> AgentResult<()> {
    let capture = Arc::new(StaticImageCapture::from_path(screenshot)?);
    let human = Arc::new(ConsoleHuman::new(CancellationToken::new()));
    let rt = build_runtime(cfg, capture, Arc::new(DryRunInput), human)?;
    let service = AgentService::new(rt);

    let mut events = service.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                StatusEvent::PlanReady { objective, intentions, .. } => {
                    println!("plan for {objective}:");
                    for (i, text) in intentions.iter().enumerate() {
                        println!("  {}. {text}", i + 1);
                    }
                }
                StatusEvent::Step { step, action, observation, .. } => {
                    println!("  [{step}] {action} -> {observation}");
                }
                StatusEvent::Replanning { failed_intention } => {
                    println!("re-planning after: {failed_intention}");
                }
                _ => {}
            }
        }
    });

    let handle = service.start_goal(goal)?;
    let report = tokio::select! {
        result = handle.wait() => result?,
        _ = tokio::signal::ctrl_c() => {
            service.stop();
            println!("stopping...");
            return Ok(());
        }
    };
    println!(
        "finished: {} (strategy {})",
        report.objective,
        report.strategy.as_deref().unwrap_or("-")
    );
    for note in &report.limitations {
        println!("note: {note}");
    }
    Ok(())
}
