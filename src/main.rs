//! nudgebot - Entry Point
//!
//! Modes:
//! - Default: adaptive scheduler loop over all active users
//! - --once <user>: run one loop iteration for a user and print the state

use std::sync::Arc;

use nudgebot::{AdaptiveScheduler, Agent, AnthropicLlm, Config, ConsoleMessenger, MemoryManager};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");
    let once_user = args
        .iter()
        .position(|a| a == "--once")
        .and_then(|i| args.get(i + 1))
        .cloned();

    if help_mode {
        println!("nudgebot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: nudgebot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --once <user>  Run one loop iteration for a user and print the state");
        println!("  --help, -h     Show this help");
        println!();
        println!("Default: Run the adaptive scheduler loop");
        println!();
        println!("Environment variables:");
        println!("  ANTHROPIC_API_KEY           Claude API key (without it the loop always waits)");
        println!("  NUDGEBOT_DB_PATH            SQLite database path");
        println!("  NUDGEBOT_POLL_INTERVAL_SECS Scheduler sweep interval (default: 3600)");
        println!("  NUDGEBOT_MODEL              Model for Think/Reflect prompts");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("nudgebot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let memory = Arc::new(MemoryManager::open(&config.db_path)?);
    let mut agent = Agent::new(memory.clone()).with_messenger(Arc::new(ConsoleMessenger));
    match &config.anthropic_api_key {
        Some(key) => {
            agent = agent.with_llm(Arc::new(AnthropicLlm::new(key).with_model(&config.model)));
        }
        None => info!("no ANTHROPIC_API_KEY set, loop will always wait"),
    }
    let agent = Arc::new(agent);

    if let Some(user_id) = once_user {
        memory.record_user_activity(&user_id)?;
        let state = agent.run_once(&user_id).await;
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let scheduler = AdaptiveScheduler::new(memory);
    tokio::select! {
        _ = scheduler.run(agent, config.poll_interval) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
