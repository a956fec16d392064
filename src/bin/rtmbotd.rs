//! rtmbot agent - real-time chat agent with a pluggable handler chain
//!
//! Connects to the chat platform, listens for channel messages and offers
//! each one to the configured handlers in order.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default config (~/.config/rtmbot/config.toml)
//! rtmbotd
//!
//! # Run with an explicit config file
//! rtmbotd --config /etc/rtmbot/config.toml run
//!
//! # Validate the config and list the handler chain
//! rtmbotd check
//!
//! # Supply the token from the environment
//! RTMBOT_TOKEN=xoxb-... rtmbotd
//!
//! # Enable debug logging
//! RUST_LOG=rtmbotd=debug rtmbotd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (close the socket, run handler shutdown hooks)

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rtmbotd::config::{self, BotConfig};
use rtmbotd::{BotService, HandlerRegistry, HttpTransport};

/// rtmbot agent - routes channel messages through a handler chain
#[derive(Parser, Debug)]
#[command(name = "rtmbotd", version, about)]
struct Args {
    /// Path to the config file (default: $RTMBOT_CONFIG or ~/.config/rtmbot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the agent until interrupted
    Run,
    /// Validate the configuration and print the handler chain
    Check,
}

fn load_config(path: Option<PathBuf>) -> Result<(PathBuf, BotConfig)> {
    let path = match path {
        Some(path) => path,
        None => config::default_path()?,
    };
    let config = BotConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok((path, config))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (path, config) = load_config(args.config)?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_agent(config),
        Command::Check => check(&path, &config),
    }
}

/// Verifies that every configured handler kind is registered.
fn check(path: &std::path::Path, config: &BotConfig) -> Result<()> {
    let registry = HandlerRegistry::with_builtins();

    println!("Config: {}", path.display());
    println!("API: {}", config.api_base);
    println!("Handlers ({}):", config.handlers.len());

    let mut unknown = 0;
    for (index, handler) in config.handlers.iter().enumerate() {
        let status = if registry.contains(&handler.kind) {
            "ok"
        } else {
            unknown += 1;
            "unknown kind"
        };
        println!("  {}. {} ({}) - {}", index + 1, handler.name, handler.kind, status);
    }

    if unknown > 0 {
        bail!(
            "{} handler(s) use an unknown kind; registered kinds: {}",
            unknown,
            registry.kinds().join(", ")
        );
    }
    println!("Configuration OK");
    Ok(())
}

/// Runs the agent (async entry point).
#[tokio::main]
async fn run_agent(config: BotConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rtmbotd=info".parse()?)
                .add_directive("rtmbot_core=info".parse()?)
                .add_directive("rtmbot_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        handlers = config.handlers.len(),
        "rtmbot agent starting"
    );

    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let transport = Arc::new(HttpTransport::new(config.api_base.clone()));
    let service = BotService::new(config, transport, HandlerRegistry::with_builtins());
    service.run(shutdown).await;

    info!("rtmbot agent stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
