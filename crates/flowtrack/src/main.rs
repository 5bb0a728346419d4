//! flowtrack - TCP flow session cache replay tool
//!
//! Main entry point for the flowtrack CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod commands;
mod trace;

use commands::{config, replay};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// flowtrack - TCP flow session cache replay tool
#[derive(Parser)]
#[command(name = "flowtrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: $FLOWTRACK_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a packet trace through the session cache
    Replay(replay::ReplayArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = flowtrack_config::load_config(cli.config.as_deref())
        .context("failed to load configuration")?;

    // Initialize tracing: console (human-readable, stderr) + optional rotating JSON file
    let filter = if cli.verbose {
        "flowtrack=debug,flowtrack_session=debug,flowtrack_config=debug,info"
    } else {
        "flowtrack=info,flowtrack_session=info,warn"
    };

    let (json_layer, _guard) = match loaded.config.logging().json_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "flowtrack.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "flowtrack=trace,flowtrack_session=trace,flowtrack_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(json_layer)
        .init();

    for source in &loaded.sources {
        tracing::debug!(path = %source.display(), "Loaded configuration layer");
    }

    // Create context for commands
    let ctx = commands::Context {
        config: loaded,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Replay(args) => replay::run(args, &ctx),
        Commands::Config(args) => config::run(args, &ctx),
    }
}
