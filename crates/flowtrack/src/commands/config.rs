//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use serde::Serialize;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: Option<ConfigCommand>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration as TOML (default)
    Show,

    /// Show which config files were loaded
    Path,

    /// Write the effective configuration to the user config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct PathOutput {
    loaded_from: Option<String>,
    layers: Vec<String>,
    user_config: Option<String>,
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command.unwrap_or(ConfigCommand::Show) {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { force } => cmd_init(ctx, force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let effective = ctx.config.config.resolved();
    // Reject values the cache would refuse before presenting them as effective.
    effective.session().to_cache_config()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(());
    }

    if ctx.config.sources.is_empty() {
        println!("# No config file found (using defaults)");
    }
    for path in &ctx.config.sources {
        println!("# Loaded from {}", path.display());
    }
    print!("{}", effective.to_toml()?);
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let output = PathOutput {
        loaded_from: ctx
            .config
            .source
            .as_ref()
            .map(|p| p.display().to_string()),
        layers: ctx
            .config
            .sources
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        user_config: flowtrack_config::xdg_config_path().map(|p| p.display().to_string()),
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!(
        "{} {}",
        dim.apply_to("Loaded from:"),
        output.loaded_from.as_deref().unwrap_or("(defaults)")
    );
    println!(
        "{} {}",
        dim.apply_to("User config:"),
        output.user_config.as_deref().unwrap_or("(unavailable)")
    );
    Ok(())
}

fn cmd_init(ctx: &Context, force: bool) -> Result<()> {
    let Some(path) = flowtrack_config::xdg_config_path() else {
        anyhow::bail!("could not determine the user config directory");
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    flowtrack_config::save_config(&ctx.config.config.resolved(), &path)?;
    let green = Style::new().green();
    println!("{} {}", green.apply_to("Wrote"), path.display());
    Ok(())
}
