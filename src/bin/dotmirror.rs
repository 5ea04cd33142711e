// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotmirror::{config::SyncConfig, path::default_config_file, sync};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotmirror [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to sync configuration file.
    #[arg(short, long, value_name = "path", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_file()?,
        };
        let config = SyncConfig::load(config_path)?;

        match self.command {
            Command::Sync => run_sync(&config),
            Command::Status => run_status(&config),
            Command::Pull => run_pull(&config),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Sync watched files to the remote mirror.
    #[command(override_usage = "dotmirror sync [options]")]
    Sync,

    /// Show what a sync run would change, without changing anything.
    #[command(override_usage = "dotmirror status [options]")]
    Status,

    /// Converge the mirror with the remote, discarding local divergence.
    #[command(override_usage = "dotmirror pull [options]")]
    Pull,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_sync(config: &SyncConfig) -> Result<()> {
    let outcome = sync::run(config)?;
    info!("{outcome}");

    Ok(())
}

fn run_status(config: &SyncConfig) -> Result<()> {
    let delta = sync::status(config)?;

    let mut to_copy = delta.to_copy.iter().collect::<Vec<_>>();
    to_copy.sort_by(|a, b| a.0.cmp(b.0));
    for (hash, record) in to_copy {
        println!("copy    {} -> {hash}", record.path.display());
    }

    let mut to_remove = delta.to_remove.iter().collect::<Vec<_>>();
    to_remove.sort_by(|a, b| a.0.cmp(b.0));
    for (hash, record) in to_remove {
        println!("remove  {hash} ({})", record.path.display());
    }

    if delta.to_copy.is_empty() && delta.to_remove.is_empty() {
        println!("no changes");
    }

    Ok(())
}

fn run_pull(config: &SyncConfig) -> Result<()> {
    sync::pull(config)?;

    Ok(())
}
