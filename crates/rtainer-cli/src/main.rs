//! # rtn — rtainer CLI
//!
//! Interactive shell (and one-shot command mode) over the container
//! runtime: create, start, stop, save, and inspect containers backed by
//! the isolation subsystem.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod commands;
mod context;
mod output;
mod shell;

use std::path::PathBuf;

use clap::Parser;

use rtainer_common::config::RtainerConfig;

use crate::commands::ShellCommand;
use crate::context::AppContext;

/// rtainer — containers for a small real-time executive.
#[derive(Parser, Debug)]
#[command(name = "rtn", version, about, long_about = None)]
struct Cli {
    /// Host directory backing the virtual storage tree.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command to run; the interactive shell starts when omitted.
    #[command(subcommand)]
    command: Option<ShellCommand>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => RtainerConfig::load(path).map_err(|e| anyhow::anyhow!("{e}"))?,
        None => RtainerConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let ctx = AppContext::new(&config)?;
    match cli.command {
        Some(command) => commands::execute(&ctx, command),
        None => shell::run(&ctx),
    }
}
