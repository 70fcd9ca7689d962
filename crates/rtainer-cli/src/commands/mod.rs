//! CLI command definitions and dispatch.

pub mod container;
pub mod fsops;

use clap::{Parser, Subcommand};

use crate::context::AppContext;

/// One parsed shell line.
#[derive(Parser, Debug)]
#[command(name = "rtn")]
pub struct ShellLine {
    /// Command to execute.
    #[command(subcommand)]
    pub command: ShellCommand,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum ShellCommand {
    /// Create a container and unpack its image.
    ContainerCreate(container::CreateArgs),
    /// List containers.
    ContainerLs(container::ListArgs),
    /// Start a stopped container.
    ContainerStart(container::IdArgs),
    /// Stop a running container.
    ContainerStop(container::IdArgs),
    /// Delete a container (stopping it first if running).
    ContainerDelete(container::IdArgs),
    /// Create and immediately start a container.
    ContainerRun(container::CreateArgs),
    /// Copy an image file into the image store.
    ContainerLoad(container::LoadArgs),
    /// Pack a container directory into an image file.
    ContainerSave(container::SaveArgs),
    /// List the image store.
    ContainerImage,
    /// Load and execute a program file in the current task context.
    Run(fsops::RunArgs),
    /// List a directory.
    Ls(fsops::LsArgs),
    /// Print the calling task's working directory.
    Pwd,
    /// Change the calling task's working directory.
    Cd(fsops::CdArgs),
}

/// Dispatches a parsed command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(ctx: &AppContext, command: ShellCommand) -> anyhow::Result<()> {
    match command {
        ShellCommand::ContainerCreate(args) => container::create(ctx, &args),
        ShellCommand::ContainerLs(args) => container::list(ctx, &args),
        ShellCommand::ContainerStart(args) => container::start(ctx, &args),
        ShellCommand::ContainerStop(args) => container::stop(ctx, &args),
        ShellCommand::ContainerDelete(args) => container::delete(ctx, &args),
        ShellCommand::ContainerRun(args) => container::run(ctx, &args),
        ShellCommand::ContainerLoad(args) => container::load(ctx, &args),
        ShellCommand::ContainerSave(args) => container::save(ctx, &args),
        ShellCommand::ContainerImage => container::images(ctx),
        ShellCommand::Run(args) => fsops::run(ctx, &args),
        ShellCommand::Ls(args) => fsops::ls(ctx, &args),
        ShellCommand::Pwd => fsops::pwd(ctx),
        ShellCommand::Cd(args) => fsops::cd(ctx, &args),
    }
}
