//! Filesystem and program commands: `run`, `ls`, `pwd`, `cd`.

use clap::Args;

use rtainer_core::filesystem::EntryKind;

use crate::context::AppContext;
use crate::output;

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path of the program file to execute in the current task context.
    pub path: String,
}

/// Arguments for `ls`.
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Directory to list; defaults to `/`.
    pub path: Option<String>,
}

/// Arguments for `cd`.
#[derive(Args, Debug)]
pub struct CdArgs {
    /// Directory to change into.
    pub path: String,
}

/// Executes `run`: loads the file and hands it to the program loader in
/// the shell task's context.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the loader fails.
pub fn run(ctx: &AppContext, args: &RunArgs) -> anyhow::Result<()> {
    let bytes = ctx
        .fs
        .read(ctx.shell_task, &args.path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    ctx.loader.execute(&bytes).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Program {} completed.", args.path);
    Ok(())
}

/// Executes `ls`.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn ls(ctx: &AppContext, args: &LsArgs) -> anyhow::Result<()> {
    let path = args.path.as_deref().unwrap_or("/");
    let entries = ctx
        .fs
        .read_dir(ctx.shell_task, path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    for entry in entries {
        match entry.kind {
            EntryKind::Dir => println!("DIR  {}", entry.name),
            EntryKind::File => {
                println!("FILE {:<32} {}", entry.name, output::format_bytes(entry.size));
            }
        }
    }
    Ok(())
}

/// Executes `pwd`.
///
/// # Errors
///
/// Never fails; present for dispatch uniformity.
pub fn pwd(ctx: &AppContext) -> anyhow::Result<()> {
    println!("{}", ctx.fs.cwd(ctx.shell_task));
    Ok(())
}

/// Executes `cd`.
///
/// # Errors
///
/// Returns an error if the target is missing or not a directory.
pub fn cd(ctx: &AppContext, args: &CdArgs) -> anyhow::Result<()> {
    ctx.fs
        .chdir(ctx.shell_task, &args.path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}
