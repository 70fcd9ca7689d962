//! `container-*` command handlers.

use clap::Args;

use rtainer_common::constants::CPU_WINDOW_TICKS;
use rtainer_common::types::{ContainerId, ResourceLimits};
use rtainer_image::{codec, ImageStore};

use crate::context::AppContext;
use crate::output;

/// Arguments for `container-create` and `container-run`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Image name in the store; also used as the container name.
    pub image: String,

    /// Program file inside the image to execute.
    pub program: String,

    /// Memory limit in KiB.
    pub mem_kb: Option<u64>,

    /// CPU quota as a percentage of the accounting window.
    pub cpu_pct: Option<u32>,
}

/// Arguments carrying a container id.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Container id.
    pub id: u32,
}

/// Arguments for `container-ls`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit the listing as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `container-load`.
#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Path of the image file to copy into the store.
    pub path: String,
}

/// Arguments for `container-save`.
#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Container id.
    pub id: u32,

    /// Destination path of the packed image.
    pub path: String,
}

fn limits_from(ctx: &AppContext, args: &CreateArgs) -> ResourceLimits {
    ResourceLimits {
        memory_bytes: args
            .mem_kb
            .map_or(ctx.default_limits.memory_bytes, |kb| kb * 1024),
        cpu_quota_ticks: args
            .cpu_pct
            .map_or(ctx.default_limits.cpu_quota_ticks, |pct| {
                pct.saturating_mul(CPU_WINDOW_TICKS) / 100
            }),
    }
}

/// Executes `container-create`.
///
/// # Errors
///
/// Returns an error if creation fails.
pub fn create(ctx: &AppContext, args: &CreateArgs) -> anyhow::Result<()> {
    let limits = limits_from(ctx, args);
    let id = ctx
        .manager
        .create(&args.image, &args.image, &args.program, Some(limits))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container '{}' created with id {id}.", args.image);
    Ok(())
}

/// Executes `container-run`.
///
/// # Errors
///
/// Returns an error if creation or start fails.
pub fn run(ctx: &AppContext, args: &CreateArgs) -> anyhow::Result<()> {
    let limits = limits_from(ctx, args);
    let id = ctx
        .manager
        .run(&args.image, &args.image, &args.program, Some(limits))
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container '{}' running with id {id}.", args.image);
    Ok(())
}

/// Executes `container-ls`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn list(ctx: &AppContext, args: &ListArgs) -> anyhow::Result<()> {
    let containers = ctx.manager.list();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&containers)?);
        return Ok(());
    }
    output::print_containers(&containers);
    Ok(())
}

/// Executes `container-start`.
///
/// # Errors
///
/// Returns an error if the transition is invalid.
pub fn start(ctx: &AppContext, args: &IdArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    ctx.manager.start(id).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container {id} started.");
    Ok(())
}

/// Executes `container-stop`.
///
/// # Errors
///
/// Returns an error if the container is not running.
pub fn stop(ctx: &AppContext, args: &IdArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    ctx.manager.stop(id).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container {id} stopped.");
    Ok(())
}

/// Executes `container-delete`.
///
/// # Errors
///
/// Returns an error if the container is unknown.
pub fn delete(ctx: &AppContext, args: &IdArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    ctx.manager.delete(id).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container {id} deleted.");
    Ok(())
}

/// Executes `container-load`.
///
/// # Errors
///
/// Returns an error if the source cannot be copied into the store.
pub fn load(ctx: &AppContext, args: &LoadArgs) -> anyhow::Result<()> {
    let source = ctx
        .fs
        .resolve(ctx.shell_task, &args.path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let name = ImageStore::new(ctx.storage.as_ref())
        .load(&source)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Image '{name}' loaded.");
    Ok(())
}

/// Executes `container-save`.
///
/// # Errors
///
/// Returns an error if the container is unknown or packing fails.
pub fn save(ctx: &AppContext, args: &SaveArgs) -> anyhow::Result<()> {
    let id = ContainerId::new(args.id);
    // Confirms the id before touching storage.
    let _ = ctx.manager.get(id).map_err(|e| anyhow::anyhow!("{e}"))?;
    let dest = ctx
        .fs
        .resolve(ctx.shell_task, &args.path)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let count = codec::pack(ctx.storage.as_ref(), &codec::container_dir(id), &dest)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("Container {id} saved to {} ({count} files).", args.path);
    Ok(())
}

/// Executes `container-image`.
///
/// # Errors
///
/// Returns an error if the store cannot be listed.
pub fn images(ctx: &AppContext) -> anyhow::Result<()> {
    let images = ImageStore::new(ctx.storage.as_ref())
        .list()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    if images.is_empty() {
        println!("No images found.");
        return Ok(());
    }
    println!("{:<40} {:>12}", "IMAGE", "SIZE");
    for image in images {
        println!("{:<40} {:>12}", image.name, output::format_bytes(image.size));
    }
    Ok(())
}
