//! Capacity constants and canonical filesystem paths.
//!
//! The fixed capacities are part of the contract: every table rejects
//! overflow at entry instead of growing, so timing and memory stay bounded.

use crate::types::Tick;

/// Maximum number of containers per process.
pub const MAX_CONTAINERS: usize = 16;

/// Maximum number of cgroups.
pub const MAX_CGROUPS: usize = 8;

/// Maximum number of tasks bound to a single cgroup.
pub const MAX_TASKS_PER_CGROUP: usize = 8;

/// Maximum number of PID namespaces (the root namespace included).
pub const MAX_PID_NAMESPACES: usize = 4;

/// Highest virtual PID a namespace will issue.
pub const PID_NAMESPACE_MAX_PID: u32 = 10;

/// Maximum number of IPC namespaces (the root namespace included).
pub const MAX_IPC_NAMESPACES: usize = 4;

/// Maximum number of registered IPC objects per namespace.
pub const MAX_IPC_OBJECTS_PER_NAMESPACE: usize = 32;

/// Sentinel memory limit disabling memory gating.
pub const MEMORY_NO_LIMIT: u64 = u64::MAX;

/// Sentinel CPU quota disabling CPU gating.
pub const CPU_QUOTA_MAX: u32 = u32::MAX;

/// Length of the cgroup CPU accounting window, in ticks.
pub const CPU_WINDOW_TICKS: u32 = 1_000;

/// Executive tick rate in Hz; one tick is one millisecond.
pub const TICK_HZ: u64 = 1_000;

/// Memory limit applied when a container is created without one.
pub const DEFAULT_MEMORY_LIMIT: u64 = 8 * 1024;

/// CPU quota (ticks per window) applied when a container is created
/// without one.
pub const DEFAULT_CPU_QUOTA_TICKS: u32 = 100;

/// Maximum length of a container display name, in bytes.
pub const MAX_CONTAINER_NAME_LEN: usize = 31;

/// Maximum length of any virtual path, in bytes.
pub const MAX_PATH_LEN: usize = 256;

/// Maximum filename length stored in an image record (the 256-byte field
/// keeps one byte for the terminating NUL).
pub const MAX_FILENAME_LEN: usize = 255;

/// Width of the filename field in an image record, in bytes.
pub const IMAGE_NAME_FIELD: usize = 256;

/// Maximum number of files in a single image (the count is one byte).
pub const IMAGE_MAX_FILES: usize = 255;

/// Parent directory for container working directories.
pub const CONTAINER_DIR: &str = "/var/container";

/// Canonical image store.
pub const IMAGE_STORE_DIR: &str = "/var/container/images";

/// Prefix of the staging directory used while unpacking an image.
pub const STAGE_PREFIX: &str = ".stage-";

/// Reconciliation cadence of the container daemon, in ticks.
pub const DAEMON_PERIOD_TICKS: Tick = 1_000;

/// Default host directory backing the virtual storage tree.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/rtainer";

/// Application name used in CLI output.
pub const APP_NAME: &str = "rtainer";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "rtn";
