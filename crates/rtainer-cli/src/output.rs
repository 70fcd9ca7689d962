//! Formatted output helpers for CLI commands.

use rtainer_common::constants::{CPU_QUOTA_MAX, CPU_WINDOW_TICKS, MEMORY_NO_LIMIT};
use rtainer_runtime::ContainerInfo;

/// Formats a byte count into a human-readable string (e.g., "128.0 KiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a memory limit, mapping the sentinel to "unlimited".
#[must_use]
pub fn format_memory_limit(limit: u64) -> String {
    if limit == MEMORY_NO_LIMIT {
        "unlimited".to_owned()
    } else {
        format_bytes(limit)
    }
}

/// Formats a CPU quota as ticks per window with the percentage, mapping
/// the sentinel to "unlimited".
#[must_use]
pub fn format_cpu_quota(quota_ticks: u32) -> String {
    if quota_ticks == CPU_QUOTA_MAX {
        "unlimited".to_owned()
    } else {
        format!("{quota_ticks} ticks ({}%)", quota_ticks * 100 / CPU_WINDOW_TICKS)
    }
}

/// Prints the container table.
pub fn print_containers(containers: &[ContainerInfo]) {
    if containers.is_empty() {
        println!("No containers found.");
        return;
    }
    println!(
        "{:<6} {:<20} {:<9} {:<14} {:<20}",
        "ID", "NAME", "STATE", "MEMORY", "CPU"
    );
    for container in containers {
        println!(
            "{:<6} {:<20} {:<9} {:<14} {:<20}",
            container.id.to_string(),
            container.name,
            container.state.to_string(),
            format_memory_limit(container.memory_limit),
            format_cpu_quota(container.cpu_quota_ticks)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_bytes() {
        assert_eq!(format_bytes(512), "512 B");
    }

    #[test]
    fn format_bytes_displays_kib() {
        assert_eq!(format_bytes(2048), "2.0 KiB");
    }

    #[test]
    fn format_bytes_displays_mib() {
        assert_eq!(format_bytes(134_217_728), "128.0 MiB");
    }

    #[test]
    fn memory_sentinel_formats_as_unlimited() {
        assert_eq!(format_memory_limit(MEMORY_NO_LIMIT), "unlimited");
        assert_eq!(format_memory_limit(8192), "8.0 KiB");
    }

    #[test]
    fn cpu_quota_shows_ticks_and_percent() {
        assert_eq!(format_cpu_quota(CPU_QUOTA_MAX), "unlimited");
        assert_eq!(format_cpu_quota(100), "100 ticks (10%)");
        assert_eq!(format_cpu_quota(CPU_WINDOW_TICKS), "1000 ticks (100%)");
    }
}
