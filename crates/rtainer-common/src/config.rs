//! Global configuration model for the rtainer runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtainerError};
use crate::types::ResourceLimits;

/// Root configuration for the rtainer runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtainerConfig {
    /// Host directory backing the virtual storage tree.
    pub data_dir: PathBuf,
    /// Resource limits applied to containers created without explicit ones.
    pub default_limits: ResourceLimits,
    /// Cadence of the reconciliation daemon, in ticks.
    pub daemon_period_ticks: u64,
}

impl Default for RtainerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(crate::constants::DEFAULT_DATA_DIR),
            default_limits: ResourceLimits {
                memory_bytes: crate::constants::DEFAULT_MEMORY_LIMIT,
                cpu_quota_ticks: crate::constants::DEFAULT_CPU_QUOTA_TICKS,
            },
            daemon_period_ticks: crate::constants::DAEMON_PERIOD_TICKS,
        }
    }
}

impl RtainerConfig {
    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RtainerError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        if config.daemon_period_ticks == 0 {
            return Err(RtainerError::Config {
                message: "daemon_period_ticks must be non-zero".into(),
            });
        }
        Ok(config)
    }
}
