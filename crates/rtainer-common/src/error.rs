//! Unified error types for the rtainer workspace.
//!
//! Every crate in the workspace reports failures through [`RtainerError`];
//! the CLI wraps it in `anyhow` at the binary boundary only.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum RtainerError {
    /// A fixed-size table has no free slot left.
    #[error("no free {resource} slot")]
    Capacity {
        /// Name of the exhausted table (cgroup, pid namespace, ...).
        resource: &'static str,
    },

    /// The caller violated a structural invariant (double bind, non-empty
    /// delete, root-namespace delete, ...). The target is unchanged.
    #[error("invariant violated: {message}")]
    Invariant {
        /// Description of the violated invariant.
        message: String,
    },

    /// The operation is not legal in the target's current lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the rejected transition.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A handle refers to a slot that has since been reused or freed.
    #[error("stale {kind} handle")]
    StaleHandle {
        /// Type of the stale handle.
        kind: &'static str,
    },

    /// A namespace boundary denied the operation.
    #[error("access denied: {message}")]
    AccessDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A container task found its isolation inconsistent after startup.
    #[error("container {container}: isolation verification failed ({check})")]
    IsolationViolation {
        /// Id of the affected container.
        container: u32,
        /// Which verification step failed.
        check: &'static str,
    },

    /// A storage operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Virtual path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A container image is malformed or exceeds format limits.
    #[error("image format error: {message}")]
    ImageFormat {
        /// Description of the format violation.
        message: String,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RtainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_names_resource() {
        let err = RtainerError::Capacity { resource: "cgroup" };
        assert!(format!("{err}").contains("cgroup"));
    }

    #[test]
    fn not_found_error_display_kind_and_id() {
        let err = RtainerError::NotFound {
            kind: "container",
            id: "7".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("container"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn isolation_violation_names_check() {
        let err = RtainerError::IsolationViolation {
            container: 3,
            check: "cgroup membership",
        };
        let msg = format!("{err}");
        assert!(msg.contains('3'));
        assert!(msg.contains("cgroup membership"));
    }

    #[test]
    fn serialization_error_from_serde_json() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RtainerError = serde_err.into();
        assert!(matches!(err, RtainerError::Serialization { .. }));
    }
}
