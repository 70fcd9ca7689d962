//! Per-task chroot: root-path rewriting for path-bearing operations.
//!
//! Every path a task supplies is resolved against its working directory,
//! normalised lexically, and prefixed with the task's root path. Paths
//! that would ascend above the root are rejected. Handle-free operations
//! on already-open content (the storage seam exposes whole-file reads and
//! writes) need no rewriting beyond this.

use std::sync::Arc;

use rtainer_common::constants::MAX_PATH_LEN;
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::TaskId;

use super::storage::{DirEntry, EntryKind, Metadata, Storage};
use crate::task::TaskTable;

/// Normalises an absolute virtual path, resolving `.` and `..` lexically.
///
/// # Errors
///
/// Fails if the path is relative or ascends above `/`.
pub fn normalize(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(RtainerError::Config {
            message: format!("path must be absolute: {path}"),
        });
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(RtainerError::AccessDenied {
                        message: format!("path ascends above the root: {path}"),
                    });
                }
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        Ok("/".to_owned())
    } else {
        Ok(format!("/{}", parts.join("/")))
    }
}

/// Joins a root path and an in-root absolute path with a single slash.
fn apply_root(root: &str, visible: &str) -> String {
    if root == "/" {
        return visible.to_owned();
    }
    if visible == "/" {
        return root.to_owned();
    }
    format!("{}{}", root.trim_end_matches('/'), visible)
}

/// Filesystem view of the tasks: all path-bearing operations are rewritten
/// through the calling task's root and working directory.
#[derive(Clone)]
pub struct TaskFs {
    storage: Arc<dyn Storage>,
    tasks: Arc<TaskTable>,
}

impl TaskFs {
    /// Creates the wrapper over a storage backend and the task side table.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, tasks: Arc<TaskTable>) -> Self {
        Self { storage, tasks }
    }

    /// The underlying storage, for callers operating outside any task
    /// context (manager construction paths).
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Resolves a caller-supplied path to the effective storage path:
    /// relative paths are joined to the task's working directory, the
    /// result is normalised, then prefixed with the task's root.
    ///
    /// # Errors
    ///
    /// Fails if the path ascends above the root or exceeds the maximum
    /// path length.
    pub fn resolve(&self, task: TaskId, path: &str) -> Result<String> {
        let visible = if path.starts_with('/') {
            normalize(path)?
        } else {
            let cwd = self.tasks.cwd(task);
            normalize(&format!("{}/{}", cwd.trim_end_matches('/'), path))?
        };
        let effective = apply_root(&self.tasks.root(task), &visible);
        if effective.len() > MAX_PATH_LEN {
            return Err(RtainerError::Config {
                message: format!("path exceeds {MAX_PATH_LEN} bytes"),
            });
        }
        Ok(effective)
    }

    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Fails if resolution or the read fails.
    pub fn read(&self, task: TaskId, path: &str) -> Result<Vec<u8>> {
        let effective = self.resolve(task, path)?;
        self.storage.read(&effective)
    }

    /// Creates or replaces a file.
    ///
    /// # Errors
    ///
    /// Fails if resolution or the write fails.
    pub fn write(&self, task: TaskId, path: &str, data: &[u8]) -> Result<()> {
        let effective = self.resolve(task, path)?;
        self.storage.write(&effective, data)
    }

    /// Removes a file or empty directory.
    ///
    /// # Errors
    ///
    /// Fails if resolution or the removal fails.
    pub fn remove(&self, task: TaskId, path: &str) -> Result<()> {
        let effective = self.resolve(task, path)?;
        self.storage.remove(&effective)
    }

    /// Renames; both paths are rewritten.
    ///
    /// # Errors
    ///
    /// Fails if resolution or the rename fails.
    pub fn rename(&self, task: TaskId, from: &str, to: &str) -> Result<()> {
        let effective_from = self.resolve(task, from)?;
        let effective_to = self.resolve(task, to)?;
        self.storage.rename(&effective_from, &effective_to)
    }

    /// Returns metadata.
    ///
    /// # Errors
    ///
    /// Fails if resolution fails or the path does not exist.
    pub fn stat(&self, task: TaskId, path: &str) -> Result<Metadata> {
        let effective = self.resolve(task, path)?;
        self.storage.stat(&effective)
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// Fails if resolution or the creation fails.
    pub fn mkdir(&self, task: TaskId, path: &str) -> Result<()> {
        let effective = self.resolve(task, path)?;
        self.storage.mkdir(&effective)
    }

    /// Lists a directory.
    ///
    /// # Errors
    ///
    /// Fails if resolution fails or the path is not a directory.
    pub fn read_dir(&self, task: TaskId, path: &str) -> Result<Vec<DirEntry>> {
        let effective = self.resolve(task, path)?;
        self.storage.read_dir(&effective)
    }

    /// Changes the task's root to a raw absolute storage path, after
    /// verifying the target directory exists.
    ///
    /// # Errors
    ///
    /// Fails if the target is missing or not a directory.
    pub fn chroot(&self, task: TaskId, path: &str) -> Result<()> {
        let target = normalize(path)?;
        let meta = self.storage.stat(&target)?;
        if meta.kind != EntryKind::Dir {
            return Err(RtainerError::InvalidState {
                message: format!("chroot target is not a directory: {target}"),
            });
        }
        self.tasks.set_root(task, &target);
        tracing::debug!(%task, root = target, "task chrooted");
        Ok(())
    }

    /// Changes the task's working directory (relative to its root).
    ///
    /// # Errors
    ///
    /// Fails if the target is missing or not a directory.
    pub fn chdir(&self, task: TaskId, path: &str) -> Result<()> {
        let visible = if path.starts_with('/') {
            normalize(path)?
        } else {
            let cwd = self.tasks.cwd(task);
            normalize(&format!("{}/{}", cwd.trim_end_matches('/'), path))?
        };
        let effective = apply_root(&self.tasks.root(task), &visible);
        let meta = self.storage.stat(&effective)?;
        if meta.kind != EntryKind::Dir {
            return Err(RtainerError::InvalidState {
                message: format!("not a directory: {visible}"),
            });
        }
        self.tasks.set_cwd(task, &visible);
        Ok(())
    }

    /// The task's working directory as the task sees it.
    #[must_use]
    pub fn cwd(&self, task: TaskId) -> String {
        self.tasks.cwd(task)
    }
}
