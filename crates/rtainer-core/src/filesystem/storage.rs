//! The storage seam: a key→byte-array store with directories.
//!
//! Virtual paths are absolute, `/`-separated, and already normalised (no
//! `.` or `..` components); the chroot wrapper produces them. The shipped
//! [`DiskStorage`] maps the virtual tree onto a host base directory.

use std::path::{Path, PathBuf};

use rtainer_common::error::{Result, RtainerError};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
}

/// Metadata of a stored object.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes; zero for directories.
    pub size: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (no path components).
    pub name: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes; zero for directories.
    pub size: u64,
}

/// Narrow interface to the flash-backed filesystem.
///
/// Implementations must return directory listings sorted by name, so that
/// repeated enumerations of an unchanged directory visit entries in the
/// same order.
pub trait Storage: Send + Sync {
    /// Reads a whole file.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or cannot be read.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Creates or replaces a file. The parent directory must exist.
    ///
    /// # Errors
    ///
    /// Fails if the parent is missing or the write fails.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Removes a file or an empty directory.
    ///
    /// # Errors
    ///
    /// Fails if the entry is missing or the directory is not empty.
    fn remove(&self, path: &str) -> Result<()>;

    /// Removes a directory tree.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing or cannot be removed.
    fn remove_dir_all(&self, path: &str) -> Result<()>;

    /// Renames a file or directory.
    ///
    /// # Errors
    ///
    /// Fails if the source is missing or the rename fails.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Returns metadata for a path.
    ///
    /// # Errors
    ///
    /// Fails if the path does not exist.
    fn stat(&self, path: &str) -> Result<Metadata>;

    /// Creates a directory. The parent must exist.
    ///
    /// # Errors
    ///
    /// Fails if the parent is missing or the directory already exists.
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Lists a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Fails if the path is not a directory.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Whether a path exists.
    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }
}

/// Disk-backed storage rooted at a host base directory.
#[derive(Debug)]
pub struct DiskStorage {
    base: PathBuf,
}

impl DiskStorage {
    /// Creates storage backed by `base`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Fails if the base directory cannot be created.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base).map_err(|e| RtainerError::Io {
            path: base.clone(),
            source: e,
        })?;
        Ok(Self { base })
    }

    fn host_path(&self, path: &str) -> Result<PathBuf> {
        let stripped = path.strip_prefix('/').ok_or_else(|| RtainerError::Config {
            message: format!("virtual path must be absolute: {path}"),
        })?;
        if stripped.split('/').any(|part| part == ".." || part == ".") {
            return Err(RtainerError::Config {
                message: format!("virtual path must be normalised: {path}"),
            });
        }
        Ok(self.base.join(stripped))
    }

    fn io_error(path: &Path, source: std::io::Error) -> RtainerError {
        RtainerError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Storage for DiskStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let host = self.host_path(path)?;
        std::fs::read(&host).map_err(|e| Self::io_error(&host, e))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let host = self.host_path(path)?;
        std::fs::write(&host, data).map_err(|e| Self::io_error(&host, e))
    }

    fn remove(&self, path: &str) -> Result<()> {
        let host = self.host_path(path)?;
        let meta = std::fs::metadata(&host).map_err(|e| Self::io_error(&host, e))?;
        if meta.is_dir() {
            std::fs::remove_dir(&host).map_err(|e| Self::io_error(&host, e))
        } else {
            std::fs::remove_file(&host).map_err(|e| Self::io_error(&host, e))
        }
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let host = self.host_path(path)?;
        std::fs::remove_dir_all(&host).map_err(|e| Self::io_error(&host, e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let host_from = self.host_path(from)?;
        let host_to = self.host_path(to)?;
        std::fs::rename(&host_from, &host_to).map_err(|e| Self::io_error(&host_from, e))
    }

    fn stat(&self, path: &str) -> Result<Metadata> {
        let host = self.host_path(path)?;
        let meta = std::fs::metadata(&host).map_err(|e| Self::io_error(&host, e))?;
        Ok(Metadata {
            kind: if meta.is_dir() { EntryKind::Dir } else { EntryKind::File },
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        let host = self.host_path(path)?;
        std::fs::create_dir(&host).map_err(|e| Self::io_error(&host, e))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let host = self.host_path(path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&host).map_err(|e| Self::io_error(&host, e))? {
            let entry = entry.map_err(|e| Self::io_error(&host, e))?;
            let meta = entry.metadata().map_err(|e| Self::io_error(&host, e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if meta.is_dir() { EntryKind::Dir } else { EntryKind::File },
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
