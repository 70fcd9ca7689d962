//! The canonical image store at `/var/container/images/`.

use rtainer_common::constants::{CONTAINER_DIR, IMAGE_STORE_DIR};
use rtainer_common::error::{Result, RtainerError};
use rtainer_core::filesystem::{DirEntry, EntryKind, Storage};

/// Creates `path` as a directory if it does not exist yet.
///
/// # Errors
///
/// Fails if the path exists but is not a directory, or creation fails.
pub(crate) fn ensure_dir(storage: &dyn Storage, path: &str) -> Result<()> {
    match storage.stat(path) {
        Ok(meta) if meta.kind == EntryKind::Dir => Ok(()),
        Ok(_) => Err(RtainerError::InvalidState {
            message: format!("{path} exists but is not a directory"),
        }),
        Err(_) => storage.mkdir(path),
    }
}

/// Access to the image store.
pub struct ImageStore<'a> {
    storage: &'a dyn Storage,
}

impl<'a> ImageStore<'a> {
    /// Opens the store over a storage backend.
    #[must_use]
    pub fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Returns the store path of an image by name.
    #[must_use]
    pub fn image_path(name: &str) -> String {
        format!("{IMAGE_STORE_DIR}/{name}")
    }

    /// Copies an image file into the store under its basename, creating
    /// the store directories on demand. Returns the stored name.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be read or the store cannot be written.
    pub fn load(&self, source_path: &str) -> Result<String> {
        let name = source_path
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RtainerError::Config {
                message: format!("not a file path: {source_path}"),
            })?;
        let data = self.storage.read(source_path)?;
        ensure_dir(self.storage, "/var")?;
        ensure_dir(self.storage, CONTAINER_DIR)?;
        ensure_dir(self.storage, IMAGE_STORE_DIR)?;
        let dest = Self::image_path(name);
        self.storage.write(&dest, &data)?;
        tracing::info!(source_path, dest, bytes = data.len(), "image loaded into store");
        Ok(name.to_owned())
    }

    /// Lists the stored images; an absent store directory lists as empty.
    ///
    /// # Errors
    ///
    /// Fails if the store directory cannot be read.
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        if !self.storage.exists(IMAGE_STORE_DIR) {
            return Ok(Vec::new());
        }
        Ok(self
            .storage
            .read_dir(IMAGE_STORE_DIR)?
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtainer_core::filesystem::DiskStorage;

    fn storage() -> (tempfile::TempDir, DiskStorage) {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = DiskStorage::new(dir.path()).expect("storage");
        (dir, storage)
    }

    #[test]
    fn load_copies_under_basename() {
        let (_dir, storage) = storage();
        storage.write("/upload.img", b"blob").expect("write");
        let store = ImageStore::new(&storage);
        let name = store.load("/upload.img").expect("load");
        assert_eq!(name, "upload.img");
        assert_eq!(
            storage.read("/var/container/images/upload.img").expect("read"),
            b"blob"
        );
    }

    #[test]
    fn list_is_empty_before_first_load() {
        let (_dir, storage) = storage();
        let store = ImageStore::new(&storage);
        assert!(store.list().expect("list").is_empty());
    }

    #[test]
    fn list_names_loaded_images() {
        let (_dir, storage) = storage();
        storage.write("/a.img", b"1").expect("write");
        storage.write("/b.img", b"22").expect("write");
        let store = ImageStore::new(&storage);
        store.load("/a.img").expect("load");
        store.load("/b.img").expect("load");

        let names: Vec<_> = store.list().expect("list").into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a.img", "b.img"]);
    }

    #[test]
    fn load_of_missing_source_fails() {
        let (_dir, storage) = storage();
        let store = ImageStore::new(&storage);
        assert!(store.load("/nope.img").is_err());
    }
}
