//! Pack and unpack of the flat-directory image format.
//!
//! Packing enumerates only regular files, in the deterministic sorted
//! order the storage seam guarantees, so identical directory contents
//! always produce identical images. Unpacking writes into a staging
//! directory which is renamed to the container directory only once every
//! record landed; a failed unpack leaves no trace.

use rtainer_common::constants::{
    CONTAINER_DIR, IMAGE_MAX_FILES, IMAGE_NAME_FIELD, MAX_FILENAME_LEN, STAGE_PREFIX,
};
use rtainer_common::error::{Result, RtainerError};
use rtainer_common::types::ContainerId;
use rtainer_core::filesystem::{EntryKind, Storage};

use crate::store::ensure_dir;

/// Returns the working directory of a container.
#[must_use]
pub fn container_dir(id: ContainerId) -> String {
    format!("{CONTAINER_DIR}/{id}")
}

fn stage_dir(id: ContainerId) -> String {
    format!("{CONTAINER_DIR}/{STAGE_PREFIX}{id}")
}

/// Packs the regular files of `dir` into an image at `image_path`.
///
/// Subdirectories are skipped. Filenames longer than
/// [`MAX_FILENAME_LEN`] bytes are truncated. Returns the file count.
///
/// # Errors
///
/// Fails if the directory holds more than [`IMAGE_MAX_FILES`] files or any
/// storage operation fails; a partially written image is removed.
pub fn pack(storage: &dyn Storage, dir: &str, image_path: &str) -> Result<u8> {
    let entries = storage.read_dir(dir)?;
    let files: Vec<_> = entries
        .into_iter()
        .filter(|e| e.kind == EntryKind::File)
        .collect();
    if files.len() > IMAGE_MAX_FILES {
        return Err(RtainerError::ImageFormat {
            message: format!("{} files exceed the {IMAGE_MAX_FILES}-file limit", files.len()),
        });
    }
    let count = files.len() as u8;

    let mut image = Vec::with_capacity(1 + files.iter().map(|f| f.size as usize).sum::<usize>());
    image.push(count);
    for entry in &files {
        let payload = storage.read(&format!("{}/{}", dir.trim_end_matches('/'), entry.name))?;
        image.extend_from_slice(&(payload.len() as u64).to_le_bytes());

        let mut name_field = [0u8; IMAGE_NAME_FIELD];
        let name_bytes = entry.name.as_bytes();
        let len = name_bytes.len().min(MAX_FILENAME_LEN);
        name_field[..len].copy_from_slice(&name_bytes[..len]);
        image.extend_from_slice(&name_field);

        image.extend_from_slice(&payload);
    }

    if let Err(e) = storage.write(image_path, &image) {
        let _ = storage.remove(image_path);
        return Err(e);
    }
    tracing::info!(dir, image_path, count, "image packed");
    Ok(count)
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).filter(|end| *end <= self.data.len()).ok_or(
            RtainerError::ImageFormat {
                message: "image truncated".into(),
            },
        )?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u64_le(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

fn record_name(field: &[u8]) -> Result<String> {
    let mut field: Vec<u8> = field.to_vec();
    // The last byte of the field is forced to NUL on read.
    field[IMAGE_NAME_FIELD - 1] = 0;
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    let name = String::from_utf8_lossy(&field[..end]).into_owned();
    if name.is_empty() || name.contains('/') {
        return Err(RtainerError::ImageFormat {
            message: format!("invalid filename in image record: {name:?}"),
        });
    }
    Ok(name)
}

/// Unpacks the image at `image_path` into `/var/container/<id>/`.
///
/// Missing `/var` and `/var/container` are created on demand. The records
/// are written to a staging directory first and renamed into place only
/// after the whole image parsed; any failure removes the staging tree.
///
/// # Errors
///
/// Fails if the container directory already exists, the image is
/// malformed, or a storage operation fails.
pub fn unpack(storage: &dyn Storage, image_path: &str, id: ContainerId) -> Result<()> {
    ensure_dir(storage, "/var")?;
    ensure_dir(storage, CONTAINER_DIR)?;

    let dest = container_dir(id);
    if storage.exists(&dest) {
        return Err(RtainerError::InvalidState {
            message: format!("container directory already exists: {dest}"),
        });
    }

    let data = storage.read(image_path)?;

    let stage = stage_dir(id);
    if storage.exists(&stage) {
        // Leftover from an interrupted unpack.
        storage.remove_dir_all(&stage)?;
    }
    storage.mkdir(&stage)?;

    match unpack_records(storage, &data, &stage) {
        Ok(count) => {
            storage.rename(&stage, &dest)?;
            tracing::info!(image_path, dest, count, "image unpacked");
            Ok(())
        }
        Err(e) => {
            let _ = storage.remove_dir_all(&stage);
            Err(e)
        }
    }
}

fn unpack_records(storage: &dyn Storage, data: &[u8], stage: &str) -> Result<u8> {
    let mut cursor = Cursor { data, offset: 0 };
    let count = cursor.u8()?;
    for _ in 0..count {
        let size = cursor.u64_le()?;
        let name = record_name(cursor.take(IMAGE_NAME_FIELD)?)?;
        let size = usize::try_from(size).map_err(|_| RtainerError::ImageFormat {
            message: format!("file size too large: {size}"),
        })?;
        let payload = cursor.take(size)?;
        storage.write(&format!("{stage}/{name}"), payload)?;
    }
    Ok(count)
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

    fn setup_dir(storage: &DiskStorage, dir: &str, files: &[(&str, &[u8])]) {
        storage.mkdir(dir).expect("mkdir");
        for (name, content) in files {
            storage.write(&format!("{dir}/{name}"), content).expect("write");
        }
    }

    #[test]
    fn empty_directory_packs_to_single_zero_byte() {
        let (_dir, storage) = storage();
        setup_dir(&storage, "/d", &[]);
        let count = pack(&storage, "/d", "/img").expect("pack");
        assert_eq!(count, 0);
        assert_eq!(storage.read("/img").expect("read"), vec![0u8]);
    }

    #[test]
    fn zero_file_image_unpacks_to_empty_directory() {
        let (_dir, storage) = storage();
        storage.write("/img", &[0u8]).expect("write");
        unpack(&storage, "/img", ContainerId::new(1)).expect("unpack");
        assert!(storage.read_dir("/var/container/1").expect("read_dir").is_empty());
    }

    #[test]
    fn two_file_image_has_exact_layout() {
        let (_dir, storage) = storage();
        setup_dir(&storage, "/d", &[("a", b"x"), ("b", b"yy")]);
        pack(&storage, "/d", "/img").expect("pack");
        let image = storage.read("/img").expect("read");

        assert_eq!(image[0], 2);
        // Record for "a": size 1, name field, payload "x".
        assert_eq!(&image[1..9], &1u64.to_le_bytes());
        assert_eq!(image[9], b'a');
        assert!(image[10..265].iter().all(|b| *b == 0));
        assert_eq!(image[265], b'x');
        // Record for "b": size 2, name field, payload "yy".
        assert_eq!(&image[266..274], &2u64.to_le_bytes());
        assert_eq!(image[274], b'b');
        assert_eq!(&image[530..532], b"yy");
        assert_eq!(image.len(), 532);
    }

    #[test]
    fn pack_skips_subdirectories() {
        let (_dir, storage) = storage();
        setup_dir(&storage, "/d", &[("keep", b"k")]);
        storage.mkdir("/d/sub").expect("mkdir");
        storage.write("/d/sub/skip", b"s").expect("write");
        let count = pack(&storage, "/d", "/img").expect("pack");
        assert_eq!(count, 1);
    }

    #[test]
    fn pack_and_unpack_roundtrip_preserves_contents() {
        let (_dir, storage) = storage();
        let files: Vec<(String, Vec<u8>)> = (0..20)
            .map(|i| (format!("file-{i:02}"), vec![i as u8; i * 7]))
            .collect();
        storage.mkdir("/src").expect("mkdir");
        for (name, content) in &files {
            storage.write(&format!("/src/{name}"), content).expect("write");
        }

        pack(&storage, "/src", "/img").expect("pack");
        unpack(&storage, "/img", ContainerId::new(9)).expect("unpack");

        let entries = storage.read_dir("/var/container/9").expect("read_dir");
        assert_eq!(entries.len(), files.len());
        for (name, content) in &files {
            assert_eq!(&storage.read(&format!("/var/container/9/{name}")).expect("read"), content);
        }
    }

    #[test]
    fn identical_directories_produce_identical_images() {
        let (_dir, storage) = storage();
        setup_dir(&storage, "/d1", &[("b", b"2"), ("a", b"1")]);
        setup_dir(&storage, "/d2", &[("a", b"1"), ("b", b"2")]);
        pack(&storage, "/d1", "/i1").expect("pack");
        pack(&storage, "/d2", "/i2").expect("pack");
        assert_eq!(storage.read("/i1").expect("i1"), storage.read("/i2").expect("i2"));
    }

    #[test]
    fn max_file_count_packs_and_one_more_fails() {
        let (_dir, storage) = storage();
        storage.mkdir("/big").expect("mkdir");
        for i in 0..IMAGE_MAX_FILES {
            storage.write(&format!("/big/f{i:03}"), b"").expect("write");
        }
        assert_eq!(pack(&storage, "/big", "/img").expect("pack"), 255);

        storage.write("/big/straw", b"").expect("write");
        assert!(matches!(
            pack(&storage, "/big", "/img2"),
            Err(RtainerError::ImageFormat { .. })
        ));
        assert!(!storage.exists("/img2"));
    }

    #[test]
    fn long_filenames_are_truncated_on_pack() {
        let (_dir, storage) = storage();
        let long_name = "n".repeat(300);
        storage.mkdir("/d").expect("mkdir");
        storage.write(&format!("/d/{long_name}"), b"v").expect("write");

        pack(&storage, "/d", "/img").expect("pack");
        unpack(&storage, "/img", ContainerId::new(2)).expect("unpack");

        let entries = storage.read_dir("/var/container/2").expect("read_dir");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.len(), MAX_FILENAME_LEN);
        assert_eq!(entries[0].name, "n".repeat(MAX_FILENAME_LEN));
    }

    #[test]
    fn unpack_into_existing_container_dir_fails() {
        let (_dir, storage) = storage();
        storage.write("/img", &[0u8]).expect("write");
        unpack(&storage, "/img", ContainerId::new(3)).expect("first unpack");
        assert!(unpack(&storage, "/img", ContainerId::new(3)).is_err());
    }

    #[test]
    fn truncated_image_leaves_no_container_directory() {
        let (_dir, storage) = storage();
        // Claims one record but carries no bytes for it.
        storage.write("/img", &[1u8]).expect("write");
        assert!(unpack(&storage, "/img", ContainerId::new(4)).is_err());
        assert!(!storage.exists("/var/container/4"));
        assert!(!storage.exists("/var/container/.stage-4"));
    }

    #[test]
    fn record_size_shorter_than_payload_field_fails() {
        let (_dir, storage) = storage();
        let mut image = vec![1u8];
        image.extend_from_slice(&10u64.to_le_bytes());
        let mut name = [0u8; IMAGE_NAME_FIELD];
        name[0] = b'f';
        image.extend_from_slice(&name);
        image.extend_from_slice(b"short");
        storage.write("/img", &image).expect("write");
        assert!(unpack(&storage, "/img", ContainerId::new(5)).is_err());
        assert!(!storage.exists("/var/container/5"));
    }

    #[test]
    fn missing_image_fails_before_creating_directories() {
        let (_dir, storage) = storage();
        assert!(unpack(&storage, "/absent", ContainerId::new(6)).is_err());
        assert!(!storage.exists("/var/container/6"));
    }
}
