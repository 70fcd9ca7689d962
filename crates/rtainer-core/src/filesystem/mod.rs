//! Filesystem access for tasks.
//!
//! The flash layer and the filesystem implementation are external
//! collaborators; [`storage::Storage`] pins down the narrow interface the
//! isolation subsystem needs from them. [`chroot::TaskFs`] routes every
//! path-bearing operation through the per-task root-path rewrite.

pub mod chroot;
pub mod storage;

pub use chroot::TaskFs;
pub use storage::{DirEntry, DiskStorage, EntryKind, Metadata, Storage};
