//! # rtainer-image
//!
//! The container image format and its store.
//!
//! An image is a single blob encoding a flat directory of up to 255 files:
//! one count byte, then per file an 8-byte little-endian size, a 256-byte
//! NUL-terminated zero-padded filename, and the payload. No checksums, no
//! alignment padding, no subdirectories.

pub mod codec;
pub mod store;

pub use codec::{pack, unpack};
pub use store::ImageStore;
