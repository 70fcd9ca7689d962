//! Integration tests for the image codec and store.
//!
//! These tests are implemented in:
//! `crates/rtainer-image/src/codec.rs` (`#[cfg(test)]`) and
//! `crates/rtainer-image/src/store.rs` (`#[cfg(test)]`).
//!
//! Covered scenarios:
//! - `two_file_image_has_exact_layout`: Bit-exact record layout
//! - `zero_file_image_unpacks_to_empty_directory`: The one-byte `0x00` image
//! - `max_file_count_packs_and_one_more_fails`: 255 packs, 256 fails
//! - `long_filenames_are_truncated_on_pack`: 255-byte name truncation
//! - `truncated_image_leaves_no_container_directory`: Staged unpack cleans up
//! - `identical_directories_produce_identical_images`: Deterministic output
