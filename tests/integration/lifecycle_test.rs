//! Integration tests for the container lifecycle.
//!
//! These tests are implemented in:
//! `crates/rtainer-runtime/tests/lifecycle.rs`
//!
//! Covered scenarios:
//! - `create_unpacks_image_into_container_dir`: Create unpacks the image into `/var/container/<id>`
//! - `full_lifecycle_runs_program_to_completion`: Start runs the program and reconciles to STOPPED
//! - `stop_is_not_idempotent_and_clears_the_task`: Stopping a stopped container fails
//! - `delete_removes_container_dir_but_not_images`: Delete leaves the image store untouched
//! - `failed_create_leaves_no_leaked_slots`: Construction unwind frees every table slot
//! - `container_ids_are_never_reused`: Ids stay monotonic across delete/create
//! - `reconcile_folds_killed_task_into_stopped`: The daemon pass catches exited tasks
