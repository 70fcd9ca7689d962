//! Integration tests for the isolation controllers under running containers.
//!
//! These tests are implemented in:
//! `crates/rtainer-runtime/tests/isolation.rs`
//!
//! Covered scenarios:
//! - `wrapper_applies_namespaces_cgroup_and_chroot`: The wrapper task verifies its memberships before user code
//! - `both_containers_own_virtual_pid_one`: The same virtual PID resolves per namespace
//! - `queues_are_confined_to_their_namespace_with_root_override`: Cross-namespace IPC denied, root allowed
//! - `cpu_quota_gates_the_container_task`: Tick accounting gates an over-quota cgroup
