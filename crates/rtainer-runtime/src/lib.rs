//! # rtainer-runtime
//!
//! Container lifecycle on top of the isolation subsystem: the container
//! manager composes a cgroup, a PID namespace, an IPC namespace, and an
//! unpacked image into a running task, holding the task at a startup gate
//! until isolation is fully applied.

pub mod container;
pub mod daemon;
pub mod exec;
pub mod gate;
pub mod loader;
pub mod manager;

pub use container::ContainerInfo;
pub use exec::ThreadExecutive;
pub use loader::{EchoLoader, ProgramLoader};
pub use manager::ContainerManager;
