//! Namespace controllers.
//!
//! Each namespace kind virtualises one class of system identity: PID
//! namespaces issue per-container virtual PIDs, IPC namespaces gate access
//! to shared communication objects. Both keep a distinguished root
//! namespace that exists for the whole process lifetime.

pub mod ipc;
pub mod pid;

pub use ipc::{IpcNamespaceId, IpcObjectKind, IpcRegistry};
pub use pid::{PidNamespaceId, PidNamespaceSet};
