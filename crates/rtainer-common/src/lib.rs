//! # rtainer-common
//!
//! Shared foundation for the rtainer workspace: the unified error type,
//! domain primitive types, capacity constants, and the runtime configuration
//! model.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use error::{Result, RtainerError};
