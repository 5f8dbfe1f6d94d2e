//! # PCM Common
//!
//! Common types shared across the persistent connection monitor crates.
//!
//! This crate provides the error taxonomy used by the supervisor and the
//! transports, plus the small value types (transport selector, credentials)
//! that cross crate boundaries.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{ConfigError, ConfigResult, MonitorError, MonitorResult};
pub use types::{Credentials, TransportKind};
