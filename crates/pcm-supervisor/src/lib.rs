//! # PCM Supervisor
//!
//! Keeps one persistent connection open forever: connect, probe on the
//! connection's cadence, and on any fault release the connection, decide
//! whether the fault is a new outage or the continuation of the last one,
//! and start over.

pub mod event_log;
pub mod failure_tracker;
pub mod monitor;
pub mod settings;

pub use event_log::EventLog;
pub use failure_tracker::{FailureTracker, DEFAULT_FAILURE_GRACE_PERIOD};
pub use monitor::{AttemptOutcome, ConnectionMonitor, SupervisorOptions};
pub use settings::MonitorSettings;
