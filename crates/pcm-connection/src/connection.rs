//! Connection trait - the capability the supervisor drives on every attempt.
//!
//! A connection is created fresh for each attempt, owned exclusively by the
//! supervisor for that attempt and closed on every exit path.

use async_trait::async_trait;
use pcm_common::MonitorResult;
use std::sync::Arc;
use std::time::Duration;

/// Observer for human-readable debug events: `(connection name, message)`.
pub type DebugCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// A transport-specific persistent session.
#[async_trait]
pub trait Connection: Send {
    /// Human-readable endpoint descriptor, used as the log prefix.
    fn name(&self) -> String;

    /// How long the supervisor sleeps between liveness checks.
    fn keep_alive_interval(&self) -> Duration;

    /// Whether the transport still believes the session is up.
    fn is_connected(&self) -> bool;

    /// Establish the session.
    async fn connect(&mut self) -> MonitorResult<()>;

    /// Transport-specific liveness probe. Any error ends the attempt.
    async fn keep_alive(&mut self) -> MonitorResult<()>;

    /// Release sockets, subscriptions and background tasks. Idempotent.
    async fn close(&mut self);

    /// Install the debug observer. Connections without asynchronous
    /// events may ignore it.
    fn set_debug_callback(&mut self, _callback: DebugCallback) {}
}
