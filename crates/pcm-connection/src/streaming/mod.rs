//! Streaming-notification connection variant.
//!
//! Liveness is normally reported by an asynchronous disconnect
//! notification delivered on the transport's own task. That notification
//! can race with, or never arrive relative to, the supervisor's poll, so
//! both observations are reconciled by [`StreamingState`].

mod connection;
mod ews;
mod state;

pub use connection::StreamingConnection;
pub use ews::EwsStreamingTransport;
pub(crate) use ews::ews_endpoint;
pub use state::{ProbeAction, SessionState, StreamingState};

use async_trait::async_trait;
use pcm_common::{MonitorError, MonitorResult};
use std::sync::Arc;
use std::time::Duration;

/// Invoked by the transport when the streaming session ends.
///
/// `Some(fault)` means the session failed; `None` means the server closed
/// it at the end of its normal session lifetime.
pub type DisconnectCallback = Arc<dyn Fn(Option<MonitorError>) + Send + Sync>;

/// Tuning constants for the streaming transport.
#[derive(Debug, Clone)]
pub struct StreamingOptions {
    /// Probe cadence. Probing is cheap, so this is kept short to surface
    /// faults quickly.
    pub keep_alive_interval: Duration,

    /// How long a closed session may go without a disconnect notification
    /// before it counts as dropped
    pub notification_grace: Duration,

    /// Server-side lifetime of one streaming session before it is closed
    /// and must be reopened
    pub session_lifetime: Duration,

    /// Bound on subscribe and on the time to first response byte
    pub request_timeout: Duration,

    /// Longest silence tolerated on an open session. The server sends
    /// status envelopes while idle, so a quiet stream has lost its path.
    pub heartbeat_timeout: Duration,
}

impl Default for StreamingOptions {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(15),
            notification_grace: Duration::from_secs(60),
            session_lifetime: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(90),
        }
    }
}

/// Operations the streaming connection needs from its transport.
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    /// Endpoint descriptor used as the connection name
    fn name(&self) -> String;

    /// Create the server-side subscription.
    async fn subscribe(&mut self) -> MonitorResult<()>;

    /// Open (or reopen) the streaming session. `on_disconnect` fires exactly
    /// once when this session ends.
    async fn open(&mut self, on_disconnect: DisconnectCallback) -> MonitorResult<()>;

    /// Whether the streaming session is currently open
    fn is_open(&self) -> bool;

    /// Tear down the session and any background task.
    async fn close(&mut self);
}
