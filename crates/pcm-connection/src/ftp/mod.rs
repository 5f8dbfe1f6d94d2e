//! FTP connection variant.
//!
//! Liveness is entirely poll-driven: the supervisor checks
//! [`FtpTransport::is_connected`] and then sends `NOOP`. There are no
//! asynchronous events, so every state change happens on the supervisor's
//! own task.

mod client;
mod connection;

pub use client::{FtpControlClient, FtpReply};
pub use connection::FtpConnection;

use async_trait::async_trait;
use pcm_common::MonitorResult;
use std::time::Duration;

/// Default cadence of `NOOP` probes.
pub const DEFAULT_FTP_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default FTP control port.
pub const DEFAULT_FTP_PORT: u16 = 21;

/// Tuning constants for the FTP transport.
#[derive(Debug, Clone)]
pub struct FtpOptions {
    /// Interval between `NOOP` probes
    pub keep_alive_interval: Duration,

    /// Control port
    pub port: u16,

    /// Bound on every control-channel read, write and the TCP connect
    pub io_timeout: Duration,

    /// Extra reconnect-and-retry rounds for `connect` and `NOOP` before a
    /// failure is reported. Zero by default so every probe failure reaches
    /// the monitor, which owns retrying.
    pub retry_attempts: u32,
}

impl Default for FtpOptions {
    fn default() -> Self {
        Self {
            keep_alive_interval: DEFAULT_FTP_KEEP_ALIVE_INTERVAL,
            port: DEFAULT_FTP_PORT,
            io_timeout: Duration::from_secs(30),
            retry_attempts: 0,
        }
    }
}

/// Control-channel operations the FTP connection needs.
#[async_trait]
pub trait FtpTransport: Send + Sync {
    /// Server host name
    fn host(&self) -> &str;

    /// Login name; empty for anonymous sessions
    fn username(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Open the control connection and log in.
    async fn connect(&mut self) -> MonitorResult<()>;

    /// Send `NOOP` and require a positive completion reply.
    async fn noop(&mut self) -> MonitorResult<()>;

    /// Best-effort `QUIT`, then drop the socket.
    async fn quit(&mut self);
}
