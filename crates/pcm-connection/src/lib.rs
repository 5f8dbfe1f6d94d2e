//! # PCM Connection
//!
//! The connection capability surface supervised by the monitor, and the
//! transports that implement it.
//!
//! - [`Connection`] is the per-attempt capability (connect, probe, close).
//! - [`ftp`] holds the poll-driven FTP variant.
//! - [`streaming`] holds the notification-driven variant and its state
//!   machine, plus the Exchange Web Services transport.
//! - [`factory`] turns a transport selector into a [`ConnectionFactory`].

pub mod connection;
pub mod factory;
pub mod ftp;
pub mod streaming;

pub use connection::{Connection, DebugCallback};
pub use factory::{build_factory, ConnectionFactory, EwsConnectionFactory, FtpConnectionFactory};
pub use ftp::{FtpConnection, FtpControlClient, FtpOptions, FtpTransport};
pub use streaming::{
    DisconnectCallback, EwsStreamingTransport, ProbeAction, SessionState, StreamingConnection,
    StreamingOptions, StreamingState, StreamingTransport,
};
