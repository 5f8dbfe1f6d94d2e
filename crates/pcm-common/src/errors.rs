//! Error types for the connection monitor.
//!
//! Two families exist and they never mix:
//!
//! - [`MonitorError`] covers every fault raised while an attempt is running
//!   (connect, liveness probe, asynchronous transport fault). These are
//!   caught at the attempt boundary and retried forever.
//! - [`ConfigError`] covers startup faults (unknown transport, missing
//!   credentials, bad settings). These terminate the process before the
//!   supervision loop starts.

use std::time::Duration;
use thiserror::Error;

/// Result type for in-loop connection operations.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;

/// Result type for startup/configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Faults raised while supervising a connection.
///
/// `Clone` is required: the streaming transport stores the first fault it
/// sees and re-raises it on every later probe within the same attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The transport reports the session is no longer connected.
    #[error("Connection lost: {name}")]
    ConnectionLost { name: String },

    /// Polling saw the session closed and no disconnect notification
    /// arrived within the grace window.
    ///
    /// This is the connection-lost outcome of the streaming transport; it
    /// only carries the extra detail of how long the notification was
    /// awaited.
    #[error("Connection lost: {name} dropped without event notification (waited {waited:?})")]
    DroppedWithoutNotification { name: String, waited: Duration },

    /// Generic transport failure (socket, TLS, HTTP, subscription).
    #[error("Transport error: {name} - {reason}")]
    Transport { name: String, reason: String },

    /// The remote end answered with an unexpected protocol reply.
    #[error("Protocol error: {name} - unexpected reply {code}: {reply}")]
    Protocol {
        name: String,
        code: u16,
        reply: String,
    },

    /// A transport operation did not complete in time.
    #[error("Timeout: {name} - {operation}")]
    Timeout { name: String, operation: String },

    /// I/O error.
    #[error("I/O error: {reason}")]
    Io { reason: String },

    /// The durable event log could not be written.
    #[error("Log write failed: {path} - {reason}")]
    Logging { path: String, reason: String },
}

impl MonitorError {
    pub fn connection_lost(name: impl Into<String>) -> Self {
        Self::ConnectionLost { name: name.into() }
    }

    pub fn dropped_without_notification(name: impl Into<String>, waited: Duration) -> Self {
        Self::DroppedWithoutNotification {
            name: name.into(),
            waited,
        }
    }

    pub fn transport(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(name: impl Into<String>, code: u16, reply: impl Into<String>) -> Self {
        Self::Protocol {
            name: name.into(),
            code,
            reply: reply.into(),
        }
    }

    pub fn timeout(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            name: name.into(),
            operation: operation.into(),
        }
    }

    pub fn logging(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Logging {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

/// Startup faults. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported transport type: {selector} (expected one of: ftp, exchangeews)")]
    UnsupportedTransport { selector: String },

    #[error("{transport} does not support unauthenticated connections")]
    MissingCredentials { transport: String },

    #[error("Invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

impl ConfigError {
    pub fn unsupported_transport(selector: impl Into<String>) -> Self {
        Self::UnsupportedTransport {
            selector: selector.into(),
        }
    }

    pub fn missing_credentials(transport: impl Into<String>) -> Self {
        Self::MissingCredentials {
            transport: transport.into(),
        }
    }

    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_error_construction() {
        let error = MonitorError::connection_lost("ftp://@example.org");
        assert!(matches!(error, MonitorError::ConnectionLost { .. }));
        assert_eq!(error.to_string(), "Connection lost: ftp://@example.org");

        let error = MonitorError::dropped_without_notification(
            "exchange://host",
            Duration::from_secs(75),
        );
        assert_eq!(
            error.to_string(),
            "Connection lost: exchange://host dropped without event notification (waited 75s)"
        );

        let error = MonitorError::protocol("ftp://@example.org", 530, "Login incorrect.");
        assert!(error.to_string().contains("530"));
    }

    #[test]
    fn test_sticky_fault_is_cloneable() {
        let error = MonitorError::transport("exchange://host", "stream reset");
        let again = error.clone();
        assert_eq!(error, again);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error: MonitorError = io.into();
        match error {
            MonitorError::Io { reason } => assert!(reason.contains("reset by peer")),
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_config_error_messages() {
        let error = ConfigError::missing_credentials("exchangeews");
        assert_eq!(
            error.to_string(),
            "exchangeews does not support unauthenticated connections"
        );
        let error = ConfigError::unsupported_transport("smtp");
        assert!(error.to_string().contains("smtp"));
    }
}
