//! FTP implementation of [`Connection`].

use super::{FtpOptions, FtpTransport};
use crate::connection::Connection;
use async_trait::async_trait;
use pcm_common::MonitorResult;
use std::time::Duration;
use tracing::debug;

/// Poll-driven FTP connection: `Disconnected -> Connected` on `connect()`,
/// back to `Disconnected` when the transport drops or `NOOP` fails.
pub struct FtpConnection<T: FtpTransport> {
    transport: T,
    keep_alive_interval: Duration,
}

impl<T: FtpTransport> FtpConnection<T> {
    pub fn new(transport: T, options: &FtpOptions) -> Self {
        Self {
            transport,
            keep_alive_interval: options.keep_alive_interval,
        }
    }
}

#[async_trait]
impl<T: FtpTransport> Connection for FtpConnection<T> {
    fn name(&self) -> String {
        format!("ftp://{}@{}", self.transport.username(), self.transport.host())
    }

    fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn connect(&mut self) -> MonitorResult<()> {
        self.transport.connect().await
    }

    async fn keep_alive(&mut self) -> MonitorResult<()> {
        self.transport.noop().await
    }

    async fn close(&mut self) {
        self.transport.quit().await;
        debug!("Closed {}", self.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcm_common::MonitorError;

    #[derive(Default)]
    struct ScriptedFtp {
        connected: bool,
        fail_noop: bool,
        noops: u32,
        quits: u32,
    }

    #[async_trait]
    impl FtpTransport for ScriptedFtp {
        fn host(&self) -> &str {
            "ftp.example.org"
        }

        fn username(&self) -> &str {
            "alice"
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> MonitorResult<()> {
            self.connected = true;
            Ok(())
        }

        async fn noop(&mut self) -> MonitorResult<()> {
            self.noops += 1;
            if self.fail_noop {
                self.connected = false;
                return Err(MonitorError::transport("ftp://alice@ftp.example.org", "broken pipe"));
            }
            Ok(())
        }

        async fn quit(&mut self) {
            self.quits += 1;
            self.connected = false;
        }
    }

    #[tokio::test]
    async fn test_connection_name_and_interval() {
        let connection = FtpConnection::new(ScriptedFtp::default(), &FtpOptions::default());
        assert_eq!(connection.name(), "ftp://alice@ftp.example.org");
        assert_eq!(connection.keep_alive_interval(), Duration::from_secs(30));
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_keep_alive_sends_noop() {
        let mut connection = FtpConnection::new(ScriptedFtp::default(), &FtpOptions::default());
        connection.connect().await.unwrap();
        assert!(connection.is_connected());

        connection.keep_alive().await.unwrap();
        connection.keep_alive().await.unwrap();
        assert_eq!(connection.transport.noops, 2);
    }

    #[tokio::test]
    async fn test_failed_noop_disconnects() {
        let mut connection = FtpConnection::new(
            ScriptedFtp {
                fail_noop: true,
                ..ScriptedFtp::default()
            },
            &FtpOptions::default(),
        );
        connection.connect().await.unwrap();

        assert!(connection.keep_alive().await.is_err());
        assert!(!connection.is_connected());
    }

    #[tokio::test]
    async fn test_close_quits_transport() {
        let mut connection = FtpConnection::new(ScriptedFtp::default(), &FtpOptions::default());
        connection.connect().await.unwrap();
        connection.close().await;
        assert_eq!(connection.transport.quits, 1);
        assert!(!connection.is_connected());
    }
}
