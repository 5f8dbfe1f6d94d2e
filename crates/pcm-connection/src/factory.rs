//! Connection factories - one fresh [`Connection`] per supervision attempt.

use crate::connection::Connection;
use crate::ftp::{FtpConnection, FtpControlClient, FtpOptions};
use crate::streaming::{ews_endpoint, EwsStreamingTransport, StreamingConnection, StreamingOptions};
use pcm_common::{ConfigError, ConfigResult, Credentials, MonitorResult, TransportKind};
use tracing::debug;

/// Produces a correctly configured connection for each attempt.
pub trait ConnectionFactory: Send + Sync {
    /// Endpoint descriptor, used when an attempt fails before a connection
    /// exists.
    fn name(&self) -> String;

    /// Build a new, unconnected connection.
    fn create_connection(&self) -> MonitorResult<Box<dyn Connection>>;
}

/// FTP sessions; anonymous when no credentials are given.
pub struct FtpConnectionFactory {
    hostname: String,
    credentials: Option<Credentials>,
    options: FtpOptions,
}

impl FtpConnectionFactory {
    pub fn new(hostname: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self::with_options(hostname, credentials, FtpOptions::default())
    }

    pub fn with_options(
        hostname: impl Into<String>,
        credentials: Option<Credentials>,
        options: FtpOptions,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            credentials,
            options,
        }
    }
}

impl ConnectionFactory for FtpConnectionFactory {
    fn name(&self) -> String {
        let user = self
            .credentials
            .as_ref()
            .map(|c| c.username.as_str())
            .unwrap_or("");
        format!("ftp://{}@{}", user, self.hostname)
    }

    fn create_connection(&self) -> MonitorResult<Box<dyn Connection>> {
        let client = FtpControlClient::new(&self.hostname, self.credentials.clone(), &self.options);
        Ok(Box::new(FtpConnection::new(client, &self.options)))
    }
}

/// Exchange EWS streaming subscriptions. Credentials are mandatory.
pub struct EwsConnectionFactory {
    hostname: String,
    credentials: Credentials,
    options: StreamingOptions,
}

impl EwsConnectionFactory {
    pub fn new(hostname: impl Into<String>, credentials: Credentials) -> Self {
        Self::with_options(hostname, credentials, StreamingOptions::default())
    }

    pub fn with_options(
        hostname: impl Into<String>,
        credentials: Credentials,
        options: StreamingOptions,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            credentials,
            options,
        }
    }
}

impl ConnectionFactory for EwsConnectionFactory {
    fn name(&self) -> String {
        format!("exchange://{}", ews_endpoint(&self.hostname))
    }

    fn create_connection(&self) -> MonitorResult<Box<dyn Connection>> {
        let transport =
            EwsStreamingTransport::new(&self.hostname, self.credentials.clone(), &self.options)?;
        Ok(Box::new(StreamingConnection::new(transport, &self.options)))
    }
}

/// Pure construction; never touches the network.
///
/// Fails if the EWS transport is requested without credentials.
pub fn build_factory(
    kind: TransportKind,
    hostname: &str,
    credentials: Option<Credentials>,
) -> ConfigResult<Box<dyn ConnectionFactory>> {
    debug!("Building {} connection factory for {}", kind, hostname);
    match kind {
        TransportKind::Ftp => Ok(Box::new(FtpConnectionFactory::new(hostname, credentials))),
        TransportKind::ExchangeEws => {
            let credentials =
                credentials.ok_or_else(|| ConfigError::missing_credentials(kind.as_str()))?;
            Ok(Box::new(EwsConnectionFactory::new(hostname, credentials)))
        }
    }
}
