//! Minimal FTP control-channel client (login, `NOOP`, `QUIT`).
//!
//! No data connections are ever opened; the monitor only needs to know the
//! control session is alive.

use super::{FtpOptions, FtpTransport};
use async_trait::async_trait;
use pcm_common::{Credentials, MonitorError, MonitorResult};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

const ANONYMOUS_USER: &str = "anonymous";
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// 421: service not available, closing control connection.
const SERVICE_CLOSING: u16 = 421;

/// A complete (possibly multi-line) server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpReply {
    pub code: u16,
    pub text: String,
}

impl FtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_positive_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// Splits a reply line into `(code, continues, text)`.
///
/// `"220-Welcome"` opens a multi-line reply, `"220 Ready"` ends one.
fn parse_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let code: u16 = line[..3].parse().ok()?;
    let rest = &line[3..];
    match rest.as_bytes().first() {
        None => Some((code, false, "")),
        Some(b' ') => Some((code, false, &rest[1..])),
        Some(b'-') => Some((code, true, &rest[1..])),
        Some(_) => None,
    }
}

/// FTP control session over a plain TCP socket.
pub struct FtpControlClient {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    io_timeout: Duration,
    retry_attempts: u32,
    stream: Option<BufReader<TcpStream>>,
}

impl FtpControlClient {
    pub fn new(host: impl Into<String>, credentials: Option<Credentials>, options: &FtpOptions) -> Self {
        Self {
            host: host.into(),
            port: options.port,
            credentials,
            io_timeout: options.io_timeout,
            retry_attempts: options.retry_attempts,
            stream: None,
        }
    }

    fn endpoint(&self) -> String {
        format!("ftp://{}@{}", self.username(), self.host)
    }

    async fn read_reply(&mut self) -> MonitorResult<FtpReply> {
        let name = self.endpoint();
        let io_timeout = self.io_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MonitorError::connection_lost(&name))?;

        let mut multi_line_code: Option<u16> = None;
        let mut text = String::new();

        loop {
            let mut line = String::new();
            let read = timeout(io_timeout, stream.read_line(&mut line))
                .await
                .map_err(|_| MonitorError::timeout(&name, "read reply"))??;
            if read == 0 {
                return Err(MonitorError::transport(
                    &name,
                    "control connection closed by server",
                ));
            }

            match (multi_line_code, parse_reply_line(&line)) {
                (None, Some((code, false, body))) => {
                    return Ok(FtpReply {
                        code,
                        text: body.to_string(),
                    });
                }
                (None, Some((code, true, body))) => {
                    multi_line_code = Some(code);
                    text.push_str(body);
                }
                (None, None) => {
                    return Err(MonitorError::transport(
                        &name,
                        format!("malformed reply: {}", line.trim_end()),
                    ));
                }
                (Some(expected), Some((code, false, body))) if code == expected => {
                    text.push('\n');
                    text.push_str(body);
                    return Ok(FtpReply { code, text });
                }
                (Some(_), _) => {
                    text.push('\n');
                    text.push_str(line.trim_end());
                }
            }
        }
    }

    async fn send_command(&mut self, command: &str) -> MonitorResult<FtpReply> {
        let name = self.endpoint();
        let io_timeout = self.io_timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MonitorError::connection_lost(&name))?;

        if command.starts_with("PASS ") {
            debug!("{} >> PASS ****", name);
        } else {
            debug!("{} >> {}", name, command);
        }

        let line = format!("{}\r\n", command);
        timeout(io_timeout, stream.get_mut().write_all(line.as_bytes()))
            .await
            .map_err(|_| MonitorError::timeout(&name, format!("send {}", command_verb(command))))??;

        let reply = self.read_reply().await?;
        debug!("{} << {} {}", name, reply.code, reply.text);
        Ok(reply)
    }

    /// Sends a command and drops the socket if the session is gone.
    async fn exchange(&mut self, command: &str) -> MonitorResult<FtpReply> {
        let result = self.send_command(command).await;
        match &result {
            Err(_) => self.stream = None,
            Ok(reply) if reply.code == SERVICE_CLOSING => self.stream = None,
            Ok(_) => {}
        }
        result
    }

    async fn login(&mut self) -> MonitorResult<()> {
        let name = self.endpoint();

        let greeting = self.read_reply().await?;
        if greeting.code != 220 {
            return Err(MonitorError::protocol(&name, greeting.code, greeting.text));
        }

        let (user, pass) = match &self.credentials {
            Some(creds) => (creds.username.clone(), creds.password.clone()),
            None => (ANONYMOUS_USER.to_string(), ANONYMOUS_PASSWORD.to_string()),
        };

        let reply = self.send_command(&format!("USER {}", user)).await?;
        let reply = if reply.is_positive_intermediate() {
            self.send_command(&format!("PASS {}", pass)).await?
        } else {
            reply
        };

        if !reply.is_positive_completion() {
            return Err(MonitorError::protocol(&name, reply.code, reply.text));
        }
        Ok(())
    }

    /// Fresh TCP connection plus login. Leaves the client disconnected on
    /// failure.
    async fn open_session(&mut self) -> MonitorResult<()> {
        self.stream = None;
        let name = self.endpoint();
        let addr = format!("{}:{}", self.host, self.port);

        let socket = timeout(self.io_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| MonitorError::timeout(&name, "connect"))?
            .map_err(|e| MonitorError::transport(&name, format!("connect to {} failed: {}", addr, e)))?;
        self.stream = Some(BufReader::new(socket));

        if let Err(e) = self.login().await {
            self.stream = None;
            return Err(e);
        }

        debug!("{} logged in", name);
        Ok(())
    }

    async fn noop_once(&mut self) -> MonitorResult<()> {
        let reply = self.exchange("NOOP").await?;
        if !reply.is_positive_completion() {
            return Err(MonitorError::protocol(self.endpoint(), reply.code, reply.text));
        }
        Ok(())
    }
}

fn command_verb(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or(command)
}

#[async_trait]
impl FtpTransport for FtpControlClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn username(&self) -> &str {
        self.credentials
            .as_ref()
            .map(|c| c.username.as_str())
            .unwrap_or("")
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> MonitorResult<()> {
        let mut result = self.open_session().await;
        for _ in 0..self.retry_attempts {
            let Err(e) = &result else { break };
            debug!("{} connect failed ({}), retrying", self.endpoint(), e);
            result = self.open_session().await;
        }
        result
    }

    async fn noop(&mut self) -> MonitorResult<()> {
        let mut result = self.noop_once().await;
        for _ in 0..self.retry_attempts {
            let Err(e) = &result else { break };
            debug!("{} NOOP failed ({}), retrying on a new session", self.endpoint(), e);
            result = match self.open_session().await {
                Ok(()) => self.noop_once().await,
                Err(e) => Err(e),
            };
        }
        result
    }

    async fn quit(&mut self) {
        if self.stream.is_none() {
            return;
        }
        if let Err(e) = self.send_command("QUIT").await {
            warn!("{} QUIT failed: {}", self.endpoint(), e);
        }
        self.stream = None;
    }
}
