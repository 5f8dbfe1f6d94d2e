//! Durable event log plus debug echo.
//!
//! Every logged event becomes one line `[<connection>] <timestamp>: <message>`
//! appended to the log file. The file is opened, written and closed for each
//! line so external readers can tail it safely. Console output goes through
//! `tracing` and is only visible when debug output is enabled.

use chrono::{DateTime, Local};
use pcm_common::{MonitorError, MonitorResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format one log line (without trailing newline).
pub fn format_line(connection: &str, timestamp: DateTime<Local>, message: &str) -> String {
    format!(
        "[{}] {}: {}",
        connection,
        timestamp.format(TIMESTAMP_FORMAT),
        message
    )
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    debug_output: bool,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, debug_output: bool) -> Self {
        Self {
            path: path.into(),
            debug_output,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn debug_output(&self) -> bool {
        self.debug_output
    }

    /// Record an event durably. Write failures are reported but never
    /// propagate into the supervision loop.
    pub fn log(&self, connection: &str, message: &str) {
        let line = format_line(connection, Local::now(), message);
        if self.debug_output {
            info!("{}", line);
        }
        if let Err(e) = self.append(&line) {
            warn!("{}", e);
        }
    }

    /// Console-only event, shown when debug output is enabled.
    pub fn debug(&self, connection: &str, message: &str) {
        if self.debug_output {
            debug!("{}", format_line(connection, Local::now(), message));
        }
    }

    fn append(&self, line: &str) -> MonitorResult<()> {
        let path = self.path.display().to_string();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MonitorError::logging(&path, format!("Failed to create log directory: {}", e))
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MonitorError::logging(&path, format!("Failed to open log file: {}", e)))?;

        writeln!(file, "{}", line)
            .map_err(|e| MonitorError::logging(&path, format!("Failed to write log file: {}", e)))?;
        Ok(())
    }
}
