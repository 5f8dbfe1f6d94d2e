use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use pcm_common::{Credentials, TransportKind};
use pcm_connection::build_factory;
use pcm_supervisor::{ConnectionMonitor, EventLog, MonitorSettings};

/// Persistent connection monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport type: ftp or exchangeews (case-insensitive)
    #[arg(value_name = "TYPE")]
    transport: String,

    /// Host to connect to
    hostname: String,

    /// Append-only event log
    #[arg(value_name = "LOG_FILE")]
    log_file: PathBuf,

    /// Username (exchangeews requires it)
    #[arg(requires = "password")]
    username: Option<String>,

    /// Password (exchangeews requires it)
    password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (settings, problems) = MonitorSettings::load();
    initialize_logging(settings.debug_output);
    for problem in &problems {
        warn!("Ignoring setting: {}", problem);
    }

    // Startup faults are fatal and never retried
    let kind: TransportKind = args.transport.parse()?;
    let credentials = Credentials::from_parts(args.username.as_deref(), args.password.as_deref());
    let factory = build_factory(kind, &args.hostname, credentials)?;

    info!("Event log: {}", args.log_file.display());
    let log = EventLog::new(args.log_file, settings.debug_output);

    let mut monitor = ConnectionMonitor::new(factory, log);
    monitor.run().await;

    Ok(())
}

/// Default tracing filter. Debug output is limited to the monitor's own
/// crates; HTTP and TLS libraries stay at `warn`.
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "warn,pcm_connection=debug,pcm_supervisor=debug,connection_monitor=debug"
    } else {
        "warn"
    }
}

fn initialize_logging(debug: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(debug))),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
