//! Connection Monitor - the supervision loop.
//!
//! Per attempt:
//! 1. ask the factory for a fresh connection
//! 2. connect, log "Connection established"
//! 3. sleep for the connection's keep-alive interval, check `is_connected`,
//!    run the liveness probe, repeat
//! 4. on any fault: close the connection, classify the fault with the
//!    [`FailureTracker`], and start over
//!
//! There is no retry limit and no backoff; a continued outage only costs a
//! short fixed pause per attempt.

use crate::event_log::EventLog;
use crate::failure_tracker::{FailureTracker, DEFAULT_FAILURE_GRACE_PERIOD};
use pcm_common::{MonitorError, MonitorResult};
use pcm_connection::{Connection, ConnectionFactory, DebugCallback};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

pub const CONNECTION_ESTABLISHED: &str = "Connection established";
pub const KEEP_ALIVE_SENT: &str = "Keep alive sent successfully";
pub const CONTINUED_FAILURE: &str = "Failure considered part of last failure, sleeping";

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Faults within this window of the last logged failure are the same
    /// outage
    pub failure_grace_period: Duration,

    /// Pause after a continued (suppressed) failure before the next attempt
    pub continued_failure_pause: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            failure_grace_period: DEFAULT_FAILURE_GRACE_PERIOD,
            continued_failure_pause: Duration::from_secs(1),
        }
    }
}

/// How one attempt ended. Attempts always end in a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Logged as a new outage
    NewFailure(MonitorError),
    /// Part of the last logged outage; suppressed
    ContinuedFailure(MonitorError),
}

impl AttemptOutcome {
    pub fn fault(&self) -> &MonitorError {
        match self {
            AttemptOutcome::NewFailure(fault) | AttemptOutcome::ContinuedFailure(fault) => fault,
        }
    }
}

pub struct ConnectionMonitor {
    factory: Box<dyn ConnectionFactory>,
    log: Arc<EventLog>,
    failures: FailureTracker,
    options: SupervisorOptions,
    attempts: u64,
}

impl ConnectionMonitor {
    pub fn new(factory: Box<dyn ConnectionFactory>, log: EventLog) -> Self {
        Self::with_options(factory, log, SupervisorOptions::default())
    }

    pub fn with_options(
        factory: Box<dyn ConnectionFactory>,
        log: EventLog,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            factory,
            log: Arc::new(log),
            failures: FailureTracker::new(options.failure_grace_period),
            options,
            attempts: 0,
        }
    }

    /// Logged failure history.
    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Supervise forever. Only returns if the task is cancelled.
    pub async fn run(&mut self) {
        info!("Monitoring {}", self.factory.name());
        loop {
            let outcome = self.run_attempt().await;
            debug!(
                "Attempt {} for {} ended: {}",
                self.attempts,
                self.factory.name(),
                outcome.fault()
            );
        }
    }

    /// One complete attempt: create, connect, keep alive until a fault,
    /// release, classify.
    pub async fn run_attempt(&mut self) -> AttemptOutcome {
        self.attempts += 1;

        let (name, fault) = match self.factory.create_connection() {
            Ok(mut connection) => {
                connection.set_debug_callback(self.debug_callback());
                let name = connection.name();
                let fault = self.supervise(connection.as_mut()).await;
                connection.close().await;
                (name, fault)
            }
            Err(fault) => (self.factory.name(), fault),
        };

        self.classify(&name, fault).await
    }

    async fn supervise(&self, connection: &mut dyn Connection) -> MonitorError {
        match self.keep_connection_alive(connection).await {
            Ok(never) => match never {},
            Err(fault) => fault,
        }
    }

    async fn keep_connection_alive(
        &self,
        connection: &mut dyn Connection,
    ) -> MonitorResult<Infallible> {
        let name = connection.name();

        connection.connect().await?;
        self.log.log(&name, CONNECTION_ESTABLISHED);

        let interval = connection.keep_alive_interval();
        loop {
            sleep(interval).await;

            if !connection.is_connected() {
                return Err(MonitorError::connection_lost(&name));
            }

            connection.keep_alive().await?;
            self.log.debug(&name, KEEP_ALIVE_SENT);
        }
    }

    async fn classify(&mut self, name: &str, fault: MonitorError) -> AttemptOutcome {
        if self.failures.is_failure_new(Instant::now()) {
            self.log.log(name, &format!("Failure: {}", fault));
            AttemptOutcome::NewFailure(fault)
        } else {
            self.log.debug(name, CONTINUED_FAILURE);
            sleep(self.options.continued_failure_pause).await;
            AttemptOutcome::ContinuedFailure(fault)
        }
    }

    fn debug_callback(&self) -> DebugCallback {
        let log = Arc::clone(&self.log);
        Arc::new(move |name: &str, message: &str| log.debug(name, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Shared script and counters for the scripted connections.
    #[derive(Default)]
    struct Script {
        connect_results: VecDeque<MonitorResult<()>>,
        probe_results: VecDeque<MonitorResult<()>>,
        report_disconnected: bool,
        created: u32,
        probes: u32,
        closed: u32,
    }

    struct ScriptedConnection(Arc<Mutex<Script>>);

    #[async_trait]
    impl Connection for ScriptedConnection {
        fn name(&self) -> String {
            "test://scripted".to_string()
        }

        fn keep_alive_interval(&self) -> Duration {
            Duration::from_secs(30)
        }

        fn is_connected(&self) -> bool {
            !self.0.lock().report_disconnected
        }

        async fn connect(&mut self) -> MonitorResult<()> {
            self.0.lock().connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn keep_alive(&mut self) -> MonitorResult<()> {
            let mut script = self.0.lock();
            script.probes += 1;
            script.probe_results.pop_front().unwrap_or(Ok(()))
        }

        async fn close(&mut self) {
            self.0.lock().closed += 1;
        }
    }

    struct ScriptedFactory(Arc<Mutex<Script>>);

    impl ConnectionFactory for ScriptedFactory {
        fn name(&self) -> String {
            "test://scripted".to_string()
        }

        fn create_connection(&self) -> MonitorResult<Box<dyn Connection>> {
            self.0.lock().created += 1;
            Ok(Box::new(ScriptedConnection(Arc::clone(&self.0))))
        }
    }

    fn monitor_with(script: Script) -> (ConnectionMonitor, Arc<Mutex<Script>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let script = Arc::new(Mutex::new(script));
        let monitor = ConnectionMonitor::new(
            Box::new(ScriptedFactory(Arc::clone(&script))),
            EventLog::new(dir.path().join("monitor.log"), false),
        );
        (monitor, script, dir)
    }

    fn log_lines(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join("monitor.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn refused() -> MonitorError {
        MonitorError::transport("test://scripted", "connection refused")
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_runs_until_probe_fails() {
        let (mut monitor, script, dir) = monitor_with(Script {
            probe_results: VecDeque::from(vec![Ok(()), Ok(()), Ok(()), Err(refused())]),
            ..Script::default()
        });

        let started = Instant::now();
        let outcome = monitor.run_attempt().await;

        assert_eq!(outcome, AttemptOutcome::NewFailure(refused()));
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(script.lock().probes, 4);
        assert_eq!(script.lock().closed, 1);

        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(CONNECTION_ESTABLISHED));
        assert!(lines[1].contains("Failure: Transport error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_connection_is_lost_without_probe() {
        let (mut monitor, script, _dir) = monitor_with(Script {
            report_disconnected: true,
            ..Script::default()
        });

        let outcome = monitor.run_attempt().await;
        assert!(matches!(
            outcome.fault(),
            MonitorError::ConnectionLost { .. }
        ));
        assert_eq!(script.lock().probes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_connect_failures_are_deduplicated() {
        let (mut monitor, script, dir) = monitor_with(Script {
            connect_results: VecDeque::from(vec![Err(refused()); 5]),
            ..Script::default()
        });

        assert!(matches!(monitor.run_attempt().await, AttemptOutcome::NewFailure(_)));

        let started = Instant::now();
        assert!(matches!(monitor.run_attempt().await, AttemptOutcome::ContinuedFailure(_)));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(matches!(monitor.run_attempt().await, AttemptOutcome::ContinuedFailure(_)));

        // Past the grace period the same outage is logged again
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(matches!(monitor.run_attempt().await, AttemptOutcome::NewFailure(_)));

        assert_eq!(monitor.attempts(), 4);
        assert_eq!(script.lock().created, 4);
        assert_eq!(script.lock().closed, 4);
        assert_eq!(monitor.failures().failures().len(), 2);
        assert_eq!(log_lines(&dir).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_failure_is_logged_under_factory_name() {
        struct BrokenFactory;

        impl ConnectionFactory for BrokenFactory {
            fn name(&self) -> String {
                "test://broken".to_string()
            }

            fn create_connection(&self) -> MonitorResult<Box<dyn Connection>> {
                Err(MonitorError::transport("test://broken", "TLS backend unavailable"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut monitor = ConnectionMonitor::new(
            Box::new(BrokenFactory),
            EventLog::new(dir.path().join("monitor.log"), false),
        );

        assert!(matches!(monitor.run_attempt().await, AttemptOutcome::NewFailure(_)));
        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[test://broken] "));
    }
}
