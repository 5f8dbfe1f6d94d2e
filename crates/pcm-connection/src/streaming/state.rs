//! Shared state reconciling disconnect notifications with polling.
//!
//! The notification handler and `keep_alive()` run on different tasks; both
//! go through a single `Mutex<StreamingState>` and each call below is one
//! read-modify-write.

use pcm_common::MonitorError;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Session state within one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Session believed open
    Open,
    /// Polling saw the session closed at `since`; no notification yet
    AwaitingNotification { since: Instant },
    /// Server closed the session at the end of its lifetime; reopen pending
    GracefullyClosing,
    /// Sticky fault. Never cleared within an attempt.
    Faulted(MonitorError),
}

/// What `keep_alive()` must do after consulting the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeAction {
    /// Session is open
    Healthy,
    /// Graceful close pending: reopen the session, then call
    /// [`StreamingState::reopened`]
    Reopen,
    /// Session closed but still inside the notification grace window
    Waiting { elapsed: Duration },
    /// Raise this fault
    Fail(MonitorError),
}

#[derive(Debug)]
pub struct StreamingState {
    name: String,
    notification_grace: Duration,
    state: SessionState,
}

impl StreamingState {
    pub fn new(name: impl Into<String>, notification_grace: Duration) -> Self {
        Self {
            name: name.into(),
            notification_grace,
            state: SessionState::Open,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.state, SessionState::Faulted(_))
    }

    /// Start of an attempt: everything back to `Open`.
    pub fn reset(&mut self) {
        self.state = SessionState::Open;
    }

    /// Disconnect notification from the transport.
    pub fn on_disconnect(&mut self, fault: Option<MonitorError>) {
        if self.is_faulted() {
            return;
        }
        self.state = match fault {
            Some(fault) => SessionState::Faulted(fault),
            None => SessionState::GracefullyClosing,
        };
    }

    /// Poll step. `session_open` is the transport's own view, `now` the
    /// probe time.
    pub fn probe(&mut self, session_open: bool, now: Instant) -> ProbeAction {
        match self.state.clone() {
            SessionState::Faulted(fault) => ProbeAction::Fail(fault),
            SessionState::GracefullyClosing => ProbeAction::Reopen,
            SessionState::Open | SessionState::AwaitingNotification { .. } if session_open => {
                self.state = SessionState::Open;
                ProbeAction::Healthy
            }
            SessionState::Open => {
                debug!("{} polled closed, waiting for disconnect notification", self.name);
                self.state = SessionState::AwaitingNotification { since: now };
                ProbeAction::Waiting {
                    elapsed: Duration::ZERO,
                }
            }
            SessionState::AwaitingNotification { since } => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed > self.notification_grace {
                    let fault = MonitorError::dropped_without_notification(&self.name, elapsed);
                    self.state = SessionState::Faulted(fault.clone());
                    ProbeAction::Fail(fault)
                } else {
                    ProbeAction::Waiting { elapsed }
                }
            }
        }
    }

    /// The graceful-close reopen succeeded. Returns false if a fault
    /// arrived meanwhile, in which case the fault stands.
    pub fn reopened(&mut self) -> bool {
        if self.is_faulted() {
            return false;
        }
        self.state = SessionState::Open;
        true
    }

    /// The graceful-close reopen failed.
    pub fn reopen_failed(&mut self, fault: MonitorError) {
        if !self.is_faulted() {
            self.state = SessionState::Faulted(fault);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(60);

    fn new_state() -> StreamingState {
        StreamingState::new("exchange://test", GRACE)
    }

    #[test]
    fn test_open_session_is_healthy() {
        let mut state = new_state();
        assert_eq!(state.probe(true, Instant::now()), ProbeAction::Healthy);
        assert_eq!(state.state(), &SessionState::Open);
    }

    #[test]
    fn test_closed_poll_waits_then_fails_after_grace() {
        let mut state = new_state();
        let start = Instant::now();

        assert_eq!(
            state.probe(false, start),
            ProbeAction::Waiting {
                elapsed: Duration::ZERO
            }
        );
        assert_eq!(
            state.probe(false, start + GRACE),
            ProbeAction::Waiting { elapsed: GRACE }
        );

        let action = state.probe(false, start + GRACE + Duration::from_millis(1));
        match action {
            ProbeAction::Fail(MonitorError::DroppedWithoutNotification { waited, .. }) => {
                assert_eq!(waited, GRACE + Duration::from_millis(1));
            }
            other => panic!("Expected dropped fault, got {:?}", other),
        }
        assert!(state.is_faulted());
    }

    #[test]
    fn test_reopened_session_clears_wait() {
        let mut state = new_state();
        let start = Instant::now();

        state.probe(false, start);
        assert_eq!(state.probe(true, start + Duration::from_secs(30)), ProbeAction::Healthy);

        // Timer restarts from the next closed observation
        let later = start + Duration::from_secs(45);
        state.probe(false, later);
        assert_eq!(
            state.state(),
            &SessionState::AwaitingNotification { since: later }
        );
        assert!(matches!(
            state.probe(false, later + GRACE),
            ProbeAction::Waiting { .. }
        ));
    }

    #[test]
    fn test_graceful_notification_requests_reopen() {
        let mut state = new_state();
        let start = Instant::now();
        state.probe(false, start);

        state.on_disconnect(None);
        assert_eq!(state.state(), &SessionState::GracefullyClosing);
        assert_eq!(state.probe(false, start + Duration::from_secs(59)), ProbeAction::Reopen);

        assert!(state.reopened());
        assert_eq!(state.state(), &SessionState::Open);
    }

    #[test]
    fn test_fault_is_sticky() {
        let mut state = new_state();
        let fault = MonitorError::transport("exchange://test", "socket reset");

        state.on_disconnect(Some(fault.clone()));
        state.on_disconnect(None);
        state.on_disconnect(Some(MonitorError::transport("exchange://test", "second")));

        assert_eq!(state.probe(true, Instant::now()), ProbeAction::Fail(fault.clone()));
        assert!(!state.reopened());
        assert_eq!(state.state(), &SessionState::Faulted(fault));
    }

    #[test]
    fn test_fault_during_reopen_wins() {
        let mut state = new_state();
        state.on_disconnect(None);
        assert_eq!(state.probe(false, Instant::now()), ProbeAction::Reopen);

        state.reopen_failed(MonitorError::timeout("exchange://test", "GetStreamingEvents"));
        assert!(state.is_faulted());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = new_state();
        state.on_disconnect(Some(MonitorError::connection_lost("exchange://test")));
        state.reset();
        assert_eq!(state.state(), &SessionState::Open);
    }
}
