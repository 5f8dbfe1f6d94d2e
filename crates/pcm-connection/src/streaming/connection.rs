//! Streaming-notification implementation of [`Connection`].

use super::{DisconnectCallback, ProbeAction, StreamingOptions, StreamingState, StreamingTransport};
use crate::connection::{Connection, DebugCallback};
use async_trait::async_trait;
use parking_lot::Mutex;
use pcm_common::{MonitorError, MonitorResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct StreamingConnection<T: StreamingTransport> {
    transport: T,
    state: Arc<Mutex<StreamingState>>,
    keep_alive_interval: Duration,
    notification_grace: Duration,
    debug_callback: Option<DebugCallback>,
}

impl<T: StreamingTransport> StreamingConnection<T> {
    pub fn new(transport: T, options: &StreamingOptions) -> Self {
        let state = StreamingState::new(transport.name(), options.notification_grace);
        Self {
            transport,
            state: Arc::new(Mutex::new(state)),
            keep_alive_interval: options.keep_alive_interval,
            notification_grace: options.notification_grace,
            debug_callback: None,
        }
    }

    fn emit_debug(&self, message: &str) {
        if let Some(callback) = &self.debug_callback {
            callback(&self.transport.name(), message);
        }
    }

    /// Handler installed on the transport. Runs on the transport's task.
    fn disconnect_handler(&self) -> DisconnectCallback {
        let state = Arc::clone(&self.state);
        let name = self.transport.name();
        Arc::new(move |fault: Option<MonitorError>| {
            match &fault {
                Some(e) => warn!("{} disconnected: {}", name, e),
                None => debug!("{} closed by server at end of session lifetime", name),
            }
            state.lock().on_disconnect(fault);
        })
    }

    async fn reopen(&mut self) -> MonitorResult<()> {
        let handler = self.disconnect_handler();
        match self.transport.open(handler).await {
            Ok(()) => {
                if self.state.lock().reopened() {
                    self.emit_debug("Connection gracefully restored - scheduled disconnect");
                }
                Ok(())
            }
            Err(e) => {
                self.state.lock().reopen_failed(e.clone());
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn session_state(&self) -> super::SessionState {
        self.state.lock().state().clone()
    }
}

#[async_trait]
impl<T: StreamingTransport> Connection for StreamingConnection<T> {
    fn name(&self) -> String {
        self.transport.name()
    }

    fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    /// Assumed connected until a fault is recorded; a silent drop is caught
    /// by `keep_alive()`.
    fn is_connected(&self) -> bool {
        !self.state.lock().is_faulted()
    }

    async fn connect(&mut self) -> MonitorResult<()> {
        self.state.lock().reset();
        self.transport.subscribe().await?;
        let handler = self.disconnect_handler();
        self.transport.open(handler).await
    }

    async fn keep_alive(&mut self) -> MonitorResult<()> {
        let action = {
            let mut state = self.state.lock();
            state.probe(self.transport.is_open(), Instant::now())
        };

        match action {
            ProbeAction::Healthy => Ok(()),
            ProbeAction::Waiting { elapsed } => {
                self.emit_debug(&format!(
                    "Session reported closed, waiting for disconnect notification ({:?} of {:?})",
                    elapsed, self.notification_grace
                ));
                Ok(())
            }
            ProbeAction::Reopen => self.reopen().await,
            ProbeAction::Fail(fault) => Err(fault),
        }
    }

    async fn close(&mut self) {
        self.transport.close().await;
    }

    fn set_debug_callback(&mut self, callback: DebugCallback) {
        self.debug_callback = Some(callback);
    }
}
