use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use link_service::LinkServiceHandle;

pub mod reconciler;
pub mod token_store;

use reconciler::{CommandOutcome, ConnectionState, LinkCommand, LinkEvent, LinkSnapshot, Reconciler};

/// Credential store behind the start gate. `has_token` answers the gate;
/// `load_token`/`store_token` serve the token management flows around it.
/// Every start request re-checks; the engine caches nothing.
#[async_trait]
pub trait AuthTokenStore: Send + Sync {
    async fn has_token(&self) -> bool;
    async fn load_token(&self) -> Result<Option<String>>;
    async fn store_token(&self, token: &str) -> Result<()>;
}

/// Engine tuning knobs. Defaults poll every 500 ms.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Notifications pushed to presentation subscribers. `StateChanged` and
/// `ErrorChanged` fire only on actual value changes. Snapshots remain the
/// authoritative read; a slow subscriber may miss events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged(ConnectionState),
    ErrorChanged(Option<String>),
    CredentialRequired,
}

/// Synchronous acknowledgment of `request_start`/`request_stop`. Says only
/// whether a command was dispatched; the remote outcome arrives later
/// through events and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted,
    Busy,
    CredentialRequired,
    Redundant,
    Inactive,
}

struct EngineState {
    reconciler: Reconciler,
    poll_task: Option<JoinHandle<()>>,
    deactivated: bool,
}

/// Synchronization engine between the background link service and a
/// presentation layer. A status poller and a command dispatcher feed one
/// single-writer reconciler; presentation reads snapshots and subscribes
/// to change events.
pub struct LinkEngine {
    service: Arc<dyn LinkServiceHandle>,
    tokens: Arc<dyn AuthTokenStore>,
    config: EngineConfig,
    inner: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

impl LinkEngine {
    pub fn new(
        service: Arc<dyn LinkServiceHandle>,
        tokens: Arc<dyn AuthTokenStore>,
    ) -> Arc<Self> {
        Self::new_with_config(service, tokens, EngineConfig::default())
    }

    pub fn new_with_config(
        service: Arc<dyn LinkServiceHandle>,
        tokens: Arc<dyn AuthTokenStore>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            service,
            tokens,
            config,
            inner: Mutex::new(EngineState {
                reconciler: Reconciler::new(),
                poll_task: None,
                deactivated: false,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn current_state(&self) -> ConnectionState {
        self.inner.lock().await.reconciler.state()
    }

    pub async fn current_error(&self) -> Option<String> {
        self.inner.lock().await.reconciler.last_error().map(str::to_owned)
    }

    pub async fn snapshot(&self) -> LinkSnapshot {
        self.inner.lock().await.reconciler.snapshot()
    }

    /// Starts the status poller: one immediate query, then one per
    /// configured interval, with ticks skipped while a query is still
    /// outstanding. Idempotent while already active.
    pub async fn activate(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        inner.deactivated = false;
        if inner.poll_task.is_some() {
            return;
        }
        let engine = Arc::clone(self);
        inner.poll_task = Some(tokio::spawn(async move { engine.poll_loop().await }));
        debug!(
            "link: poller started interval_ms={}",
            self.config.poll_interval.as_millis()
        );
    }

    /// Stops the poller and turns further events off. A late poll result is
    /// dropped; a command still in flight runs to completion, but its
    /// outcome no longer reaches the reconciler.
    pub async fn deactivate(&self) {
        let mut inner = self.inner.lock().await;
        inner.deactivated = true;
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.reconciler.abandon_in_flight();
        info!("link: engine deactivated");
    }

    /// Asks the service to start the link. Fire-and-observe: watch events
    /// or snapshots for the outcome.
    pub async fn request_start(self: &Arc<Self>) -> RequestOutcome {
        let mut inner = self.inner.lock().await;
        if inner.deactivated {
            return RequestOutcome::Inactive;
        }
        if inner.reconciler.in_flight().is_some() {
            return RequestOutcome::Busy;
        }
        match inner.reconciler.state() {
            ConnectionState::Connecting | ConnectionState::Connected => {
                return RequestOutcome::Redundant;
            }
            ConnectionState::Disconnected => {}
        }
        if !self.tokens.has_token().await {
            info!("link: start blocked, no auth token");
            let _ = self.events.send(EngineEvent::CredentialRequired);
            return RequestOutcome::CredentialRequired;
        }
        self.dispatch(&mut inner, LinkCommand::Start);
        RequestOutcome::Accepted
    }

    /// Asks the service to stop the link. Stopping an already disconnected
    /// link is acknowledged as redundant and issues no remote call.
    pub async fn request_stop(self: &Arc<Self>) -> RequestOutcome {
        let mut inner = self.inner.lock().await;
        if inner.deactivated {
            return RequestOutcome::Inactive;
        }
        if inner.reconciler.in_flight().is_some() {
            return RequestOutcome::Busy;
        }
        if inner.reconciler.state() == ConnectionState::Disconnected {
            return RequestOutcome::Redundant;
        }
        self.dispatch(&mut inner, LinkCommand::Stop);
        RequestOutcome::Accepted
    }

    fn dispatch(self: &Arc<Self>, inner: &mut EngineState, command: LinkCommand) {
        info!("link: dispatching {command:?}");
        self.apply_event_locked(inner, LinkEvent::CommandStarted(command));
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let result = match command {
                LinkCommand::Start => engine.service.start().await,
                LinkCommand::Stop => engine.service.stop().await,
            };
            let outcome = match result {
                Ok(()) => CommandOutcome::Succeeded,
                Err(err) => {
                    warn!("link: {command:?} failed: {err}");
                    CommandOutcome::Failed(err.to_string())
                }
            };
            engine
                .apply_event(LinkEvent::CommandFinished(command, outcome))
                .await;
        });
    }

    async fn poll_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let event = match self.service.status().await {
                Ok(lifecycle) => LinkEvent::Polled(lifecycle),
                Err(err) => {
                    warn!("link: status poll failed: {err}");
                    LinkEvent::PollFailed(err.to_string())
                }
            };
            self.apply_event(event).await;
        }
    }

    async fn apply_event(&self, event: LinkEvent) {
        let mut inner = self.inner.lock().await;
        if inner.deactivated {
            debug!("link: dropping event after deactivation: {event:?}");
            return;
        }
        self.apply_event_locked(&mut inner, event);
    }

    fn apply_event_locked(&self, inner: &mut EngineState, event: LinkEvent) {
        let before = inner.reconciler.snapshot();
        inner.reconciler.apply(event);
        let after = inner.reconciler.snapshot();
        if before.state != after.state {
            info!(
                "link: state changed from={:?} to={:?}",
                before.state, after.state
            );
            let _ = self.events.send(EngineEvent::StateChanged(after.state));
        }
        if before.last_error != after.last_error {
            let _ = self
                .events
                .send(EngineEvent::ErrorChanged(after.last_error));
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
