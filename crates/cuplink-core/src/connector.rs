// ── Transport connector ──
//
// Owns the single broker session. Connect and disconnect run as
// cancellable background loops with a fixed retry interval. A link lost
// while connected sends the connector back to `Connecting`, and the
// connect loop opens and subscribes again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use cuplink_api::{
    BrokerSession, InboundMessage, PublishRequest, SessionEvent, TopicScheme, retry_fixed,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectorConfig;

const EVENT_CHANNEL_SIZE: usize = 256;

// ── ConnectionState ──────────────────────────────────────────────

/// Lifecycle of the broker session, observable through
/// [`TransportConnector::subscribe_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

// ── InboundHandler ───────────────────────────────────────────────

/// Receives every message delivered on the subscribed filter.
pub trait InboundHandler: Send + Sync {
    fn handle(&self, message: &InboundMessage);
}

/// Default handler: inbound deliveries are accepted and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreInbound;

impl InboundHandler for IgnoreInbound {
    fn handle(&self, message: &InboundMessage) {
        trace!(
            topic = %message.topic,
            bytes = message.payload.len(),
            "inbound message ignored"
        );
    }
}

// ── TransportConnector ───────────────────────────────────────────

/// Connection lifecycle and publish path for one broker session.
///
/// Cheaply cloneable. `connect` and `disconnect` return immediately; the
/// work happens on background tasks that retry until they succeed or the
/// connector is shut down. Background tasks need a Tokio runtime.
#[derive(Clone)]
pub struct TransportConnector {
    inner: Arc<ConnectorInner>,
}

struct ConnectorInner {
    config: ConnectorConfig,
    scheme: TopicScheme,
    session: Arc<dyn BrokerSession>,
    handler: Arc<dyn InboundHandler>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    connect_cancel: Mutex<Option<CancellationToken>>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportConnector {
    /// Create a connector over `session` that ignores inbound messages.
    /// Does NOT connect; call [`connect()`](Self::connect).
    pub fn new(config: ConnectorConfig, session: Arc<dyn BrokerSession>) -> Self {
        Self::with_handler(config, session, Arc::new(IgnoreInbound))
    }

    pub fn with_handler(
        config: ConnectorConfig,
        session: Arc<dyn BrokerSession>,
        handler: Arc<dyn InboundHandler>,
    ) -> Self {
        let scheme = config.topic_scheme();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ConnectorInner {
                config,
                scheme,
                session,
                handler,
                state,
                cancel: CancellationToken::new(),
                connect_cancel: Mutex::new(None),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn topic_scheme(&self) -> &TopicScheme {
        &self.inner.scheme
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Resolve once the connector reaches `target`.
    pub async fn wait_for(&self, target: ConnectionState) {
        let mut rx = self.inner.state.subscribe();
        rx.wait_for(|state| *state == target).await.ok();
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Start connecting in the background.
    ///
    /// Only acts from [`Disconnected`](ConnectionState::Disconnected):
    /// repeated calls while connecting or connected never start a second
    /// loop, and a call while disconnecting is ignored.
    pub fn connect(&self) {
        if self.inner.cancel.is_cancelled() {
            debug!("connect ignored, connector is shut down");
            return;
        }

        let started = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(state = ?self.state(), "connect ignored");
            return;
        }

        info!(endpoint = %self.inner.session.endpoint(), "connecting to broker");
        self.spawn_dispatch();
        self.start_connect_loop();
    }

    /// Start disconnecting in the background.
    ///
    /// A pending connect loop is cancelled first. Close failures are
    /// retried after the configured interval until the session closes.
    pub fn disconnect(&self) {
        let started = self.inner.state.send_if_modified(|state| {
            if matches!(
                state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(state = ?self.state(), "disconnect ignored");
            return;
        }

        if let Some(token) = lock(&self.inner.connect_cancel).take() {
            token.cancel();
        }

        info!(endpoint = %self.inner.session.endpoint(), "disconnecting from broker");
        let token = self.inner.cancel.child_token();
        self.spawn(disconnect_loop(self.clone(), token));
    }

    /// Cancel every background loop, wait for them to finish, and make a
    /// single best-effort attempt to close a still-open session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = lock(&self.inner.task_handles).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        if self.inner.session.is_connected() {
            if let Err(e) = self.inner.session.close().await {
                warn!(error = %e, "close during shutdown failed (non-fatal)");
            }
        }

        self.inner.state.send_replace(ConnectionState::Disconnected);
        debug!("connector shut down");
    }

    // ── Messaging ────────────────────────────────────────────────

    /// Send `{resource}:{state}` to `{server}/{owner}/{deviceType}/{deviceId}`.
    ///
    /// Not retried; the caller owns the retry policy.
    pub async fn publish(
        &self,
        owner: &str,
        device_id: &str,
        resource: &str,
        state: &str,
    ) -> Result<(), cuplink_api::Error> {
        let request = PublishRequest::new(owner, device_id, resource, state)?;
        self.send(request).await
    }

    /// Positional form of [`publish`](Self::publish):
    /// `[owner, deviceId, resource, state]`. Any other arity fails before
    /// anything is sent.
    pub async fn publish_args<S: AsRef<str>>(&self, args: &[S]) -> Result<(), cuplink_api::Error> {
        let request = PublishRequest::from_args(args)?;
        self.send(request).await
    }

    async fn send(&self, request: PublishRequest) -> Result<(), cuplink_api::Error> {
        let envelope = request.into_envelope(&self.inner.scheme, self.inner.config.qos);
        debug!(
            topic = %envelope.topic,
            qos = envelope.qos.level(),
            bytes = envelope.payload.len(),
            "publishing"
        );
        self.inner.session.publish(envelope).await
    }

    /// Hand one inbound delivery to the configured handler.
    pub fn on_message(&self, message: &InboundMessage) {
        self.inner.handler.handle(message);
    }

    /// The session dropped its link. From `Connected`, go back to
    /// `Connecting` and run the connect loop again; in any other state the
    /// loss is already being handled.
    fn on_link_lost(&self, reason: &str) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        // A newer link is already up; this report belongs to the old one.
        if self.inner.session.is_connected() {
            debug!(reason, "stale link loss ignored");
            return;
        }

        let reconnect = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !reconnect {
            debug!(state = ?self.state(), reason, "link loss ignored");
            return;
        }

        warn!(endpoint = %self.inner.session.endpoint(), reason, "broker link lost, reconnecting");
        self.start_connect_loop();
    }

    // ── Internals ────────────────────────────────────────────────

    /// One connect attempt: open, then subscribe. A failed subscribe closes
    /// the half-open session so the next attempt starts clean.
    async fn attempt_connect(&self, filter: &str) -> Result<(), cuplink_api::Error> {
        let session = &self.inner.session;
        session.open(self.inner.events_tx.clone()).await?;

        if let Err(e) = session.subscribe(filter, self.inner.config.qos).await {
            if let Err(close_err) = session.close().await {
                debug!(error = %close_err, "closing half-open session failed");
            }
            return Err(e);
        }
        Ok(())
    }

    fn start_connect_loop(&self) {
        let token = self.inner.cancel.child_token();
        *lock(&self.inner.connect_cancel) = Some(token.clone());
        self.spawn(connect_loop(self.clone(), token));
    }

    fn spawn_dispatch(&self) {
        let Some(rx) = lock(&self.inner.events_rx).take() else {
            return;
        };
        let cancel = self.inner.cancel.clone();
        self.spawn(dispatch_task(Arc::downgrade(&self.inner), rx, cancel));
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = lock(&self.inner.task_handles);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

impl std::fmt::Debug for TransportConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnector")
            .field("endpoint", &self.inner.session.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Background tasks ─────────────────────────────────────────────

async fn connect_loop(connector: TransportConnector, cancel: CancellationToken) {
    let inner = &connector.inner;
    let filter = inner.scheme.subscribe_filter();

    let outcome = retry_fixed(
        "broker connect",
        inner.config.retry_interval,
        &cancel,
        || connector.attempt_connect(&filter),
    )
    .await;

    let Some(done) = outcome else {
        debug!("connect loop cancelled");
        return;
    };

    let reached = inner.state.send_if_modified(|state| {
        if *state == ConnectionState::Connecting {
            *state = ConnectionState::Connected;
            true
        } else {
            false
        }
    });
    if reached {
        info!(
            endpoint = %inner.session.endpoint(),
            filter = %filter,
            attempts = done.attempts,
            "connected to broker"
        );
    }
}

async fn disconnect_loop(connector: TransportConnector, cancel: CancellationToken) {
    let inner = &connector.inner;

    let outcome = retry_fixed(
        "broker disconnect",
        inner.config.retry_interval,
        &cancel,
        || inner.session.close(),
    )
    .await;

    let Some(done) = outcome else {
        debug!("disconnect loop cancelled");
        return;
    };

    inner.state.send_if_modified(|state| {
        if *state == ConnectionState::Disconnecting {
            *state = ConnectionState::Disconnected;
            true
        } else {
            false
        }
    });
    info!(attempts = done.attempts, "disconnected from broker");
}

/// Drain session events: deliveries go to
/// [`TransportConnector::on_message`], link loss restarts the connect loop.
///
/// Holds only a weak reference so an abandoned connector is not kept
/// alive by its own dispatch task.
async fn dispatch_task(
    inner: Weak<ConnectorInner>,
    mut rx: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let Some(inner) = inner.upgrade() else { break };
                let connector = TransportConnector { inner };
                match event {
                    SessionEvent::Message(message) => connector.on_message(&message),
                    SessionEvent::LinkLost { reason } => connector.on_link_lost(&reason),
                }
            }
        }
    }
}
