use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{broadcast, mpsc, watch};

use crate::types::{
    ConnectionState, LedgerClosed, LedgerRequest, NodeConfig, TransactionEvent, SUBSCRIBE_COMMAND,
};

use super::{
    coverage::LedgerCoverage,
    errors::TransportError,
    transport::{Connection, Connector, Link, TransportEvent},
};

/// Default wait between failed connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// What a session reports to the pool.
#[derive(Debug, Clone)]
pub enum SessionEventKind {
    Connected,
    Disconnected(String),
    TransportError(TransportError),
    LedgerClosed(Arc<LedgerClosed>),
    Transaction(Arc<TransactionEvent>),
}

/// A session event tagged with the reporting session's ordinal.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub session: usize,
    pub kind: SessionEventKind,
}

/// Point-in-time view of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub ordinal: usize,
    pub url: String,
    pub state: ConnectionState,
    pub busy: bool,
    pub coverage: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
}

/// One physical connection to one upstream node.
///
/// A session lives for the whole process. It connects, subscribes to the ledger and
/// transaction streams, relays push events, and on any disconnect goes straight back
/// to connecting, retrying at a constant interval until the node is reachable again.
///
/// At most one dispatched request runs on a session at a time; the dispatcher claims a
/// session through [`Session::try_lease`] and the lease frees it when dropped.
pub struct Session {
    ordinal: usize,
    node: Arc<NodeConfig>,
    reconnect_delay: Duration,
    state: watch::Sender<ConnectionState>,
    connection: RwLock<Option<Arc<dyn Connection>>>,
    connected_since: RwLock<Option<DateTime<Utc>>>,
    coverage: ArcSwapOption<LedgerCoverage>,
    coverage_reports: watch::Sender<u64>,
    busy: AtomicBool,
}

impl Session {
    #[must_use]
    pub fn new(ordinal: usize, node: Arc<NodeConfig>, reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (coverage_reports, _) = watch::channel(0);
        Self {
            ordinal,
            node,
            reconnect_delay,
            state,
            connection: RwLock::new(None),
            connected_since: RwLock::new(None),
            coverage: ArcSwapOption::empty(),
            coverage_reports,
            busy: AtomicBool::new(false),
        }
    }

    /// Position of this session in configuration order; lower is preferred.
    #[must_use]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.node.url
    }

    #[must_use]
    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns a receiver observing this session's connectivity.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Returns whether the node's allow-list permits this command.
    #[must_use]
    pub fn supports(&self, command: &str) -> bool {
        self.node.allows(command)
    }

    /// Returns the ledgers this node last reported as available.
    ///
    /// `None` until the first report arrives.
    #[must_use]
    pub fn coverage(&self) -> Option<Arc<LedgerCoverage>> {
        self.coverage.load_full()
    }

    /// Returns a receiver that changes every time the node reports a new ledger window.
    ///
    /// The value counts the reports received so far.
    #[must_use]
    pub fn watch_coverage(&self) -> watch::Receiver<u64> {
        self.coverage_reports.subscribe()
    }

    /// Returns whether this session can serve a request pinned to `ledger_index`.
    ///
    /// A session without any coverage report cannot serve historical requests.
    #[must_use]
    pub fn covers(&self, ledger_index: u32) -> bool {
        self.coverage().is_some_and(|coverage| coverage.contains(ledger_index))
    }

    /// Replaces the coverage set with a freshly reported window.
    pub fn update_coverage(&self, coverage: LedgerCoverage) {
        tracing::trace!(
            node = %self.node.url,
            session = self.ordinal,
            coverage = %coverage,
            "coverage updated"
        );
        self.coverage.store(Some(Arc::new(coverage)));
        self.coverage_reports.send_modify(|reports| *reports += 1);
    }

    /// Claims the session for one request. Returns `None` if it is already busy.
    #[must_use]
    pub fn try_lease(self: &Arc<Self>) -> Option<SessionLease> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| SessionLease { session: Arc::clone(self) })
    }

    /// Sends a request over the open connection and returns the node's result.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when there is no open connection, or the
    /// connection's error if the exchange fails.
    pub async fn execute(&self, request: &LedgerRequest) -> Result<Value, TransportError> {
        let connection = self.connection.read().clone().ok_or(TransportError::NotConnected)?;
        connection.request(request.to_payload()).await
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            ordinal: self.ordinal,
            url: self.node.url.to_string(),
            state: self.state(),
            busy: self.is_busy(),
            coverage: self.coverage().map(|coverage| coverage.to_string()),
            connected_since: *self.connected_since.read(),
        }
    }

    /// Installs an open connection and marks the session connected.
    pub(crate) fn attach(&self, connection: Arc<dyn Connection>) {
        *self.connection.write() = Some(connection);
        *self.connected_since.write() = Some(Utc::now());
        self.state.send_replace(ConnectionState::Connected);
    }

    /// Forgets the current connection and marks the session disconnected.
    pub(crate) fn detach(&self) {
        *self.connection.write() = None;
        *self.connected_since.write() = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Runs the session until shutdown: connect, relay, reconnect.
    pub async fn run(
        self: Arc<Self>,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<SessionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let Some(link) = self.connect(connector.as_ref(), &mut shutdown).await else {
                break;
            };

            let connection = link.connection;
            self.attach(connection.clone());
            self.emit(&events, SessionEventKind::Connected);

            if self.supports(SUBSCRIBE_COMMAND) {
                tokio::spawn(Arc::clone(&self).subscribe(connection.clone()));
            }

            let reason = self.relay(link.events, &events, &mut shutdown).await;

            self.detach();
            connection.close();

            match reason {
                Some(reason) => self.emit(&events, SessionEventKind::Disconnected(reason)),
                None => break,
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        tracing::debug!(node = %self.node.url, session = self.ordinal, "session stopped");
    }

    /// Attempts to connect until it succeeds. Returns `None` on shutdown.
    async fn connect(
        &self,
        connector: &dyn Connector,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<Link> {
        loop {
            self.state.send_replace(ConnectionState::Connecting);

            tokio::select! {
                result = connector.connect(&self.node.url) => match result {
                    Ok(link) => return Some(link),
                    Err(e) => {
                        tracing::debug!(
                            node = %self.node.url,
                            session = self.ordinal,
                            error = %e,
                            retry_secs = self.reconnect_delay.as_secs_f64(),
                            "connection attempt failed"
                        );
                    }
                },
                _ = shutdown.recv() => return None,
            }

            self.state.send_replace(ConnectionState::Disconnected);

            tokio::select! {
                () = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.recv() => return None,
            }
        }
    }

    /// Relays push events until the connection drops (returns the reason) or the pool
    /// shuts down (returns `None`).
    async fn relay(
        &self,
        mut link_events: mpsc::Receiver<TransportEvent>,
        events: &mpsc::UnboundedSender<SessionEvent>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<String> {
        loop {
            tokio::select! {
                event = link_events.recv() => match event {
                    Some(TransportEvent::Push(message)) => self.handle_push(&message, events),
                    Some(TransportEvent::Error(e)) => {
                        self.emit(events, SessionEventKind::TransportError(e));
                    }
                    Some(TransportEvent::Closed(reason)) => return Some(reason),
                    None => return Some("connection dropped".to_string()),
                },
                _ = shutdown.recv() => return None,
            }
        }
    }

    fn handle_push(&self, message: &Value, events: &mpsc::UnboundedSender<SessionEvent>) {
        match message.get("type").and_then(Value::as_str) {
            Some("ledgerClosed") => {
                let Some(closed) = LedgerClosed::from_message(message) else {
                    tracing::debug!(node = %self.node.url, "ledgerClosed without index ignored");
                    return;
                };

                if let Some(descriptor) = &closed.validated_ledgers {
                    self.update_coverage(LedgerCoverage::parse(descriptor));
                }

                self.emit(events, SessionEventKind::LedgerClosed(Arc::new(closed)));
            }
            Some("transaction") => {
                if let Some(tx) = TransactionEvent::from_message(message) {
                    self.emit(events, SessionEventKind::Transaction(Arc::new(tx)));
                } else {
                    tracing::debug!(node = %self.node.url, "transaction without hash ignored");
                }
            }
            other => {
                tracing::trace!(node = %self.node.url, kind = ?other, "unhandled push message");
            }
        }
    }

    /// Subscribes the fresh connection to the ledger and transaction streams.
    ///
    /// The subscription reply describes the node's current ledger window, which seeds
    /// the coverage set before the first ledger closes.
    async fn subscribe(self: Arc<Self>, connection: Arc<dyn Connection>) {
        let payload = json!({
            "command": SUBSCRIBE_COMMAND,
            "streams": ["ledger", "transactions"]
        });

        match connection.request(payload).await {
            Ok(result) => {
                if let Some(descriptor) = result.get("validated_ledgers").and_then(Value::as_str) {
                    self.update_coverage(LedgerCoverage::parse(descriptor));
                }
                tracing::debug!(
                    node = %self.node.url,
                    session = self.ordinal,
                    "subscribed to ledger streams"
                );
            }
            Err(e) => {
                tracing::warn!(
                    node = %self.node.url,
                    session = self.ordinal,
                    error = %e,
                    "subscription request failed"
                );
            }
        }
    }

    fn emit(&self, events: &mpsc::UnboundedSender<SessionEvent>, kind: SessionEventKind) {
        let _ = events.send(SessionEvent { session: self.ordinal, kind });
    }
}

/// Exclusive claim on an idle session for the duration of one request.
///
/// Dropping the lease marks the session free again.
pub struct SessionLease {
    session: Arc<Session>,
}

impl SessionLease {
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.session.busy.store(false, Ordering::SeqCst);
    }
}
