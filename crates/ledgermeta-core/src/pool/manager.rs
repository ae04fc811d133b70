use futures_util::future::select_ok;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Notify},
    task::JoinHandle,
};

use crate::{
    metrics,
    types::{parse_ledger_index, ConnectionState, LedgerEvent, LedgerRequest},
};

use super::{
    dedup::{EventDeduplicator, EventKey},
    dispatcher::{is_admissible, Dispatcher},
    errors::PoolError,
    queue::{Job, RequestQueue},
    session::{Session, SessionEvent, SessionEventKind, SessionStatus},
    transport::Connector,
};

/// Command used to look up the latest closed ledger.
const LEDGER_COMMAND: &str = "ledger";

/// Timing and sizing knobs fixed at construction.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub request_timeout: Duration,
    pub dispatch_interval: Duration,
    pub dedup_capacity: usize,
    pub event_buffer: usize,
}

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub online: usize,
    pub total: usize,
    pub queue_depth: usize,
    pub sessions: Vec<SessionStatus>,
}

/// Pool of sessions to upstream ledger nodes.
///
/// `LedgerPool` owns the session set, the request queue and the dispatcher, and
/// republishes the push events of all sessions as one deduplicated stream. Callers
/// submit requests through [`LedgerPool::request`] and observe exactly one outcome per
/// request. Thread-safe; share it behind an `Arc`.
///
/// # Construction
///
/// Use [`LedgerPoolBuilder`](super::LedgerPoolBuilder), then call [`LedgerPool::start`]
/// from within a Tokio runtime.
pub struct LedgerPool {
    sessions: Arc<Vec<Arc<Session>>>,
    connector: Arc<dyn Connector>,
    queue: Arc<Mutex<RequestQueue>>,
    wake: Arc<Notify>,
    dedup: Arc<EventDeduplicator>,
    events: broadcast::Sender<LedgerEvent>,
    shutdown_tx: broadcast::Sender<()>,
    settings: PoolSettings,
    next_job_id: AtomicU64,
    started: AtomicBool,
    stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LedgerPool {
    pub(super) fn new(
        sessions: Vec<Arc<Session>>,
        connector: Arc<dyn Connector>,
        settings: PoolSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.event_buffer);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            sessions: Arc::new(sessions),
            connector,
            queue: Arc::new(Mutex::new(RequestQueue::new())),
            wake: Arc::new(Notify::new()),
            dedup: Arc::new(EventDeduplicator::new(settings.dedup_capacity)),
            events,
            shutdown_tx,
            settings,
            next_job_id: AtomicU64::new(1),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the session, event and dispatcher tasks. Calling it again has no effect.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let mut tasks = self.tasks.lock();

        for session in self.sessions.iter() {
            tasks.push(tokio::spawn(session.clone().run(
                self.connector.clone(),
                session_tx.clone(),
                self.shutdown_tx.subscribe(),
            )));
        }

        let relay = EventRelay {
            sessions: self.sessions.clone(),
            dedup: self.dedup.clone(),
            events: self.events.clone(),
            wake: self.wake.clone(),
        };
        tasks.push(tokio::spawn(relay.run(session_rx, self.shutdown_tx.subscribe())));

        let dispatcher = Dispatcher::new(
            self.sessions.clone(),
            self.queue.clone(),
            self.wake.clone(),
            self.settings.dispatch_interval,
        );
        tasks.push(dispatcher.start_with_shutdown(self.shutdown_tx.subscribe()));

        metrics::record_sessions(0, self.sessions.len());
        tracing::info!(
            sessions = self.sessions.len(),
            request_timeout_secs = self.settings.request_timeout.as_secs(),
            "ledger pool started"
        );
    }

    /// Submits a request and waits for its outcome.
    ///
    /// Higher `priority` values are dispatched first; `0` is the normal priority.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Unfulfillable`] at once if no session could ever serve the
    /// request, [`PoolError::NoNodeAvailable`] if it is still queued when the request
    /// timeout elapses, [`PoolError::Transport`] if the dispatched call fails, and
    /// [`PoolError::Shutdown`] if the pool stops first.
    pub async fn request(&self, request: LedgerRequest, priority: i32) -> Result<Value, PoolError> {
        let started = Instant::now();
        let result = self.submit(request, priority).await;
        metrics::record_request(metrics::outcome_label(&result), started.elapsed());
        result
    }

    async fn submit(&self, request: LedgerRequest, priority: i32) -> Result<Value, PoolError> {
        if !is_admissible(&self.sessions, &request) {
            tracing::debug!(
                command = %request.command,
                ledger_index = ?request.ledger_index(),
                "request unfulfillable by any session"
            );
            return Err(PoolError::Unfulfillable);
        }

        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, mut reply_rx) = oneshot::channel();

        {
            let mut queue = self.queue.lock();
            if self.stopped.load(Ordering::SeqCst) {
                return Err(PoolError::Shutdown);
            }
            tracing::trace!(
                job = id,
                command = %request.command,
                priority = priority,
                "request queued"
            );
            queue.push(Job::new(id, request, priority, reply_tx));
            metrics::record_queue_depth(queue.len());
        }
        self.wake.notify_one();

        let deadline = tokio::time::sleep(self.settings.request_timeout);
        tokio::pin!(deadline);

        tokio::select! {
            outcome = &mut reply_rx => return outcome.unwrap_or(Err(PoolError::Shutdown)),
            () = &mut deadline => {}
        }

        let expired = self.queue.lock().remove(id);
        if expired.is_some() {
            tracing::debug!(
                job = id,
                timeout_secs = self.settings.request_timeout.as_secs(),
                "request expired in queue"
            );
            return Err(PoolError::NoNodeAvailable);
        }

        // Dispatched just before the deadline; the session's transport timeout bounds it.
        reply_rx.await.unwrap_or(Err(PoolError::Shutdown))
    }

    /// Fetches the header of the latest ledger known to the serving node.
    ///
    /// # Errors
    ///
    /// Returns the request's error, or [`PoolError::InvalidResponse`] if the reply has
    /// no ledger header.
    pub async fn current_ledger(&self) -> Result<Value, PoolError> {
        let result = self.request(LedgerRequest::new(LEDGER_COMMAND), 0).await?;

        result
            .get("ledger")
            .or_else(|| result.pointer("/closed/ledger"))
            .cloned()
            .ok_or_else(|| {
                PoolError::InvalidResponse("ledger reply without ledger header".to_string())
            })
    }

    /// Returns the index of the latest ledger known to the serving node.
    ///
    /// # Errors
    ///
    /// Returns the request's error, or [`PoolError::InvalidResponse`] if the header
    /// carries no usable index.
    pub async fn current_ledger_index(&self) -> Result<u32, PoolError> {
        let header = self.current_ledger().await?;
        header.get("ledger_index").and_then(parse_ledger_index).ok_or_else(|| {
            PoolError::InvalidResponse(format!("ledger header without index: {header}"))
        })
    }

    /// Subscribes to the deduplicated `ledgerClosed` and `transaction` events of all sessions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<Vec<Arc<Session>>> {
        self.sessions.clone()
    }

    /// Returns the number of connected sessions.
    #[must_use]
    pub fn online_sessions(&self) -> usize {
        self.sessions.iter().filter(|session| session.is_connected()).count()
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.lock().len()
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            online: self.online_sessions(),
            total: self.sessions.len(),
            queue_depth: self.queue_depth(),
            sessions: self.sessions.iter().map(|session| session.status()).collect(),
        }
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Waits until at least one session is connected. Returns `false` on timeout.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        if self.sessions.is_empty() {
            return false;
        }

        let waits = self.sessions.iter().map(|session| {
            let mut state = session.watch_state();
            Box::pin(async move {
                state.wait_for(|state| *state == ConnectionState::Connected).await.map(|_| ())
            })
        });

        matches!(tokio::time::timeout(timeout, select_ok(waits)).await, Ok(Ok(_)))
    }

    /// Waits until some session reports a ledger window containing `ledger_index`.
    ///
    /// Sessions learn their coverage from the subscription reply, which arrives after
    /// the connection is up, so a caller about to send a historical request right after
    /// [`LedgerPool::wait_for_connection`] should wait here first. Returns `false` on
    /// timeout.
    pub async fn wait_for_coverage(&self, ledger_index: u32, timeout: Duration) -> bool {
        if self.sessions.is_empty() {
            return false;
        }

        let waits = self.sessions.iter().map(|session| {
            let mut reports = session.watch_coverage();
            let session = Arc::clone(session);
            Box::pin(async move {
                reports.wait_for(|_| session.covers(ledger_index)).await.map(|_| ())
            })
        });

        matches!(tokio::time::timeout(timeout, select_ok(waits)).await, Ok(Ok(_)))
    }

    /// Stops every task and rejects all queued requests with [`PoolError::Shutdown`].
    ///
    /// Requests already running on a session finish normally.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("ledger pool shutting down");
        let _ = self.shutdown_tx.send(());

        let rejected = self.queue.lock().drain();
        let count = rejected.len();
        for job in rejected {
            job.resolve(Err(PoolError::Shutdown));
        }
        metrics::record_queue_depth(0);
        if count > 0 {
            tracing::debug!(count = count, "rejected queued requests on shutdown");
        }

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "pool task ended abnormally");
            }
        }
    }
}

impl Drop for LedgerPool {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Fans session events into logs, metrics and the deduplicated subscriber stream.
struct EventRelay {
    sessions: Arc<Vec<Arc<Session>>>,
    dedup: Arc<EventDeduplicator>,
    events: broadcast::Sender<LedgerEvent>,
    wake: Arc<Notify>,
}

impl EventRelay {
    async fn run(
        self,
        mut session_rx: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = session_rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = shutdown_rx.recv() => break,
            }
        }
        tracing::debug!("event relay stopped");
    }

    fn handle(&self, event: SessionEvent) {
        let url = self.sessions.get(event.session).map_or("unknown", |session| session.url());

        match event.kind {
            SessionEventKind::Connected => {
                let (online, total) = self.fleet();
                metrics::record_sessions(online, total);
                tracing::info!(
                    node = %url,
                    session = event.session,
                    "{online} / {total} sessions online ({url} established)"
                );
                self.wake.notify_one();
            }
            SessionEventKind::Disconnected(reason) => {
                let (online, total) = self.fleet();
                metrics::record_sessions(online, total);
                metrics::record_disconnect(url);
                tracing::info!(
                    node = %url,
                    session = event.session,
                    reason = %reason,
                    "{online} / {total} sessions online ({url} lost)"
                );
            }
            SessionEventKind::TransportError(e) => {
                tracing::warn!(node = %url, session = event.session, error = %e, "transport error");
            }
            SessionEventKind::LedgerClosed(closed) => {
                let key = EventKey::Ledger(closed.ledger_index);
                self.publish(key, LedgerEvent::LedgerClosed(closed));
            }
            SessionEventKind::Transaction(tx) => {
                self.publish(EventKey::Transaction(tx.hash.clone()), LedgerEvent::Transaction(tx));
            }
        }
    }

    fn publish(&self, key: EventKey, event: LedgerEvent) {
        let kind = event.kind();

        if !self.dedup.should_emit(key) {
            metrics::record_event(kind, false);
            return;
        }

        metrics::record_event(kind, true);
        // No subscribers is fine; events are fire-and-forget.
        let _ = self.events.send(event);
    }

    fn fleet(&self) -> (usize, usize) {
        let online = self.sessions.iter().filter(|session| session.is_connected()).count();
        (online, self.sessions.len())
    }
}
