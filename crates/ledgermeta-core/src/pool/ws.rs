use async_trait::async_trait;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{
    errors::TransportError,
    transport::{Connection, Connector, Link, TransportEvent},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingReply = oneshot::Sender<Result<Value, TransportError>>;
type PendingRx = oneshot::Receiver<Result<Value, TransportError>>;

/// Default per-request guard against a hung connection.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_EVENT_BUFFER: usize = 256;

/// Opens JSON-over-WebSocket connections to ledger nodes.
///
/// Requests are tagged with an incrementing `id` and matched against replies of type
/// `response`. Everything else the node sends is forwarded as a push event.
#[derive(Debug, Clone)]
pub struct WsConnector {
    request_timeout: Duration,
    event_buffer: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSPORT_TIMEOUT)
    }
}

impl WsConnector {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout, event_buffer: DEFAULT_EVENT_BUFFER }
    }

    /// Sets how many unread push events a connection buffers before applying backpressure.
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }
}

/// Validates a node address.
///
/// # Errors
///
/// Returns an error if the URL is empty or does not use the `ws://` or `wss://` scheme.
pub fn validate_ws_url(url: &str) -> Result<&str, TransportError> {
    if url.trim().is_empty() {
        return Err(TransportError::ConnectionFailed("WebSocket URL is empty".to_string()));
    }

    if !url.starts_with("ws://") && !url.starts_with("wss://") {
        return Err(TransportError::ConnectionFailed(format!(
            "Invalid WebSocket URL format: {url}"
        )));
    }

    Ok(url)
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let url = validate_ws_url(url)?;

        let (ws_stream, response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("HTTP error: 200 OK") {
                TransportError::ConnectionFailed(format!(
                    "Server at {url} returned 200 OK but does not speak WebSocket"
                ))
            } else if error_msg.contains("HTTP error: 403") {
                TransportError::ConnectionFailed(format!("WebSocket access forbidden at {url}"))
            } else {
                TransportError::ConnectionFailed(format!("WebSocket connection failed: {e}"))
            }
        })?;

        tracing::debug!(node = url, status = response.status().as_u16(), "websocket connected");

        let (write, read) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(WsShared {
            url: url.to_string(),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(write, outgoing_rx, shared.url.clone()));
        tokio::spawn(read_loop(read, shared.clone(), events_tx, shutdown_rx));

        let connection = WsConnection {
            shared,
            outgoing: outgoing_tx,
            shutdown: shutdown_tx,
            next_id: AtomicU64::new(1),
            request_timeout: self.request_timeout,
        };

        Ok(Link::new(Arc::new(connection), events_rx))
    }
}

/// State shared between a connection handle and its reader task.
struct WsShared {
    url: String,
    pending: Mutex<HashMap<u64, PendingReply>>,
    closed: AtomicBool,
}

impl WsShared {
    /// Marks the connection closed and fails every in-flight request.
    ///
    /// The flag flips under the `pending` lock so no request can register after the drain.
    fn fail_pending(&self) {
        let pending: Vec<_> = {
            let mut pending = self.pending.lock();
            self.closed.store(true, Ordering::SeqCst);
            pending.drain().collect()
        };
        for (_, reply) in pending {
            let _ = reply.send(Err(TransportError::Closed));
        }
    }

    /// Registers a waiter for reply `id`, unless the connection is already closed.
    fn register(&self, id: u64) -> Result<PendingRx, TransportError> {
        let mut pending = self.pending.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        pending.insert(id, reply_tx);
        Ok(reply_rx)
    }

    /// Routes a reply frame to the request waiting for it.
    fn resolve(&self, frame: &Value) {
        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
            tracing::debug!(node = %self.url, "response without numeric id ignored");
            return;
        };

        let Some(reply) = self.pending.lock().remove(&id) else {
            tracing::debug!(node = %self.url, id = id, "response for unknown request ignored");
            return;
        };

        let _ = reply.send(parse_reply(frame));
    }
}

/// Converts a reply frame into the request's outcome.
fn parse_reply(frame: &Value) -> Result<Value, TransportError> {
    if frame.get("status").and_then(Value::as_str) == Some("error") {
        let error = frame.get("error").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let message = frame
            .get("error_message")
            .and_then(Value::as_str)
            .map_or_else(|| error.clone(), str::to_string);
        return Err(TransportError::Node { error, message });
    }

    Ok(frame.get("result").cloned().unwrap_or(Value::Null))
}

/// Returns `true` for frames answering a request rather than pushed by a stream.
fn is_reply(frame: &Value) -> bool {
    match frame.get("type").and_then(Value::as_str) {
        Some("response") => true,
        Some(_) => false,
        None => frame.get("id").is_some(),
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    url: String,
) {
    while let Some(message) = outgoing.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if let Err(e) = write.send(message).await {
            tracing::debug!(node = %url, error = %e, "websocket write failed");
            break;
        }
        if is_close {
            break;
        }
    }
    let _ = write.close().await;
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    shared: Arc<WsShared>,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let reason = loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(frame) if is_reply(&frame) => shared.resolve(&frame),
                        Ok(frame) => {
                            if events.send(TransportEvent::Push(frame)).await.is_err() {
                                break "session dropped".to_string();
                            }
                        }
                        Err(e) => {
                            let error =
                                TransportError::InvalidResponse(format!("Invalid JSON: {e}"));
                            let _ = events.send(TransportEvent::Error(error)).await;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by remote".to_string(),
                        |f| format!("closed by remote: code {}", u16::from(f.code)),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let error = TransportError::ConnectionFailed(e.to_string());
                    let _ = events.send(TransportEvent::Error(error)).await;
                    break e.to_string();
                }
                None => break "stream ended".to_string(),
            },
            _ = shutdown.changed() => break "closed locally".to_string(),
        }
    };

    shared.fail_pending();
    let _ = events.send(TransportEvent::Closed(reason)).await;
}

/// Request handle for one WebSocket connection.
pub struct WsConnection {
    shared: Arc<WsShared>,
    outgoing: mpsc::UnboundedSender<Message>,
    shutdown: watch::Sender<bool>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

#[async_trait]
impl Connection for WsConnection {
    async fn request(&self, payload: Value) -> Result<Value, TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let Value::Object(mut body) = payload else {
            return Err(TransportError::Send("request payload must be a JSON object".to_string()));
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        body.insert("id".to_string(), Value::from(id));

        let reply_rx = self.shared.register(id)?;

        let text = Value::Object(body).to_string();
        if self.outgoing.send(Message::Text(text.into())).is_err() {
            self.shared.pending.lock().remove(&id);
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                tracing::warn!(
                    node = %self.shared.url,
                    id = id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "request timed out"
                );
                Err(TransportError::Timeout)
            }
        }
    }

    fn close(&self) {
        let _ = self.outgoing.send(Message::Close(None));
        let _ = self.shutdown.send(true);
    }
}
