//! Mock Ledger Node for Testing
//!
//! A local WebSocket server that speaks the ledger node's JSON protocol closely enough
//! for the pool's real `WsConnector`: requests carrying an `id` are answered with a
//! `type: "response"` frame, `subscribe` is answered with the node's ledger window, and
//! `ledgerClosed` / `transaction` stream messages can be pushed to every open connection.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Scripted answer for one command.
#[derive(Debug, Clone)]
enum Reply {
    Success(Value),
    Error { error: String, message: String },
}

#[derive(Default)]
struct NodeState {
    replies: Mutex<HashMap<String, Reply>>,
    validated_ledgers: Mutex<Option<String>>,
    connections: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
    received: Mutex<Vec<Value>>,
    accepted: AtomicUsize,
}

impl NodeState {
    fn answer(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let command = request.get("command").and_then(Value::as_str).unwrap_or_default();

        let reply = match self.replies.lock().get(command).cloned() {
            Some(reply) => reply,
            None if command == "subscribe" => {
                let window = self.validated_ledgers.lock().clone();
                Reply::Success(window.map_or_else(
                    || json!({}),
                    |validated_ledgers| json!({"validated_ledgers": validated_ledgers}),
                ))
            }
            None => Reply::Error {
                error: "unknownCmd".to_string(),
                message: format!("Unknown method: {command}"),
            },
        };

        match reply {
            Reply::Success(result) => json!({
                "id": id,
                "type": "response",
                "status": "success",
                "result": result
            }),
            Reply::Error { error, message } => json!({
                "id": id,
                "type": "response",
                "status": "error",
                "error": error,
                "error_message": message
            }),
        }
    }

    fn broadcast(&self, message: &Value) {
        let text = message.to_string();
        self.connections.lock().retain(|tx| tx.send(Message::Text(text.clone().into())).is_ok());
    }
}

/// A mock ledger node listening on a random local port.
pub struct MockLedgerNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
    server_handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MockLedgerNode {
    /// Starts a mock node on a random available port.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind to a local port or retrieve the bound address.
    pub async fn start() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(NodeState::default());
        let (shutdown_tx, _) = broadcast::channel(1);

        let server_handle = Self::spawn_server(listener, state.clone(), shutdown_tx.subscribe());

        Ok(Self { addr, state, server_handle, shutdown_tx })
    }

    fn spawn_server(
        listener: TcpListener,
        state: Arc<NodeState>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        if let Ok((stream, _)) = result {
                            tokio::spawn(Self::handle_connection(stream, state.clone()));
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    async fn handle_connection(stream: TcpStream, state: Arc<NodeState>) {
        let Ok(ws_stream) = accept_async(stream).await else { return };
        state.accepted.fetch_add(1, Ordering::SeqCst);

        let (mut write, mut read) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        state.connections.lock().push(outgoing_tx.clone());

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let is_close = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || is_close {
                    break;
                }
            }
        });

        while let Some(Ok(message)) = read.next().await {
            match message {
                Message::Text(text) => {
                    let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    state.received.lock().push(request.clone());
                    let reply = state.answer(&request);
                    if outgoing_tx.send(Message::Text(reply.to_string().into())).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        writer.abort();
    }

    /// Returns the WebSocket URL for connecting to this node.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Answers `command` with `result`.
    pub fn reply(&self, command: &str, result: Value) {
        self.state.replies.lock().insert(command.to_string(), Reply::Success(result));
    }

    /// Answers `command` with an error status.
    pub fn reply_error(&self, command: &str, error: &str, message: &str) {
        self.state.replies.lock().insert(
            command.to_string(),
            Reply::Error { error: error.to_string(), message: message.to_string() },
        );
    }

    /// Sets the ledger window reported in subscription replies, e.g. `"100-200"`.
    pub fn set_validated_ledgers(&self, descriptor: &str) {
        *self.state.validated_ledgers.lock() = Some(descriptor.to_string());
    }

    /// Pushes a `ledgerClosed` stream message to every open connection.
    pub fn push_ledger_closed(&self, ledger_index: u32, validated_ledgers: &str) {
        self.state.broadcast(&json!({
            "type": "ledgerClosed",
            "ledger_index": ledger_index,
            "ledger_hash": format!("{ledger_index:064X}"),
            "ledger_time": 750_000_000 + u64::from(ledger_index),
            "txn_count": 0,
            "validated_ledgers": validated_ledgers
        }));
    }

    /// Pushes a `transaction` stream message to every open connection.
    pub fn push_transaction(&self, hash: &str, ledger_index: u32) {
        self.state.broadcast(&json!({
            "type": "transaction",
            "ledger_index": ledger_index,
            "validated": true,
            "engine_result": "tesSUCCESS",
            "transaction": {
                "hash": hash,
                "TransactionType": "Payment"
            }
        }));
    }

    /// Closes every open connection from the node's side.
    pub fn drop_connections(&self) {
        let connections: Vec<_> = self.state.connections.lock().drain(..).collect();
        for tx in connections {
            let _ = tx.send(Message::Close(None));
        }
    }

    /// Returns the number of connections currently open.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        let mut connections = self.state.connections.lock();
        connections.retain(|tx| !tx.is_closed());
        connections.len()
    }

    /// Returns how many WebSocket handshakes the node has accepted.
    #[must_use]
    pub fn accepted_connections(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Commands received so far, subscriptions excluded.
    #[must_use]
    pub fn received_commands(&self) -> Vec<String> {
        self.state
            .received
            .lock()
            .iter()
            .filter_map(|request| request.get("command").and_then(Value::as_str))
            .filter(|command| *command != "subscribe")
            .map(str::to_string)
            .collect()
    }

    /// Waits until `count` subscription requests have arrived.
    pub async fn wait_for_subscriptions(&self, count: usize, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let subscriptions = self
                .state
                .received
                .lock()
                .iter()
                .filter(|request| request["command"] == "subscribe")
                .count();
            if subscriptions >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for MockLedgerNode {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        self.server_handle.abort();
        self.drop_connections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn test_mock_node_answers_by_id() {
        let node = MockLedgerNode::start().await.unwrap();
        node.reply("server_info", json!({"info": {"build_version": "2.3.0"}}));

        let (mut ws, _) = connect_async(node.url()).await.expect("Failed to connect");
        let request = json!({"id": 7, "command": "server_info"});
        ws.send(Message::Text(request.to_string().into())).await.unwrap();

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("Expected text reply");
        };
        let reply: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["type"], "response");
        assert_eq!(reply["result"]["info"]["build_version"], "2.3.0");
        assert_eq!(node.received_commands(), vec!["server_info".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_node_rejects_unknown_commands() {
        let node = MockLedgerNode::start().await.unwrap();

        let (mut ws, _) = connect_async(node.url()).await.expect("Failed to connect");
        ws.send(Message::Text(json!({"id": 1, "command": "nope"}).to_string().into()))
            .await
            .unwrap();

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("Expected text reply");
        };
        let reply: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["error"], "unknownCmd");
    }
}
