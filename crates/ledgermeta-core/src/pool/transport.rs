//! Connection seam between sessions and the wire.
//!
//! A [`Connector`] opens one connection per call and hands back a [`Link`]: a shareable
//! request handle plus the stream of everything the node pushes unprompted. The pool
//! only relies on this seam, so the WebSocket implementation in [`super::ws`] can be
//! swapped for an in-memory one in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::errors::TransportError;

/// Something a connection reports without being asked.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A stream message (`ledgerClosed`, `transaction`, ...).
    Push(Value),
    /// A non-fatal error on the connection.
    Error(TransportError),
    /// The connection is gone; carries a human readable reason.
    Closed(String),
}

/// An open connection able to run request/response exchanges.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Sends a request payload and waits for the matching reply's `result`.
    async fn request(&self, payload: Value) -> Result<Value, TransportError>;

    /// Closes the connection. Pending requests fail with [`TransportError::Closed`].
    fn close(&self);
}

/// Opens connections to a node address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// A freshly opened connection and its push stream.
///
/// The stream ends (or yields [`TransportEvent::Closed`]) when the connection drops.
pub struct Link {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl Link {
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { connection, events }
    }
}
