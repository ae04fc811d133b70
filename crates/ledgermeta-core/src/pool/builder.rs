//! Builder pattern for constructing a `LedgerPool` from a node list and timing settings.

use std::{sync::Arc, time::Duration};
use thiserror::Error;

use crate::{config::LedgerConfig, types::NodeConfig};

use super::{
    dedup::DEFAULT_DEDUP_CAPACITY,
    dispatcher::DEFAULT_DISPATCH_INTERVAL,
    manager::{LedgerPool, PoolSettings},
    queue::DEFAULT_REQUEST_TIMEOUT,
    session::{Session, DEFAULT_RECONNECT_DELAY},
    transport::Connector,
    ws::{WsConnector, DEFAULT_TRANSPORT_TIMEOUT},
};

const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Errors that can occur during pool construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    /// Every configured node is disabled, or none was configured.
    #[error("No enabled ledger nodes configured")]
    NoNodes,

    /// A node entry cannot produce any session.
    #[error("Invalid node {url}: {reason}")]
    InvalidNode { url: String, reason: String },
}

/// Builder for constructing a [`LedgerPool`].
///
/// Nodes are expanded into sessions in configuration order: a node with
/// `connections = 2` contributes two consecutive sessions. Disabled nodes contribute
/// none. Session ordinals follow that order and decide dispatch tie-breaks.
///
/// # Examples
///
/// ```no_run
/// # use ledgermeta_core::{pool::LedgerPoolBuilder, types::NodeConfig};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = LedgerPoolBuilder::new()
///     .node(NodeConfig::new("wss://s1.example.net").with_connections(2))
///     .node(NodeConfig::new("wss://s2.example.net").disabled())
///     .build()?;
///
/// pool.start();
/// # Ok(())
/// # }
/// ```
pub struct LedgerPoolBuilder {
    nodes: Vec<NodeConfig>,
    connector: Option<Arc<dyn Connector>>,
    request_timeout: Duration,
    transport_timeout: Duration,
    dispatch_interval: Duration,
    reconnect_delay: Duration,
    dedup_capacity: usize,
    event_buffer: usize,
}

impl LedgerPoolBuilder {
    /// Creates a new builder with default settings and no nodes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            connector: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Creates a builder carrying the nodes and timings of a `[ledger]` config section.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new()
            .nodes(config.pool_nodes())
            .request_timeout(config.request_timeout())
            .transport_timeout(Duration::from_secs(config.transport_timeout_seconds))
            .dispatch_interval(Duration::from_millis(config.dispatch_interval_ms))
            .reconnect_delay(Duration::from_secs(config.reconnect_delay_seconds))
            .dedup_capacity(config.dedup_capacity)
            .event_buffer(config.event_buffer)
    }

    #[must_use]
    pub fn node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    #[must_use]
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = NodeConfig>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Sets the connector used to open sessions (default: [`WsConnector`]).
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets how long a job may stay queued before it fails with `NoNodeAvailable` (default: 30s).
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the per-call guard of the default connector (default: 60s).
    ///
    /// Ignored when a custom connector is supplied.
    #[must_use]
    pub fn transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    #[must_use]
    pub fn dispatch_interval(mut self, interval: Duration) -> Self {
        self.dispatch_interval = interval;
        self
    }

    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    #[must_use]
    pub fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    #[must_use]
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Builds the pool. Nothing connects until [`LedgerPool::start`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::InvalidNode`] if an enabled node has zero connections or
    /// an empty URL, and [`BuilderError::NoNodes`] if no enabled node remains.
    pub fn build(self) -> Result<LedgerPool, BuilderError> {
        let mut sessions = Vec::new();

        for node in self.nodes {
            if node.disabled {
                tracing::info!(node = %node.url, "node disabled, no sessions created");
                continue;
            }

            if node.url.trim().is_empty() {
                return Err(BuilderError::InvalidNode {
                    url: node.url.to_string(),
                    reason: "URL is empty".to_string(),
                });
            }

            if node.connections == 0 {
                return Err(BuilderError::InvalidNode {
                    url: node.url.to_string(),
                    reason: "connections must be at least 1".to_string(),
                });
            }

            let node = Arc::new(node);
            for _ in 0..node.connections {
                let ordinal = sessions.len();
                sessions.push(Arc::new(Session::new(ordinal, node.clone(), self.reconnect_delay)));
            }
        }

        if sessions.is_empty() {
            return Err(BuilderError::NoNodes);
        }

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(WsConnector::new(self.transport_timeout).with_event_buffer(self.event_buffer))
        });

        let settings = PoolSettings {
            request_timeout: self.request_timeout,
            dispatch_interval: self.dispatch_interval,
            dedup_capacity: self.dedup_capacity.max(1),
            event_buffer: self.event_buffer.max(1),
        };

        Ok(LedgerPool::new(sessions, connector, settings))
    }
}

impl Default for LedgerPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
