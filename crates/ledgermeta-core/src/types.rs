use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

/// Request command used to subscribe a session to the ledger and transaction feeds.
pub const SUBSCRIBE_COMMAND: &str = "subscribe";

/// Reads a ledger index given as a JSON number or a numeric string.
///
/// Nodes report header indices as strings in some replies, and callers may pin a
/// request the same way.
#[must_use]
pub fn parse_ledger_index(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|index| u32::try_from(index).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// A request to an upstream ledger node.
///
/// The command name drives allow-list checks; every other field is carried verbatim
/// to the node. A numeric `ledger_index` pins the request to a historical ledger and
/// restricts routing to sessions whose coverage contains it; so does a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub command: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl LedgerRequest {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), params: Map::new() }
    }

    /// Adds a command-specific field.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Targets a specific historical ledger.
    #[must_use]
    pub fn at_ledger(self, ledger_index: u32) -> Self {
        self.with_param("ledger_index", ledger_index)
    }

    /// Returns the targeted ledger index when the request pins a concrete ledger.
    ///
    /// Symbolic specifiers such as `"validated"` or `"current"` are not a routing
    /// constraint and yield `None`, as does index `0` which no ledger carries.
    #[must_use]
    pub fn ledger_index(&self) -> Option<u32> {
        self.params.get("ledger_index").and_then(parse_ledger_index).filter(|index| *index > 0)
    }

    /// Builds the JSON payload sent over the wire.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut payload = self.params.clone();
        payload.insert("command".to_string(), Value::String(self.command.clone()));
        Value::Object(payload)
    }
}

/// One upstream node as the pool sees it.
///
/// Each node is opened `connections` times; every connection becomes its own session.
/// `allowed_commands` restricts which request commands may be sent to the node; `None`
/// allows everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub url: Arc<str>,
    pub connections: u32,
    pub disabled: bool,
    pub allowed_commands: Option<Vec<String>>,
}

impl NodeConfig {
    #[must_use]
    pub fn new(url: impl Into<Arc<str>>) -> Self {
        Self { url: url.into(), connections: 1, disabled: false, allowed_commands: None }
    }

    #[must_use]
    pub fn with_connections(mut self, connections: u32) -> Self {
        self.connections = connections;
        self
    }

    #[must_use]
    pub fn with_allowed_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_commands = Some(commands.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Returns whether requests with this command may be sent to the node.
    #[must_use]
    pub fn allows(&self, command: &str) -> bool {
        self.allowed_commands
            .as_ref()
            .map_or(true, |commands| commands.iter().any(|allowed| allowed == command))
    }
}

/// Connectivity of a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger-close notification pushed by a subscribed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerClosed {
    pub ledger_index: u32,
    #[serde(default)]
    pub ledger_hash: Option<String>,
    #[serde(default)]
    pub ledger_time: Option<u64>,
    #[serde(default)]
    pub txn_count: Option<u64>,
    /// Ledger ranges the reporting node currently retains, e.g. `"32570-62000,62005"`.
    #[serde(default)]
    pub validated_ledgers: Option<String>,
}

impl LedgerClosed {
    /// Parses a `ledgerClosed` stream message.
    #[must_use]
    pub fn from_message(message: &Value) -> Option<Self> {
        let ledger_index = message.get("ledger_index").and_then(parse_ledger_index)?;

        Some(Self {
            ledger_index,
            ledger_hash: message.get("ledger_hash").and_then(Value::as_str).map(str::to_string),
            ledger_time: message.get("ledger_time").and_then(Value::as_u64),
            txn_count: message.get("txn_count").and_then(Value::as_u64),
            validated_ledgers: message
                .get("validated_ledgers")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// A transaction notification pushed by a subscribed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub hash: String,
    #[serde(default)]
    pub ledger_index: Option<u32>,
    #[serde(default)]
    pub validated: bool,
    /// The full stream message as received.
    pub raw: Value,
}

impl TransactionEvent {
    /// Parses a `transaction` stream message.
    ///
    /// Accepts both the `transaction.hash` and the top-level `hash` layouts.
    #[must_use]
    pub fn from_message(message: &Value) -> Option<Self> {
        let hash = message
            .get("transaction")
            .and_then(|tx| tx.get("hash"))
            .or_else(|| message.get("hash"))
            .and_then(Value::as_str)?
            .to_string();

        Some(Self {
            hash,
            ledger_index: message.get("ledger_index").and_then(parse_ledger_index),
            validated: message.get("validated").and_then(Value::as_bool).unwrap_or(false),
            raw: message.clone(),
        })
    }
}

/// Deduplicated push event delivered to pool subscribers.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Transaction(Arc<TransactionEvent>),
    LedgerClosed(Arc<LedgerClosed>),
}

impl LedgerEvent {
    /// Returns a static label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transaction(_) => "transaction",
            Self::LedgerClosed(_) => "ledger_closed",
        }
    }
}
