use thiserror::Error;

/// Failures of a single session's connection or of one request/response exchange on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The session has no open connection.
    #[error("Not connected")]
    NotConnected,

    /// The connection closed while the request was in flight.
    #[error("Connection closed")]
    Closed,

    /// The node did not answer within the transport timeout.
    #[error("Request timeout")]
    Timeout,

    /// Writing the request to the socket failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// The node sent a frame that could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The node answered with an error status.
    #[error("Node error {error}: {message}")]
    Node { error: String, message: String },
}

/// Errors surfaced to callers of [`LedgerPool::request`](super::LedgerPool::request).
///
/// Every request resolves exactly once, either with the node's result or with one of
/// these variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PoolError {
    /// No session, even if connected and idle, could ever serve this request: the command
    /// is not allowed anywhere or the ledger lies outside every known coverage window.
    #[error("Request unfulfillable by any configured node")]
    Unfulfillable,

    /// Eligible sessions exist but none became free before the request deadline.
    #[error("No node available before the request deadline")]
    NoNodeAvailable,

    /// The dispatched request failed on its session.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The pool shut down before the request was dispatched.
    #[error("Pool is shut down")]
    Shutdown,

    /// The node's reply did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PoolError {
    /// Returns the stable error identifier exposed to API consumers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            // Spelled as the identifier downstream consumers already match on.
            Self::Unfulfillable => "REQUEST_UNFULLFILLABLE",
            Self::NoNodeAvailable => "NO_NODE_AVAILABLE",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Shutdown => "SHUTDOWN",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Returns `true` if retrying the same request later may succeed.
    ///
    /// The pool never retries on its own; this is a hint for callers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NoNodeAvailable => true,
            Self::Transport(e) => !matches!(e, TransportError::Node { .. }),
            Self::Unfulfillable | Self::Shutdown | Self::InvalidResponse(_) => false,
        }
    }

    /// Returns a static label for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfulfillable => "unfulfillable",
            Self::NoNodeAvailable => "no_node_available",
            Self::Transport(_) => "transport_error",
            Self::Shutdown => "shutdown",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PoolError::Unfulfillable.code(), "REQUEST_UNFULLFILLABLE");
        assert_eq!(PoolError::NoNodeAvailable.code(), "NO_NODE_AVAILABLE");
        assert_eq!(PoolError::from(TransportError::Timeout).code(), "TRANSPORT_ERROR");
    }

    #[test]
    fn test_transient_classification() {
        assert!(PoolError::NoNodeAvailable.is_transient());
        assert!(PoolError::Transport(TransportError::Closed).is_transient());
        assert!(!PoolError::Unfulfillable.is_transient());

        let node_error = TransportError::Node {
            error: "lgrNotFound".to_string(),
            message: "ledgerNotFound".to_string(),
        };
        assert!(!PoolError::Transport(node_error).is_transient());
    }

    #[test]
    fn test_node_error_display() {
        let error = TransportError::Node {
            error: "unknownCmd".to_string(),
            message: "Unknown method.".to_string(),
        };
        assert_eq!(error.to_string(), "Node error unknownCmd: Unknown method.");
    }
}
