//! Pool of upstream ledger node sessions and the request router in front of it.
//!
//! This module handles communication with the ledger nodes, including:
//! - One long-lived [`Session`] per configured connection, reconnecting forever
//! - Per-session [`LedgerCoverage`] learned from the subscription reply and `ledgerClosed` pushes
//! - A priority [`RequestQueue`] with a per-request deadline
//! - A [`Dispatcher`] that auctions queued requests to idle sessions
//! - An [`EventDeduplicator`] applied where push events are republished
//!
//! # Dispatch Rules
//!
//! Every dispatch pass walks the queue in priority order. For each job, every session
//! computes a [`Bid`]:
//!
//! 1. **Disconnected** or **busy** sessions do not bid; the job waits for a later pass.
//! 2. Sessions whose node does not **allow** the command do not bid.
//! 3. If the job pins a `ledger_index`, sessions whose **coverage** misses it do not bid.
//! 4. Everyone else bids `1 - ordinal * 0.001`, so earlier-configured sessions win ties.
//!
//! The highest bidder is marked busy and runs the job; the job leaves the queue at that
//! moment and its deadline no longer applies.
//!
//! ## Outcomes
//!
//! ```text
//! request ─► [any session could ever serve it?]
//!              │
//!              ├─ No  → PoolError::Unfulfillable (immediately)
//!              │
//!              └─ Yes → queued ─► [picked before deadline?]
//!                                   │
//!                                   ├─ No  → PoolError::NoNodeAvailable
//!                                   │
//!                                   └─ Yes → Session::execute ─► result / PoolError::Transport
//! ```

pub mod builder;
pub mod coverage;
pub mod dedup;
pub mod dispatcher;
pub mod errors;
pub mod manager;
pub mod queue;
pub mod session;
pub mod transport;
pub mod ws;

#[cfg(test)]
mod tests;

pub use builder::{BuilderError, LedgerPoolBuilder};
pub use coverage::{LedgerCoverage, LedgerRange};
pub use dedup::{EventDeduplicator, EventKey, DEFAULT_DEDUP_CAPACITY};
pub use dispatcher::{bid, is_admissible, Bid, Dispatcher, DEFAULT_DISPATCH_INTERVAL};
pub use errors::{PoolError, TransportError};
pub use manager::{LedgerPool, PoolSettings, PoolStatus};
pub use queue::{Job, RequestQueue, DEFAULT_REQUEST_TIMEOUT};
pub use session::{
    Session, SessionEvent, SessionEventKind, SessionLease, SessionStatus, DEFAULT_RECONNECT_DELAY,
};
pub use transport::{Connection, Connector, Link, TransportEvent};
pub use ws::{validate_ws_url, WsConnector, DEFAULT_TRANSPORT_TIMEOUT};
