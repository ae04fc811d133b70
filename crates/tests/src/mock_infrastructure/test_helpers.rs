//! Test Helper Functions and Utilities
//!
//! Common helpers for building pools against mock nodes and waiting on async state.

use ledgermeta_core::{
    pool::{LedgerPool, LedgerPoolBuilder},
    types::NodeConfig,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// How long helpers wait for asynchronous state before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns a builder with timings short enough for tests.
#[must_use]
pub fn test_builder() -> LedgerPoolBuilder {
    LedgerPoolBuilder::new()
        .request_timeout(Duration::from_millis(500))
        .transport_timeout(Duration::from_secs(2))
        .dispatch_interval(Duration::from_millis(10))
        .reconnect_delay(Duration::from_millis(50))
}

/// Builds and starts a pool over `nodes` using the real WebSocket connector.
///
/// # Panics
///
/// Panics if the node list cannot produce a pool.
#[must_use]
pub fn pool_for(nodes: &[NodeConfig]) -> Arc<LedgerPool> {
    let pool = Arc::new(
        test_builder().nodes(nodes.iter().cloned()).build().expect("valid test node list"),
    );
    pool.start();
    pool
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Waits until every session of `pool` is connected.
pub async fn all_online(pool: &LedgerPool) -> bool {
    let total = pool.sessions().len();
    eventually(|| pool.online_sessions() == total).await
}
