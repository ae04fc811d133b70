//! # Pool Metrics
//!
//! Recording helpers for pool activity. Everything goes through the `metrics` facade, so
//! nothing is recorded until the embedding binary installs a recorder (the server installs
//! a Prometheus exporter). Recording is lock-free and safe on the dispatch hot path.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `ledgermeta_requests_total` | counter | `outcome` |
//! | `ledgermeta_request_duration_seconds` | histogram | `outcome` |
//! | `ledgermeta_queue_depth` | gauge | |
//! | `ledgermeta_sessions_online` | gauge | |
//! | `ledgermeta_sessions_total` | gauge | |
//! | `ledgermeta_session_disconnects_total` | counter | `node` |
//! | `ledgermeta_events_emitted_total` | counter | `kind` |
//! | `ledgermeta_events_suppressed_total` | counter | `kind` |

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::pool::PoolError;

pub const REQUESTS_TOTAL: &str = "ledgermeta_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "ledgermeta_request_duration_seconds";
pub const QUEUE_DEPTH: &str = "ledgermeta_queue_depth";
pub const SESSIONS_ONLINE: &str = "ledgermeta_sessions_online";
pub const SESSIONS_TOTAL: &str = "ledgermeta_sessions_total";
pub const SESSION_DISCONNECTS_TOTAL: &str = "ledgermeta_session_disconnects_total";
pub const EVENTS_EMITTED_TOTAL: &str = "ledgermeta_events_emitted_total";
pub const EVENTS_SUPPRESSED_TOTAL: &str = "ledgermeta_events_suppressed_total";

/// Label value for requests that completed with a result.
pub const OUTCOME_SUCCESS: &str = "success";

/// Returns the `outcome` label for a finished request.
#[must_use]
pub fn outcome_label<T>(result: &Result<T, PoolError>) -> &'static str {
    match result {
        Ok(_) => OUTCOME_SUCCESS,
        Err(e) => e.as_str(),
    }
}

/// Records a finished request and how long the caller waited for it.
pub fn record_request(outcome: &'static str, elapsed: Duration) {
    counter!(REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

#[allow(clippy::cast_precision_loss)]
pub fn record_queue_depth(depth: usize) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}

#[allow(clippy::cast_precision_loss)]
pub fn record_sessions(online: usize, total: usize) {
    gauge!(SESSIONS_ONLINE).set(online as f64);
    gauge!(SESSIONS_TOTAL).set(total as f64);
}

pub fn record_disconnect(node: &str) {
    counter!(SESSION_DISCONNECTS_TOTAL, "node" => node.to_string()).increment(1);
}

/// Records a push event either forwarded to subscribers or dropped as a duplicate.
pub fn record_event(kind: &'static str, emitted: bool) {
    if emitted {
        counter!(EVENTS_EMITTED_TOTAL, "kind" => kind).increment(1);
    } else {
        counter!(EVENTS_SUPPRESSED_TOTAL, "kind" => kind).increment(1);
    }
}
