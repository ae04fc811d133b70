//! Integration tests for request routing, coverage learning and event deduplication
//! over real WebSocket connections.

use ledgermeta_core::{
    pool::{PoolError, TransportError},
    types::{LedgerEvent, LedgerRequest, NodeConfig},
};
use serde_json::json;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::mock_infrastructure::{all_online, eventually, pool_for, MockLedgerNode, WAIT_TIMEOUT};

async fn next_event(events: &mut broadcast::Receiver<LedgerEvent>) -> Option<LedgerEvent> {
    tokio::time::timeout(WAIT_TIMEOUT, events.recv()).await.ok()?.ok()
}

/// Returns `true` if no event arrives within a short grace period.
async fn quiet(events: &mut broadcast::Receiver<LedgerEvent>) -> bool {
    tokio::time::timeout(Duration::from_millis(200), events.recv()).await.is_err()
}

#[tokio::test]
async fn test_request_round_trip_over_websocket() {
    let node = MockLedgerNode::start().await.unwrap();
    node.reply("server_info", json!({"info": {"build_version": "2.3.0"}}));

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    assert!(all_online(&pool).await);

    let result = pool.request(LedgerRequest::new("server_info"), 0).await.unwrap();
    assert_eq!(result["info"]["build_version"], "2.3.0");
    assert_eq!(node.received_commands(), vec!["server_info".to_string()]);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_node_error_surfaces_as_transport_error() {
    let node = MockLedgerNode::start().await.unwrap();
    node.reply_error("account_info", "actNotFound", "Account not found.");

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    assert!(all_online(&pool).await);

    let request = LedgerRequest::new("account_info").with_param("account", "rUnknown");
    let result = pool.request(request, 0).await;

    assert_eq!(
        result,
        Err(PoolError::Transport(TransportError::Node {
            error: "actNotFound".to_string(),
            message: "Account not found.".to_string(),
        }))
    );
    assert!(!result.unwrap_err().is_transient());

    pool.shutdown().await;
}

#[tokio::test]
async fn test_current_ledger_index_from_ledger_command() {
    let node = MockLedgerNode::start().await.unwrap();
    node.reply(
        "ledger",
        json!({
            "ledger": {"ledger_index": "91234567", "ledger_hash": "ABCD", "closed": true},
            "ledger_index": 91_234_567,
            "validated": true
        }),
    );

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    assert!(all_online(&pool).await);

    assert_eq!(pool.current_ledger_index().await, Ok(91_234_567));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_subscription_reply_seeds_coverage() {
    let node = MockLedgerNode::start().await.unwrap();
    node.set_validated_ledgers("1000-2000");
    node.reply("ledger_data", json!({"state": []}));

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    assert!(pool.wait_for_connection(WAIT_TIMEOUT).await);
    assert!(pool.wait_for_coverage(1500, WAIT_TIMEOUT).await);

    let inside = LedgerRequest::new("ledger_data").at_ledger(1500);
    assert!(pool.request(inside, 0).await.is_ok());

    let outside = LedgerRequest::new("ledger_data").at_ledger(999);
    assert_eq!(pool.request(outside, 0).await, Err(PoolError::Unfulfillable));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_ledger_closed_extends_coverage_and_is_published() {
    let node = MockLedgerNode::start().await.unwrap();
    node.set_validated_ledgers("1000-2000");

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    let mut events = pool.subscribe();
    assert!(node.wait_for_subscriptions(1, WAIT_TIMEOUT).await);

    node.push_ledger_closed(2001, "1000-2001");

    match next_event(&mut events).await {
        Some(LedgerEvent::LedgerClosed(closed)) => {
            assert_eq!(closed.ledger_index, 2001);
            assert_eq!(closed.validated_ledgers.as_deref(), Some("1000-2001"));
        }
        other => panic!("Expected ledger closed event, got {other:?}"),
    }
    assert!(pool.sessions()[0].covers(2001));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_redundant_sessions_publish_each_event_once() {
    let node = MockLedgerNode::start().await.unwrap();

    let pool = pool_for(&[NodeConfig::new(node.url()).with_connections(3)]);
    let mut events = pool.subscribe();
    assert!(node.wait_for_subscriptions(3, WAIT_TIMEOUT).await);
    assert!(eventually(|| node.open_connections() == 3).await);

    node.push_transaction("E3FE6EA3D48F0C2B639448020EA4F03D4F4F8FFDB243A852A0F59177921B4879", 500);
    node.push_ledger_closed(500, "1-500");

    match next_event(&mut events).await {
        Some(LedgerEvent::Transaction(tx)) => {
            assert_eq!(
                tx.hash,
                "E3FE6EA3D48F0C2B639448020EA4F03D4F4F8FFDB243A852A0F59177921B4879"
            );
            assert_eq!(tx.ledger_index, Some(500));
        }
        other => panic!("Expected transaction event, got {other:?}"),
    }
    match next_event(&mut events).await {
        Some(LedgerEvent::LedgerClosed(closed)) => assert_eq!(closed.ledger_index, 500),
        other => panic!("Expected ledger closed event, got {other:?}"),
    }
    assert!(quiet(&mut events).await, "duplicates from redundant sessions leaked through");

    // Every session still learned the new window even though only one event surfaced.
    assert!(eventually(|| pool.sessions().iter().all(|s| s.covers(500))).await);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_allow_list_routes_to_permitted_node() {
    let restricted = MockLedgerNode::start().await.unwrap();
    let general = MockLedgerNode::start().await.unwrap();
    restricted.reply("ledger", json!({"ledger": {"ledger_index": "10"}}));
    general.reply("ledger", json!({"ledger": {"ledger_index": "10"}}));
    general.reply("account_lines", json!({"lines": []}));

    let pool = pool_for(&[
        NodeConfig::new(restricted.url()).with_allowed_commands(["ledger", "subscribe"]),
        NodeConfig::new(general.url()),
    ]);
    assert!(all_online(&pool).await);

    let lines = LedgerRequest::new("account_lines").with_param("account", "rExample");
    assert_eq!(pool.request(lines, 0).await.unwrap(), json!({"lines": []}));
    assert!(pool.current_ledger().await.is_ok());

    assert_eq!(restricted.received_commands(), vec!["ledger".to_string()]);
    assert_eq!(general.received_commands(), vec!["account_lines".to_string()]);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_disabled_node_is_never_contacted() {
    let active = MockLedgerNode::start().await.unwrap();
    let disabled = MockLedgerNode::start().await.unwrap();
    active.reply("server_info", json!({"info": {}}));

    let pool = pool_for(&[
        NodeConfig::new(disabled.url()).with_connections(2).disabled(),
        NodeConfig::new(active.url()),
    ]);
    assert_eq!(pool.sessions().len(), 1);
    assert!(all_online(&pool).await);

    assert!(pool.request(LedgerRequest::new("server_info"), 0).await.is_ok());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(disabled.accepted_connections(), 0);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_node_expires_queued_request() {
    // Bind and drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = pool_for(&[NodeConfig::new(format!("ws://127.0.0.1:{port}"))]);

    let result = pool.request(LedgerRequest::new("server_info"), 0).await;
    assert_eq!(result, Err(PoolError::NoNodeAvailable));
    assert_eq!(pool.queue_depth(), 0);

    pool.shutdown().await;
}
