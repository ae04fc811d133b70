//! Tests for disconnect handling and session recovery.

use ledgermeta_core::{
    pool::PoolError,
    types::{ConnectionState, LedgerRequest, NodeConfig},
};
use serde_json::json;
use std::time::Duration;

use crate::mock_infrastructure::{
    all_online, eventually, pool_for, test_builder, MockLedgerNode, WAIT_TIMEOUT,
};

#[tokio::test]
async fn test_session_reconnects_after_node_drops_connection() {
    let node = MockLedgerNode::start().await.unwrap();
    node.reply("server_info", json!({"info": {"server_state": "full"}}));

    let pool = pool_for(&[NodeConfig::new(node.url())]);
    assert!(node.wait_for_subscriptions(1, WAIT_TIMEOUT).await);
    assert_eq!(node.accepted_connections(), 1);

    node.drop_connections();

    assert!(eventually(|| node.accepted_connections() >= 2).await, "session never reconnected");
    assert!(all_online(&pool).await);
    assert!(node.wait_for_subscriptions(2, WAIT_TIMEOUT).await, "resubscription missing");

    let result = pool.request(LedgerRequest::new("server_info"), 0).await.unwrap();
    assert_eq!(result["info"]["server_state"], "full");

    pool.shutdown().await;
}

#[tokio::test]
async fn test_requests_fail_over_to_remaining_node() {
    let primary = MockLedgerNode::start().await.unwrap();
    let backup = MockLedgerNode::start().await.unwrap();
    primary.reply("fee", json!({"drops": {"base_fee": "10"}}));
    backup.reply("fee", json!({"drops": {"base_fee": "12"}}));

    let pool = pool_for(&[NodeConfig::new(primary.url()), NodeConfig::new(backup.url())]);
    assert!(all_online(&pool).await);

    let fee = pool.request(LedgerRequest::new("fee"), 0).await.unwrap();
    assert_eq!(fee["drops"]["base_fee"], "10");

    let primary_url = primary.url();
    drop(primary);
    let sessions = pool.sessions();
    assert!(
        eventually(|| sessions[0].state() != ConnectionState::Connected).await,
        "session to {primary_url} still marked connected"
    );

    let fee = pool.request(LedgerRequest::new("fee"), 0).await.unwrap();
    assert_eq!(fee["drops"]["base_fee"], "12");

    pool.shutdown().await;
}

#[tokio::test]
async fn test_status_reflects_disconnect() {
    let node = MockLedgerNode::start().await.unwrap();

    let pool = pool_for(&[NodeConfig::new(node.url()).with_connections(2)]);
    assert!(all_online(&pool).await);

    let status = pool.status();
    assert_eq!(status.online, 2);
    assert!(status.sessions.iter().all(|s| s.connected_since.is_some()));

    drop(node);
    assert!(eventually(|| pool.online_sessions() == 0).await);

    let status = pool.status();
    assert_eq!(status.total, 2);
    assert!(status.sessions.iter().all(|s| s.connected_since.is_none()));

    pool.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_waiting_requests() {
    // Bind and drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = std::sync::Arc::new(
        test_builder()
            .node(NodeConfig::new(format!("ws://127.0.0.1:{port}")))
            .request_timeout(Duration::from_secs(10))
            .build()
            .unwrap(),
    );
    pool.start();

    let waiting = tokio::spawn({
        let pool = pool.clone();
        async move { pool.request(LedgerRequest::new("server_info"), 0).await }
    });
    assert!(eventually(|| pool.queue_depth() == 1).await);

    pool.shutdown().await;

    assert_eq!(waiting.await.unwrap(), Err(PoolError::Shutdown));
    assert_eq!(
        pool.request(LedgerRequest::new("server_info"), 0).await,
        Err(PoolError::Shutdown)
    );
}
