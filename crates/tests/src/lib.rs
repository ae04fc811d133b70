//! Integration Tests for the Ledger Pool
//!
//! These tests run the pool with its real WebSocket connector against
//! [`MockLedgerNode`](mock_infrastructure::MockLedgerNode) servers bound to loopback,
//! covering what the in-crate unit tests cannot: framing, reply correlation by `id`,
//! stream pushes arriving on redundant connections, and reconnection after the node
//! drops the socket.
//!
//! - `pool_integration_tests`: request routing, coverage and event deduplication
//! - `reconnect_tests`: disconnect handling and recovery
//! - `mock_infrastructure`: reusable mock node and helpers
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod pool_integration_tests;

#[cfg(test)]
mod reconnect_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
