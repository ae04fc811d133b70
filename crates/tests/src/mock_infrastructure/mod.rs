//! Mock Infrastructure for Testing the Ledger Pool
//!
//! Reusable stand-ins for upstream ledger nodes that exercise the pool's real
//! WebSocket transport over loopback.
//!
//! ## Components
//!
//! - `MockLedgerNode`: WebSocket server answering requests by `id` and pushing streams
//! - Test helpers for building pools and polling conditions
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{pool_for, MockLedgerNode};
//!
//! let node = MockLedgerNode::start().await?;
//! node.reply("server_info", json!({"info": {}}));
//!
//! let pool = pool_for(&[NodeConfig::new(node.url())]);
//! ```

pub mod ledger_node_mock;
pub mod test_helpers;

pub use ledger_node_mock::MockLedgerNode;
pub use test_helpers::*;
