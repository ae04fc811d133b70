//! Behaviour tests for the pool as a whole.
//!
//! Tests are organized by component:
//! - `mock_connector`: In-memory `Connector` with scripted replies and controllable pushes
//! - `pool_tests`: Admission, deadlines, dispatch order, deduplication and lifecycle
//! - Unit tests for queue, coverage, dedup and bidding are in their respective modules
