//! # Ledgermeta Core
//!
//! Core library for talking to the upstream nodes of a public ledger network.
//!
//! This crate provides the foundational components for:
//!
//! - **[`pool`]**: A pool of WebSocket sessions to upstream ledger nodes with per-session ledger
//!   coverage tracking, a priority request queue, a dispatcher that auctions queued requests to
//!   idle sessions, and deduplication of push events that arrive redundantly from several sessions.
//!
//! - **[`config`]**: Layered TOML + environment configuration for the node fleet, logging and
//!   metrics.
//!
//! - **[`metrics`]**: Metric names and recording helpers for pool activity.
//!
//! - **[`types`]**: Requests, push events and connection state shared by the pool and its
//!   consumers.
//!
//! ## Request Flow
//!
//! ```text
//! LedgerPool::request(request, priority)
//!       │
//!       ▼
//! ┌──────────────────┐
//! │ Admission check  │ ─── no session could serve it ──► PoolError::Unfulfillable
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  RequestQueue    │ ─── still queued at deadline ──► PoolError::NoNodeAvailable
//! │ (priority order) │
//! └────────┬─────────┘
//!          │ every dispatch pass
//!          ▼
//! ┌──────────────────┐
//! │   Dispatcher     │  bid per session: connected, idle, allowed, covers ledger
//! └────────┬─────────┘
//!          │ winning session marked busy
//!          ▼
//! ┌──────────────────┐
//! │ Session::execute │ ─── transport failure ──► PoolError::Transport
//! └────────┬─────────┘
//!          ▼
//!      Result to caller
//! ```
//!
//! ## Event Flow
//!
//! ```text
//! Session (ledgerClosed / transaction push)
//!       │  ledgerClosed → coverage replaced
//!       ▼
//! EventDeduplicator ─── seen before ──► dropped
//!       │
//!       ▼
//! broadcast::Sender<LedgerEvent> ──► subscribers
//! ```

pub mod config;
pub mod metrics;
pub mod pool;
pub mod types;
