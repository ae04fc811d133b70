//! HTTP middleware for the ledger server.

pub mod request_id;

pub use request_id::{
    create_request_id_layers, create_trace_layer, UuidRequestIdGenerator, X_REQUEST_ID,
};
