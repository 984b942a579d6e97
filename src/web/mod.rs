//! HTTP server for health checks and stream control
//!
//! Provides a lightweight status API next to the proxy listener.

pub mod shared;
pub use shared::SharedState;

pub mod http_server;
pub use http_server::{router, run_http_server};
