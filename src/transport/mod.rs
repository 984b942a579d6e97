//! Transport layer for the proxy
//!
//! Wraps client-facing and gateway-facing WebSockets behind one interface.

pub mod connection;

pub use connection::{Connection, ConnectionEvent, Role};
