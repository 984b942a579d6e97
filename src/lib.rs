//! janus-proxy - intercepting WebSocket proxy for the Janus gateway
//!
//! Relays Janus signaling between clients and the gateway unchanged, and
//! mirrors stream publish/subscribe activity to a media-control API.

pub mod api;
pub mod args;
pub mod config;
pub mod janus;
pub mod jobs;
pub mod streams;
pub mod transport;
pub mod web;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::Config;
pub use janus::{JanusProxy, ProxyContext};
