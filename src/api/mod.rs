//! External HTTP collaborators
//!
//! - `MediaControl`: publish / subscribe bookkeeping on the media-control API
//! - `GatewayControl`: out-of-band commands on the gateway's HTTP API

pub mod gateway;
pub mod media;

pub use gateway::JanusHttpClient;
pub use media::CmApiClient;

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use std::fmt;

/// Errors raised by the HTTP collaborators
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, body)
    Http(reqwest::Error),
    /// Non-success HTTP status
    Status { status: u16, body: String },
    /// The remote side answered but refused the request
    Rejected(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "{}", e),
            ApiError::Status { status, body } => write!(f, "status {}: {}", status, body),
            ApiError::Rejected(reason) => write!(f, "{}", reason),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Http(err)
    }
}

/// Media-control API consumed by streaming plugins
///
/// `start` is a unix timestamp in seconds.
#[async_trait]
pub trait MediaControl: Send + Sync {
    async fn publish(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError>;

    async fn unpublish(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError>;

    async fn subscribe(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError>;

    async fn unsubscribe(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError>;
}

/// Gateway HTTP API, used for compensating actions
#[async_trait]
pub trait GatewayControl: Send + Sync {
    /// Force the gateway to detach a plugin handle
    async fn detach(&self, session_id: &str, plugin_id: &str) -> Result<(), ApiError>;
}
