//! Janus protocol interception
//!
//! Every client WebSocket is paired with its own gateway WebSocket. Frames
//! flow through unchanged; the proxy inspects them to track sessions,
//! plugin handles and streams, and to trigger media-control side effects.

pub mod connection;
pub mod error;
pub mod message;
pub mod plugin;
pub mod proxy;
pub mod session;
pub mod transaction;

pub use connection::{JanusConnection, PairState};
pub use error::{ErrorKind, JanusError, ProxyError};
pub use message::JanusMessage;
pub use plugin::{Plugin, PluginKind};
pub use proxy::JanusProxy;
pub use session::Session;
pub use transaction::TransactionRegistry;

use std::sync::Arc;
use std::time::Duration;

use crate::api::{GatewayControl, MediaControl};
use crate::jobs::JobSink;
use crate::streams::StreamRegistry;

/// Collaborators shared by every session pair
pub struct ProxyContext {
    pub media: Arc<dyn MediaControl>,
    pub gateway: Arc<dyn GatewayControl>,
    pub jobs: Arc<dyn JobSink>,
    pub streams: Arc<StreamRegistry>,
    /// Pending transactions older than this are dropped
    pub transaction_timeout: Option<Duration>,
}

impl ProxyContext {
    pub fn new(
        media: Arc<dyn MediaControl>,
        gateway: Arc<dyn GatewayControl>,
        jobs: Arc<dyn JobSink>,
    ) -> Self {
        Self {
            media,
            gateway,
            jobs,
            streams: Arc::new(StreamRegistry::new()),
            transaction_timeout: None,
        }
    }

    pub fn with_transaction_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transaction_timeout = timeout;
        self
    }
}
