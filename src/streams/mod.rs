//! Media streams tracked by the proxy
//!
//! A `Stream` is created by a streaming plugin and lands in the
//! `StreamRegistry` only once the media-control API accepted the publish or
//! subscribe call for it.

pub mod registry;

pub use registry::StreamRegistry;

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::janus::plugin::Plugin;

/// Whether the stream feeds a channel or watches it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Publisher,
    Subscriber,
}

pub struct Stream {
    /// Locally generated id, also used as the client key
    pub id: String,
    /// Routing key understood by the media-control API
    pub channel_name: String,
    pub channel_data: Value,
    pub role: StreamRole,
    pub session_id: String,
    pub plugin_id: String,
    plugin: Weak<Plugin>,
}

/// Serializable view used by the status API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub id: String,
    pub channel_name: String,
    pub role: StreamRole,
    pub session_id: String,
    pub plugin_id: String,
}

impl Stream {
    /// Create a stream owned by `plugin` with a fresh id
    pub fn new(channel_name: String, channel_data: Value, role: StreamRole, plugin: &Arc<Plugin>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), channel_name, channel_data, role, plugin)
    }

    pub fn with_id(
        id: String,
        channel_name: String,
        channel_data: Value,
        role: StreamRole,
        plugin: &Arc<Plugin>,
    ) -> Self {
        Self {
            id,
            channel_name,
            channel_data,
            role,
            session_id: plugin.session_id().unwrap_or_default(),
            plugin_id: plugin.id().to_string(),
            plugin: Arc::downgrade(plugin),
        }
    }

    /// Owning plugin, if it is still alive
    pub fn plugin(&self) -> Option<Arc<Plugin>> {
        self.plugin.upgrade()
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            id: self.id.clone(),
            channel_name: self.channel_name.clone(),
            role: self.role,
            session_id: self.session_id.clone(),
            plugin_id: self.plugin_id.clone(),
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream{{id: {}, channel: {}}}", self.id, self.channel_name)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("channel_name", &self.channel_name)
            .field("role", &self.role)
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}
