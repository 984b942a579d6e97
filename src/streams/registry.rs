//! Registry of streams accepted by the media-control API
//!
//! Shared by every session pair. Mutations take the write lock; lookups
//! clone `Arc`s out so callers never hold the lock.

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Stream, StreamInfo};

#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, Arc<Stream>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream, replacing any entry with the same id
    pub fn add(&self, stream: Arc<Stream>) {
        let id = stream.id.clone();
        info!("Storing {} for plugin {}", stream, stream.plugin_id);
        if self.streams.write().insert(id, stream).is_some() {
            debug!("Replaced an existing stream entry");
        }
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Stream>> {
        let removed = self.streams.write().remove(id);
        if let Some(ref stream) = removed {
            info!("Removed {}", stream);
        }
        removed
    }

    pub fn has(&self, id: &str) -> bool {
        self.streams.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Stream>> {
        self.streams.read().get(id).cloned()
    }

    /// Snapshot of all registered streams
    pub fn list(&self) -> Vec<Arc<Stream>> {
        self.streams.read().values().cloned().collect()
    }

    pub fn infos(&self) -> Vec<StreamInfo> {
        self.streams.read().values().map(|s| s.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StreamRole;
    use crate::testing::streaming_plugin;
    use serde_json::json;

    #[test]
    fn add_get_remove() {
        let (_session, plugin) = streaming_plugin("session-1", "plugin-1");
        let registry = StreamRegistry::new();
        let stream = Arc::new(Stream::with_id(
            "stream-1".into(),
            "chan".into(),
            json!("cd"),
            StreamRole::Publisher,
            &plugin,
        ));

        registry.add(stream.clone());
        assert!(registry.has("stream-1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("stream-1").unwrap().channel_name, "chan");

        let info = &registry.infos()[0];
        assert_eq!(info.session_id, "session-1");
        assert_eq!(info.plugin_id, "plugin-1");

        assert!(registry.remove("stream-1").is_some());
        assert!(registry.remove("stream-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn stream_keeps_weak_plugin_reference() {
        let (session, plugin) = streaming_plugin("session-1", "plugin-1");
        let stream = Stream::new("chan".into(), json!(null), StreamRole::Subscriber, &plugin);
        assert!(Arc::ptr_eq(&stream.plugin().unwrap(), &plugin));

        drop(session);
        drop(plugin);
        assert!(stream.plugin().is_none());
    }
}
