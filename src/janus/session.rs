//! Janus session
//!
//! Created when the gateway acknowledges a `create` request. Owns the plugin
//! handles attached within it.

use log::{debug, info};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::error::{ProxyError, Result};
use super::plugin::Plugin;
use super::ProxyContext;

pub struct Session {
    id: String,
    /// Opaque payload from the client's `create` request
    data: Value,
    plugins: RwLock<HashMap<String, Arc<Plugin>>>,
}

impl Session {
    pub fn new(id: impl Into<String>, data: Value) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            data,
            plugins: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn add_plugin(&self, plugin: Arc<Plugin>) -> Result<()> {
        let mut plugins = self.plugins.write();
        if plugins.contains_key(plugin.id()) {
            return Err(ProxyError::fatal(format!(
                "Plugin {} already attached to session {}",
                plugin.id(),
                self.id
            )));
        }
        info!("Added {} to {}", plugin, self);
        plugins.insert(plugin.id().to_string(), plugin);
        Ok(())
    }

    pub fn get_plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        self.plugins.read().get(id).cloned()
    }

    pub fn remove_plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        let removed = self.plugins.write().remove(id);
        if removed.is_some() {
            debug!("Removed plugin {} from {}", id, self);
        }
        removed
    }

    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.plugins.read().values().cloned().collect()
    }

    /// Tear down every plugin of the session
    pub async fn on_remove(&self, context: &ProxyContext) {
        let plugins: Vec<Arc<Plugin>> = self.plugins.write().drain().map(|(_, p)| p).collect();
        for plugin in plugins {
            plugin.on_remove(context).await;
        }
        info!("{} removed", self);
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session{{id: {}}}", self.id)
    }
}
