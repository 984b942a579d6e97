//! Plugin handles
//!
//! A plugin handle is one attachment inside a session. Interception rules
//! depend on the plugin package, so handles are a closed set of variants
//! selected by the package name given in the `attach` request.

pub mod streaming;

pub use streaming::Streaming;

use log::{debug, warn};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};

use super::error::Result;
use super::message::JanusMessage;
use super::session::Session;
use super::transaction::TransactionRegistry;
use super::ProxyContext;
use crate::jobs::{self, Job};
use crate::streams::Stream;

pub const STREAMING_PLUGIN: &str = "janus.plugin.streaming";
pub const RTPBROADCAST_PLUGIN: &str = "janus.plugin.cm.rtpbroadcast";

/// Interception behavior of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginKind {
    /// Publishes and subscribes media channels
    Streaming,
    /// Relayed without interception
    Generic,
}

impl PluginKind {
    pub fn from_type(plugin_type: &str) -> Self {
        match plugin_type {
            STREAMING_PLUGIN | RTPBROADCAST_PLUGIN => PluginKind::Streaming,
            _ => PluginKind::Generic,
        }
    }
}

enum Variant {
    Streaming(Streaming),
    Generic,
}

pub struct Plugin {
    id: String,
    plugin_type: String,
    /// Lookup only; the session owns the plugin
    session: Weak<Session>,
    variant: Variant,
}

impl Plugin {
    pub fn new(id: impl Into<String>, plugin_type: impl Into<String>, session: &Arc<Session>) -> Arc<Self> {
        let plugin_type = plugin_type.into();
        let variant = match PluginKind::from_type(&plugin_type) {
            PluginKind::Streaming => Variant::Streaming(Streaming::new()),
            PluginKind::Generic => Variant::Generic,
        };
        Arc::new(Self {
            id: id.into(),
            plugin_type,
            session: Arc::downgrade(session),
            variant,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    pub fn kind(&self) -> PluginKind {
        match self.variant {
            Variant::Streaming(_) => PluginKind::Streaming,
            Variant::Generic => PluginKind::Generic,
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session().map(|s| s.id().to_string())
    }

    /// Session payload passed along to the media-control API
    pub fn session_data(&self) -> Value {
        self.session().map(|s| s.data().clone()).unwrap_or(Value::Null)
    }

    pub(crate) fn streaming(&self) -> Option<&Streaming> {
        match self.variant {
            Variant::Streaming(ref streaming) => Some(streaming),
            Variant::Generic => None,
        }
    }

    pub fn stream(&self) -> Option<Arc<Stream>> {
        self.streaming().and_then(Streaming::stream)
    }

    /// Intercept a client request addressed to this handle
    pub async fn process_client_message(
        self: &Arc<Self>,
        message: &JanusMessage,
        transactions: &TransactionRegistry,
        context: &Arc<ProxyContext>,
    ) -> Result<()> {
        match self.variant {
            Variant::Streaming(_) => streaming::process_client_message(self, message, transactions, context),
            Variant::Generic => Ok(()),
        }
    }

    /// Intercept a gateway event originating from this handle
    pub async fn process_gateway_message(
        self: &Arc<Self>,
        message: &JanusMessage,
        context: &Arc<ProxyContext>,
    ) -> Result<()> {
        if message.janus() == Some("event") {
            self.submit_job(message, context);
        }
        match self.variant {
            Variant::Streaming(_) => streaming::process_gateway_message(self, message, context).await,
            Variant::Generic => Ok(()),
        }
    }

    fn submit_job(&self, message: &JanusMessage, context: &ProxyContext) {
        let data = match message.plugin_data() {
            Some(data) => data,
            None => return,
        };
        match Job::from_event(&self.plugin_type, data) {
            Ok(Some(job)) => jobs::dispatch(context.jobs.clone(), job),
            Ok(None) => {}
            Err(e) => warn!("{} sent an unusable job event: {}", self, e),
        }
    }

    /// Release the attached stream, if any
    pub async fn remove_stream(&self, context: &ProxyContext) {
        if let Some(streaming) = self.streaming() {
            streaming.remove_stream(context).await;
        }
    }

    /// Called when the handle is detached or its session goes away
    pub async fn on_remove(&self, context: &ProxyContext) {
        self.remove_stream(context).await;
        debug!("{} removed", self);
    }

    /// Ask the gateway to drop this handle; failures are only logged
    pub(crate) async fn detach(&self, context: &ProxyContext) {
        let session_id = match self.session_id() {
            Some(id) => id,
            None => {
                warn!("Cannot detach {}: session is gone", self);
                return;
            }
        };
        if let Err(e) = context.gateway.detach(&session_id, &self.id).await {
            warn!("Detach of {} failed: {}", self, e);
        }
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plugin{{id: {}, type: {}}}", self.id, self.plugin_type)
    }
}
