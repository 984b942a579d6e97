//! Streaming plugin interception
//!
//! `create` publishes a channel once the gateway accepts it; `watch` attaches
//! a stream without registering it. Whenever the gateway reports `webrtcup`
//! the attached stream is subscribed. Failed side effects detach the handle
//! and surface a recoverable error to the client.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use super::Plugin;
use crate::api::ApiError;
use crate::janus::error::{ProxyError, Result, CODE_SIDE_EFFECT_FAILED};
use crate::janus::message::{id_string, JanusMessage};
use crate::janus::transaction::TransactionRegistry;
use crate::janus::ProxyContext;
use crate::streams::{Stream, StreamRegistry, StreamRole};

/// A media-control call the API has acknowledged for the attached stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Published,
    Subscribed,
}

#[derive(Default)]
struct Slot {
    stream: Option<Arc<Stream>>,
    published: bool,
    subscribed: bool,
    subscribing: bool,
}

impl Slot {
    fn holds(&self, stream: &Arc<Stream>) -> bool {
        self.stream.as_ref().map_or(false, |s| Arc::ptr_eq(s, stream))
    }
}

/// Per-handle state of a streaming plugin
#[derive(Default)]
pub struct Streaming {
    slot: Mutex<Slot>,
}

impl Streaming {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self) -> Option<Arc<Stream>> {
        self.slot.lock().stream.clone()
    }

    /// Attach `stream` with nothing acknowledged yet
    pub(crate) fn attach(&self, stream: Arc<Stream>) {
        *self.slot.lock() = Slot {
            stream: Some(stream),
            ..Slot::default()
        };
    }

    /// Record an acknowledged call and register the stream
    ///
    /// Returns false, registering nothing, when `stream` is no longer the
    /// attached one.
    pub(crate) fn confirm(
        &self,
        stream: &Arc<Stream>,
        registration: Registration,
        streams: &StreamRegistry,
    ) -> bool {
        let mut slot = self.slot.lock();
        if !slot.holds(stream) {
            return false;
        }
        match registration {
            Registration::Published => slot.published = true,
            Registration::Subscribed => {
                slot.subscribed = true;
                slot.subscribing = false;
            }
        }
        streams.add(stream.clone());
        true
    }

    /// Claim the attached stream for subscribing, at most once per stream
    fn claim_subscription(&self) -> Option<Arc<Stream>> {
        let mut slot = self.slot.lock();
        if slot.subscribed || slot.subscribing {
            return None;
        }
        let stream = slot.stream.clone()?;
        slot.subscribing = true;
        Some(stream)
    }

    /// Detach the stream, returning what the API acknowledged for it
    fn take(&self, only: Option<&Arc<Stream>>) -> Option<(Arc<Stream>, bool, bool)> {
        let mut slot = self.slot.lock();
        if let Some(stream) = only {
            if !slot.holds(stream) {
                return None;
            }
        }
        let taken = std::mem::take(&mut *slot);
        taken.stream.map(|stream| (stream, taken.published, taken.subscribed))
    }

    /// Release the attached stream on the media-control API
    ///
    /// No-op when nothing is attached, so repeated calls are harmless. Calls
    /// still in flight release their own result once they complete.
    pub async fn remove_stream(&self, context: &ProxyContext) {
        if let Some((stream, published, subscribed)) = self.take(None) {
            release(&stream, published, subscribed, context).await;
        }
    }

    /// Like `remove_stream`, but only if `stream` is still the attached one
    async fn remove_if_attached(&self, stream: &Arc<Stream>, context: &ProxyContext) {
        if let Some((stream, published, subscribed)) = self.take(Some(stream)) {
            release(&stream, published, subscribed, context).await;
        }
    }
}

async fn release(stream: &Arc<Stream>, published: bool, subscribed: bool, context: &ProxyContext) {
    context.streams.remove(&stream.id);
    if published {
        if let Err(e) = context.media.unpublish(&stream.channel_name, &stream.id).await {
            warn!("Unpublishing {} failed: {}", stream, e);
        }
    }
    if subscribed {
        if let Err(e) = context.media.unsubscribe(&stream.channel_name, &stream.id).await {
            warn!("Unsubscribing {} failed: {}", stream, e);
        }
    }
}

pub(super) fn process_client_message(
    plugin: &Arc<Plugin>,
    message: &JanusMessage,
    transactions: &TransactionRegistry,
    context: &Arc<ProxyContext>,
) -> Result<()> {
    if message.janus() != Some("message") {
        return Ok(());
    }
    let role = match message.request() {
        Some("create") => StreamRole::Publisher,
        Some("watch") => StreamRole::Subscriber,
        _ => return Ok(()),
    };
    let transaction = match message.transaction() {
        Some(t) => t.to_string(),
        None => {
            debug!("{} request without transaction, not intercepted", plugin);
            return Ok(());
        }
    };
    let body = message.body();
    let channel_name = match id_string(body.and_then(|b| b.get("id"))) {
        Some(name) => name,
        None => {
            debug!("{} request without channel id, not intercepted", plugin);
            return Ok(());
        }
    };
    let channel_data = body
        .and_then(|b| b.get("channel_data"))
        .cloned()
        .unwrap_or(Value::Null);

    let plugin = plugin.clone();
    let context = context.clone();
    transactions.add(transaction.clone(), move |reply| async move {
        if !accepted(role, &reply) {
            debug!("{} request {} not accepted", plugin, transaction);
            return Ok(());
        }
        let stream = Arc::new(Stream::new(channel_name, channel_data, role, &plugin));
        match role {
            StreamRole::Publisher => publish(&plugin, stream, Some(transaction), &context).await,
            StreamRole::Subscriber => {
                debug!("{} attached {} for watching", plugin, stream);
                replace_stream(&plugin, stream, &context).await;
                Ok(())
            }
        }
    })
}

/// `create` answers synchronously; `watch` may answer with an async event
fn accepted(role: StreamRole, reply: &JanusMessage) -> bool {
    match role {
        StreamRole::Publisher => reply.is_success() && reply.plugin_data_id().is_some(),
        StreamRole::Subscriber => {
            matches!(reply.janus(), Some("success") | Some("event"))
                && reply.pointer("/plugindata/data/error").is_none()
        }
    }
}

pub(super) async fn process_gateway_message(
    plugin: &Arc<Plugin>,
    message: &JanusMessage,
    context: &Arc<ProxyContext>,
) -> Result<()> {
    if message.janus() != Some("webrtcup") {
        return Ok(());
    }
    let stream = match plugin.streaming().and_then(Streaming::claim_subscription) {
        Some(stream) => stream,
        None => {
            debug!("{} has no stream to subscribe", plugin);
            return Ok(());
        }
    };
    subscribe(plugin, stream, message.transaction().map(str::to_string), context).await
}

async fn replace_stream(plugin: &Arc<Plugin>, stream: Arc<Stream>, context: &ProxyContext) {
    if plugin.stream().is_some() {
        plugin.remove_stream(context).await;
    }
    if let Some(streaming) = plugin.streaming() {
        streaming.attach(stream);
    }
}

async fn publish(
    plugin: &Arc<Plugin>,
    stream: Arc<Stream>,
    transaction: Option<String>,
    context: &ProxyContext,
) -> Result<()> {
    replace_stream(plugin, stream.clone(), context).await;
    let result = context
        .media
        .publish(
            &stream.channel_name,
            &stream.id,
            unix_now(),
            &plugin.session_data(),
            &stream.channel_data,
        )
        .await;

    match result {
        Ok(()) => {
            if !settle(plugin, &stream, Registration::Published, context) {
                if let Err(e) = context.media.unpublish(&stream.channel_name, &stream.id).await {
                    warn!("Unpublishing orphaned {} failed: {}", stream, e);
                }
                return Ok(());
            }
            info!("{} published {}", plugin, stream);
            Ok(())
        }
        Err(e) => Err(side_effect_failed(plugin, "publish", &stream, e, transaction, context).await),
    }
}

async fn subscribe(
    plugin: &Arc<Plugin>,
    stream: Arc<Stream>,
    transaction: Option<String>,
    context: &ProxyContext,
) -> Result<()> {
    let result = context
        .media
        .subscribe(
            &stream.channel_name,
            &stream.id,
            unix_now(),
            &plugin.session_data(),
            &stream.channel_data,
        )
        .await;

    match result {
        Ok(()) => {
            if !settle(plugin, &stream, Registration::Subscribed, context) {
                if let Err(e) = context.media.unsubscribe(&stream.channel_name, &stream.id).await {
                    warn!("Unsubscribing orphaned {} failed: {}", stream, e);
                }
                return Ok(());
            }
            info!("{} subscribed {}", plugin, stream);
            Ok(())
        }
        Err(e) => Err(side_effect_failed(plugin, "subscribe", &stream, e, transaction, context).await),
    }
}

/// Register an acknowledged call unless the stream was released meanwhile
fn settle(
    plugin: &Arc<Plugin>,
    stream: &Arc<Stream>,
    registration: Registration,
    context: &ProxyContext,
) -> bool {
    let attached = plugin
        .streaming()
        .map_or(false, |streaming| streaming.confirm(stream, registration, &context.streams));
    if !attached {
        warn!("{} was released while {:?} was in flight", stream, registration);
    }
    attached
}

/// Detach the handle, release the stream and build the client-facing error
async fn side_effect_failed(
    plugin: &Arc<Plugin>,
    action: &str,
    stream: &Arc<Stream>,
    err: ApiError,
    transaction: Option<String>,
    context: &ProxyContext,
) -> ProxyError {
    warn!("{} could not {} {}: {}", plugin, action, stream, err);
    plugin.detach(context).await;
    if let Some(streaming) = plugin.streaming() {
        streaming.remove_if_attached(stream, context).await;
    }
    ProxyError::recoverable(
        format!("Cannot {}: {} error: {}", action, stream.channel_name, err),
        CODE_SIDE_EFFECT_FAILED,
        transaction,
    )
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
