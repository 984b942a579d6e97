//! Session pair state machine
//!
//! A `JanusConnection` binds one client connection to one gateway
//! connection. Each direction is pumped by its own task: a frame is parsed,
//! intercepted (which may await side effects) and then forwarded verbatim.
//! Frames on one direction are never reordered.

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::error::{ProxyError, Result};
use super::message::JanusMessage;
use super::plugin::Plugin;
use super::session::Session;
use super::transaction::TransactionRegistry;
use super::ProxyContext;
use crate::transport::{Connection, ConnectionEvent, Role};

/// Lifecycle of a session pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Established,
    Closing,
    Closed,
}

pub struct JanusConnection {
    id: String,
    client: Arc<Connection>,
    gateway: Arc<Connection>,
    transactions: TransactionRegistry,
    session: RwLock<Option<Arc<Session>>>,
    state: watch::Sender<PairState>,
    context: Arc<ProxyContext>,
}

impl JanusConnection {
    pub fn new(client: Arc<Connection>, gateway: Arc<Connection>, context: Arc<ProxyContext>) -> Arc<Self> {
        let (state, _) = watch::channel(PairState::Established);
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            client,
            gateway,
            transactions: TransactionRegistry::new(context.transaction_timeout),
            session: RwLock::new(None),
            state,
            context,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> PairState {
        *self.state.borrow()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    pub fn transactions(&self) -> &TransactionRegistry {
        &self.transactions
    }

    fn plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        self.session().and_then(|s| s.get_plugin(id))
    }

    fn peer(&self, from: Role) -> &Connection {
        match from {
            Role::Client => &self.gateway,
            Role::Gateway => &self.client,
        }
    }

    /// Pump both directions until the pair closes
    pub async fn run(
        self: Arc<Self>,
        client_events: mpsc::UnboundedReceiver<ConnectionEvent>,
        gateway_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        info!("{} established", self);
        tokio::spawn(self.clone().pump(Role::Client, client_events));
        tokio::spawn(self.clone().pump(Role::Gateway, gateway_events));
        self.closed().await;
    }

    async fn pump(self: Arc<Self>, from: Role, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            if self.state() != PairState::Established {
                break;
            }
            match event {
                ConnectionEvent::Message(text) => self.relay(from, text).await,
                ConnectionEvent::Binary(data) => self.peer(from).send_binary(data),
                ConnectionEvent::Error(e) => {
                    self.handle_error(ProxyError::fatal(format!("{} connection error: {}", from, e)))
                }
                ConnectionEvent::Closed => {
                    debug!("{} side of {} went away", from, self);
                    self.close();
                    break;
                }
            }
        }
    }

    /// Intercept one frame and forward it unchanged on success
    async fn relay(self: &Arc<Self>, from: Role, text: String) {
        let result = match JanusMessage::parse(&text) {
            Some(message) => match from {
                Role::Client => self.process_client_message(&message).await,
                Role::Gateway => self.process_gateway_message(&message).await,
            },
            None => Ok(()),
        };
        match result {
            Ok(()) => self.peer(from).send(text),
            Err(e) => self.handle_error(e),
        }
    }

    pub fn handle_error(&self, err: ProxyError) {
        match err {
            ProxyError::Recoverable(e) => {
                info!("{}: {}", self, e);
                self.client.send_json(&e.to_message());
            }
            ProxyError::Fatal(msg) => {
                error!("{} failed: {}", self, msg);
                self.close();
            }
        }
    }

    pub async fn process_client_message(self: &Arc<Self>, message: &JanusMessage) -> Result<()> {
        let transaction = message.transaction();
        match (message.janus(), transaction) {
            (Some("create"), Some(transaction)) => {
                let token = message.get("token").cloned().unwrap_or(Value::Null);
                let pair = Arc::downgrade(self);
                self.transactions.add(transaction, move |reply| async move {
                    if let (Some(pair), Some(id)) = (pair.upgrade(), created_id(&reply)) {
                        pair.set_session(Session::new(id, token));
                    }
                    Ok(())
                })
            }
            (Some("attach"), Some(transaction)) => {
                let plugin_type = match message.plugin() {
                    Some(plugin_type) => plugin_type.to_string(),
                    None => return Ok(()),
                };
                let pair = Arc::downgrade(self);
                self.transactions.add(transaction, move |reply| async move {
                    match (pair.upgrade(), created_id(&reply)) {
                        (Some(pair), Some(id)) => pair.attach_plugin(id, plugin_type),
                        _ => Ok(()),
                    }
                })
            }
            (Some("detach"), Some(transaction)) => {
                let handle_id = match message.handle_id() {
                    Some(id) => id,
                    None => return Ok(()),
                };
                let pair = Arc::downgrade(self);
                self.transactions.add(transaction, move |reply| async move {
                    if let (Some(pair), true) = (pair.upgrade(), reply.is_success()) {
                        pair.remove_plugin(&handle_id).await;
                    }
                    Ok(())
                })
            }
            (Some("destroy"), Some(transaction)) => {
                let pair = Arc::downgrade(self);
                self.transactions.add(transaction, move |reply| async move {
                    if let (Some(pair), true) = (pair.upgrade(), reply.is_success()) {
                        pair.teardown_session().await;
                    }
                    Ok(())
                })
            }
            (Some("message"), _) => {
                let plugin = match message.handle_id().and_then(|id| self.plugin(&id)) {
                    Some(plugin) => plugin,
                    None => return Ok(()),
                };
                plugin
                    .process_client_message(message, &self.transactions, &self.context)
                    .await
            }
            _ => Ok(()),
        }
    }

    pub async fn process_gateway_message(self: &Arc<Self>, message: &JanusMessage) -> Result<()> {
        let janus = message.janus();
        if janus != Some("ack") {
            if let Some(transaction) = message.transaction() {
                if let Some(handler) = self.transactions.resolve(transaction, message.clone()) {
                    handler.await?;
                }
            }
        }

        match janus {
            Some("detached") => {
                if let Some(sender) = message.sender() {
                    self.remove_plugin(&sender).await;
                }
                Ok(())
            }
            Some("timeout") => {
                self.teardown_session().await;
                Ok(())
            }
            _ => match message.sender().and_then(|id| self.plugin(&id)) {
                Some(plugin) => plugin.process_gateway_message(message, &self.context).await,
                None => Ok(()),
            },
        }
    }

    fn set_session(&self, session: Arc<Session>) {
        info!("{} created {}", self, session);
        if let Some(previous) = self.session.write().replace(session) {
            warn!("{} replaced {}", self, previous);
        }
    }

    fn attach_plugin(&self, id: String, plugin_type: String) -> Result<()> {
        let session = match self.session() {
            Some(session) => session,
            None => {
                warn!("{} attached plugin {} without a session", self, id);
                return Ok(());
            }
        };
        let plugin = Plugin::new(id, plugin_type, &session);
        session.add_plugin(plugin)
    }

    async fn remove_plugin(&self, id: &str) {
        let plugin = match self.session().and_then(|s| s.remove_plugin(id)) {
            Some(plugin) => plugin,
            None => return,
        };
        plugin.on_remove(&self.context).await;
    }

    async fn teardown_session(&self) {
        let session = self.session.write().take();
        if let Some(session) = session {
            session.on_remove(&self.context).await;
        }
    }

    /// Close both sides; only the first call has an effect
    pub fn close(&self) {
        let closing = self.state.send_if_modified(|state| {
            if *state == PairState::Established {
                *state = PairState::Closing;
                true
            } else {
                false
            }
        });
        if !closing {
            return;
        }
        info!("{} closing", self);
        self.client.close();
        self.gateway.close();
        self.state.send_replace(PairState::Closed);
    }

    /// Resolves once the pair reached `Closed`
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == PairState::Closed).await;
    }

    /// Release everything the pair accumulated
    pub async fn on_remove(&self) {
        self.transactions.clear();
        self.teardown_session().await;
        debug!("{} removed", self);
    }
}

/// Id assigned by a successful `create` / `attach` reply
fn created_id(reply: &JanusMessage) -> Option<String> {
    if reply.is_success() {
        reply.data_id()
    } else {
        None
    }
}

impl fmt::Display for JanusConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JanusConnection{{id: {}}}", self.id)
    }
}
