//! Proxy listener
//!
//! Accepts client WebSockets, opens the matching gateway WebSocket and keeps
//! a registry of live session pairs.

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::connection::JanusConnection;
use super::error::Result;
use super::ProxyContext;
use crate::config::ProxyConfig;
use crate::transport::{Connection, Role};

type GatewaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct JanusProxy {
    config: ProxyConfig,
    context: Arc<ProxyContext>,
    connections: RwLock<HashMap<String, Arc<JanusConnection>>>,
}

impl JanusProxy {
    pub fn new(config: ProxyConfig, context: Arc<ProxyContext>) -> Arc<Self> {
        Arc::new(Self {
            config,
            context,
            connections: RwLock::new(HashMap::new()),
        })
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        &self.context
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Janus proxy listening on {} (gateway {})",
            listener.local_addr()?,
            self.config.gateway_address
        );
        Ok(listener)
    }

    /// Accept clients until the listener fails
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let proxy = self.clone();
                    tokio::spawn(async move { proxy.handle_socket(stream, peer).await });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run_until<F>(self: &Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        tokio::select! {
            _ = shutdown => {
                info!("Proxy shutdown requested");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    async fn handle_socket(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        debug!("Incoming connection from {}", peer);
        let subprotocol = self.config.subprotocol.as_str();
        let negotiate = |request: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
            if offers_subprotocol(request, subprotocol) {
                if let Ok(value) = HeaderValue::from_str(subprotocol) {
                    response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                }
            }
            Ok(response)
        };

        let mut client_ws = match tokio_tungstenite::accept_hdr_async(stream, negotiate).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };

        let gateway_ws = match self.open_gateway().await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Cannot open gateway connection {} for {}: {}", self.config.gateway_address, peer, e);
                let _ = client_ws.close(None).await;
                return;
            }
        };

        let (client, client_events) = Connection::spawn(Role::Client, client_ws);
        let (gateway, gateway_events) = Connection::spawn(Role::Gateway, gateway_ws);
        let pair = JanusConnection::new(client, gateway, self.context.clone());
        self.establish_connection(pair.clone());

        pair.clone().run(client_events, gateway_events).await;
        self.remove_connection(pair.id()).await;
    }

    async fn open_gateway(&self) -> std::result::Result<GatewaySocket, WsError> {
        let mut request = self.config.gateway_address.as_str().into_client_request()?;
        let protocol = HeaderValue::from_str(&self.config.subprotocol).map_err(|e| WsError::HttpFormat(e.into()))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(ws)
    }

    fn establish_connection(&self, pair: Arc<JanusConnection>) {
        info!("Registering {}", pair);
        self.connections.write().insert(pair.id().to_string(), pair);
    }

    /// Deregister a pair and release its session
    pub async fn remove_connection(&self, id: &str) {
        let pair = self.connections.write().remove(id);
        if let Some(pair) = pair {
            pair.close();
            pair.on_remove().await;
            info!("Removed {}", pair);
        }
    }

    /// Close every live pair; returns once all were asked to close
    pub async fn stop(&self) {
        let pairs: Vec<Arc<JanusConnection>> = self.connections.write().drain().map(|(_, p)| p).collect();
        info!("Stopping proxy, closing {} connection(s)", pairs.len());
        for pair in pairs {
            pair.close();
            pair.on_remove().await;
        }
    }

    pub fn connections(&self) -> Vec<Arc<JanusConnection>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

fn offers_subprotocol(request: &Request, subprotocol: &str) -> bool {
    request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|offered| offered.trim() == subprotocol)
}
