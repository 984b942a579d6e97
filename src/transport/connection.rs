//! Uniform wrapper around one WebSocket
//!
//! A `Connection` owns a writer task fed by an unbounded channel and a reader
//! task that turns incoming frames into `ConnectionEvent`s. Both the
//! client-facing and the gateway-facing side of a session pair use it.

use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Which side of the proxy a connection faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Gateway,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Gateway => "gateway",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications delivered in transport order
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Text frame, kept verbatim
    Message(String),
    /// Binary frame, relayed opaque
    Binary(Vec<u8>),
    /// Transport failure; a `Closed` event follows
    Error(String),
    /// Emitted exactly once
    Closed,
}

/// Commands for the writer task
#[derive(Debug, PartialEq)]
pub(crate) enum Outbound {
    Frame(Message),
    Close,
}

pub struct Connection {
    role: Role,
    open: AtomicBool,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl Connection {
    fn with_channels(
        role: Role,
        outbound: mpsc::UnboundedSender<Outbound>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            role,
            open: AtomicBool::new(true),
            outbound,
            events,
        }
    }

    /// Wrap a WebSocket, spawning its reader and writer tasks
    pub fn spawn<S>(role: Role, socket: S) -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>)
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin + 'static,
    {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::unbounded_channel::<ConnectionEvent>();
        let connection = Arc::new(Self::with_channels(role, outbound_tx, events_tx));
        let (mut write, mut read) = socket.split();

        tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    Outbound::Frame(msg) => {
                        if let Err(e) = write.send(msg).await {
                            debug!("{} write failed: {}", role, e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        let reader = connection.clone();
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => reader.emit(ConnectionEvent::Message(text.to_string())),
                    Ok(Message::Binary(data)) => reader.emit(ConnectionEvent::Binary(data.to_vec())),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        if reader.is_open() {
                            reader.emit(ConnectionEvent::Error(e.to_string()));
                        }
                        break;
                    }
                }
            }
            reader.shutdown();
        });

        (connection, events_rx)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Queue a text frame
    pub fn send(&self, text: impl Into<String>) {
        self.send_frame(Message::Text(text.into()));
    }

    pub fn send_json(&self, value: &Value) {
        self.send(value.to_string());
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        self.send_frame(Message::Binary(data));
    }

    fn send_frame(&self, msg: Message) {
        if !self.is_open() {
            debug!("Dropping frame on closed {} connection", self.role);
            return;
        }
        if self.outbound.send(Outbound::Frame(msg)).is_err() {
            warn!("{} writer is gone, frame dropped", self.role);
        }
    }

    /// Close the connection; repeated calls have no effect
    pub fn close(&self) {
        if self.shutdown() {
            let _ = self.outbound.send(Outbound::Close);
        }
    }

    fn shutdown(&self) -> bool {
        if self.open.swap(false, Ordering::AcqRel) {
            info!("{} connection closed", self.role);
            self.emit(ConnectionEvent::Closed);
            true
        } else {
            false
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
pub(crate) struct Detached {
    pub connection: Arc<Connection>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

#[cfg(test)]
impl Connection {
    /// Connection with no socket behind it
    pub(crate) fn detached(role: Role) -> Detached {
        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        Detached {
            connection: Arc::new(Self::with_channels(role, outbound_tx, events_tx)),
            outbound,
            events,
        }
    }

    /// Simulate a frame arriving from the peer
    pub(crate) fn inject(&self, event: ConnectionEvent) {
        self.emit(event);
    }

    /// Simulate the peer going away
    pub(crate) fn drop_peer(&self) {
        self.shutdown();
    }
}

#[cfg(test)]
impl Detached {
    /// Hand the event stream to a consumer, leaving an empty one behind
    pub(crate) fn take_events(&mut self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (_, empty) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.events, empty)
    }

    /// Next text frame written, waiting for it if needed
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        while let Some(command) = self.outbound.recv().await {
            if let Outbound::Frame(Message::Text(text)) = command {
                return Some(text.to_string());
            }
        }
        None
    }

    /// Text frames written so far
    pub(crate) fn sent_text(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(command) = self.outbound.try_recv() {
            if let Outbound::Frame(Message::Text(text)) = command {
                frames.push(text.to_string());
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn close_is_idempotent_and_notifies_once() {
        let mut detached = Connection::detached(Role::Client);
        assert!(detached.connection.is_open());

        detached.connection.close();
        detached.connection.close();

        assert!(!detached.connection.is_open());
        assert_eq!(detached.events.try_recv(), Ok(ConnectionEvent::Closed));
        assert!(detached.events.try_recv().is_err());
        assert_eq!(detached.outbound.try_recv(), Ok(Outbound::Close));
        assert!(detached.outbound.try_recv().is_err());
    }

    #[test]
    fn send_after_close_is_dropped() {
        let mut detached = Connection::detached(Role::Gateway);
        detached.connection.send("before");
        detached.connection.close();
        detached.connection.send("after");

        assert_eq!(detached.sent_text(), vec!["before".to_string()]);
    }

    #[tokio::test]
    async fn relays_frames_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let received = ws.next().await.unwrap().unwrap();
            ws.send(Message::Text("pong".into())).await.unwrap();
            received
        });

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        let (connection, mut events) = Connection::spawn(Role::Gateway, ws);
        connection.send(r#"{"janus":"keepalive"}"#);

        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Message("pong".to_string()))
        );
        assert_eq!(
            server.await.unwrap(),
            Message::Text(r#"{"janus":"keepalive"}"#.into())
        );

        // Server dropped its socket; the reader reports the close once
        let mut closed = 0;
        while let Some(event) = events.recv().await {
            if event == ConnectionEvent::Closed {
                closed += 1;
                break;
            }
        }
        assert_eq!(closed, 1);
        assert!(!connection.is_open());
    }
}
