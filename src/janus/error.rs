//! Error taxonomy for the proxy
//!
//! Failures are either recoverable protocol errors, reported back to the
//! client as a Janus `error` frame while the connection stays open, or fatal
//! errors that terminate the session pair.

use serde_json::{json, Value};
use std::error::Error;
use std::fmt;

/// Generic error code used when an external side effect fails
pub const CODE_SIDE_EFFECT_FAILED: u16 = 490;

/// Request reused a transaction id that is still awaiting its reply
pub const CODE_DUPLICATE_TRANSACTION: u16 = 409;

/// Recoverable protocol error, reported to the client
#[derive(Debug, Clone, PartialEq)]
pub struct JanusError {
    pub code: u16,
    pub reason: String,
    pub transaction: Option<String>,
}

impl JanusError {
    pub fn new(reason: impl Into<String>, code: u16, transaction: Option<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            transaction,
        }
    }

    /// Build the frame sent back on the client connection
    pub fn to_message(&self) -> Value {
        let mut message = json!({
            "janus": "error",
            "error": {
                "code": self.code,
                "reason": self.reason,
            }
        });
        if let Some(ref transaction) = self.transaction {
            message["transaction"] = Value::String(transaction.clone());
        }
        message
    }
}

impl fmt::Display for JanusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Janus error {}: {}", self.code, self.reason)?;
        if let Some(ref transaction) = self.transaction {
            write!(f, " (transaction {})", transaction)?;
        }
        Ok(())
    }
}

impl Error for JanusError {}

/// Error kind tag used by the connection-level error handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Recoverable,
    Fatal,
}

/// Proxy-wide error type
#[derive(Debug)]
pub enum ProxyError {
    /// Reported to the client, connection stays open
    Recoverable(JanusError),
    /// Terminates the session pair
    Fatal(String),
}

impl ProxyError {
    pub fn recoverable(reason: impl Into<String>, code: u16, transaction: Option<String>) -> Self {
        ProxyError::Recoverable(JanusError::new(reason, code, transaction))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ProxyError::Fatal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Recoverable(_) => ErrorKind::Recoverable,
            ProxyError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Recoverable(err) => write!(f, "{}", err),
            ProxyError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl Error for ProxyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProxyError::Recoverable(err) => Some(err),
            ProxyError::Fatal(_) => None,
        }
    }
}

impl From<JanusError> for ProxyError {
    fn from(err: JanusError) -> Self {
        ProxyError::Recoverable(err)
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Fatal(format!("JSON error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProxyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ProxyError::Fatal(format!("WebSocket error: {}", err))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Fatal(format!("I/O error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
