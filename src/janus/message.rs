//! Read-only view of a Janus protocol frame
//!
//! The proxy never rewrites frames. It parses them only to look at the few
//! fields that drive interception; the original text is what gets forwarded.

use serde_json::Value;
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq)]
pub struct JanusMessage(Value);

impl JanusMessage {
    /// Parse a text frame; anything but a JSON object yields `None`
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => Some(Self(value)),
            _ => None,
        }
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Top-level `janus` discriminator
    pub fn janus(&self) -> Option<&str> {
        self.0.get("janus").and_then(Value::as_str)
    }

    pub fn transaction(&self) -> Option<&str> {
        self.0.get("transaction").and_then(Value::as_str)
    }

    pub fn session_id(&self) -> Option<String> {
        id_string(self.0.get("session_id"))
    }

    /// Plugin handle a client request is addressed to
    pub fn handle_id(&self) -> Option<String> {
        id_string(self.0.get("handle_id"))
    }

    /// Plugin handle a gateway event originates from
    pub fn sender(&self) -> Option<String> {
        id_string(self.0.get("sender"))
    }

    /// Plugin package name of an `attach` request
    pub fn plugin(&self) -> Option<&str> {
        self.0.get("plugin").and_then(Value::as_str)
    }

    pub fn body(&self) -> Option<&Value> {
        self.0.get("body")
    }

    /// `body.request` of a plugin message
    pub fn request(&self) -> Option<&str> {
        self.body()
            .and_then(|body| body.get("request"))
            .and_then(Value::as_str)
    }

    /// Id assigned by a `success` reply to `create` / `attach`
    pub fn data_id(&self) -> Option<String> {
        id_string(self.0.pointer("/data/id"))
    }

    pub fn plugindata(&self) -> Option<&Value> {
        self.0.get("plugindata")
    }

    /// `plugindata.data`
    pub fn plugin_data(&self) -> Option<&Value> {
        self.0.pointer("/plugindata/data")
    }

    /// `plugindata.data.id`
    pub fn plugin_data_id(&self) -> Option<String> {
        id_string(self.0.pointer("/plugindata/data/id"))
    }

    pub fn is_success(&self) -> bool {
        self.janus() == Some("success")
    }
}

impl Deref for JanusMessage {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.0
    }
}

/// Gateway ids are numbers on the wire; the proxy keys everything by string
pub fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
