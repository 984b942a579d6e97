//! Client for the gateway's HTTP API
//!
//! Only the commands the proxy needs for compensating actions.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ApiError, GatewayControl};

#[derive(Clone)]
pub struct JanusHttpClient {
    http: Client,
    address: String,
}

impl JanusHttpClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            address: address.into(),
        })
    }

    fn handle_url(&self, session_id: &str, plugin_id: &str) -> String {
        format!("{}/{}/{}", self.address.trim_end_matches('/'), session_id, plugin_id)
    }
}

#[async_trait]
impl GatewayControl for JanusHttpClient {
    async fn detach(&self, session_id: &str, plugin_id: &str) -> Result<(), ApiError> {
        let body = json!({
            "janus": "detach",
            "transaction": uuid::Uuid::new_v4().to_string(),
        });
        let res = self
            .http
            .post(self.handle_url(session_id, plugin_id))
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }

        let reply: Value = res.json().await?;
        check_reply(&reply)?;
        debug!("Detached plugin {} of session {}", plugin_id, session_id);
        Ok(())
    }
}

/// The gateway answers HTTP 200 even for protocol errors
fn check_reply(reply: &Value) -> Result<(), ApiError> {
    if reply.get("janus").and_then(Value::as_str) == Some("error") {
        let reason = reply
            .pointer("/error/reason")
            .and_then(Value::as_str)
            .unwrap_or("unknown gateway error")
            .to_string();
        warn!("Gateway rejected request: {}", reason);
        return Err(ApiError::Rejected(reason));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_url_layout() {
        let client = JanusHttpClient::new("http://janus:8088/janus/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.handle_url("123", "456"), "http://janus:8088/janus/123/456");
    }

    #[test]
    fn error_replies_are_rejections() {
        let reply = json!({"janus": "error", "error": {"code": 458, "reason": "No such session"}});
        match check_reply(&reply) {
            Err(ApiError::Rejected(reason)) => assert_eq!(reason, "No such session"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(check_reply(&json!({"janus": "success"})).is_ok());
    }
}
