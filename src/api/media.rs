//! HTTP client for the media-control API
//!
//! Every call is a form POST to `<base_url>/CM_Janus_RpcEndpoints.<method>`
//! carrying the proxy's server key.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{ApiError, MediaControl};

const RPC_PREFIX: &str = "CM_Janus_RpcEndpoints";

#[derive(Clone)]
pub struct CmApiClient {
    http: Client,
    base_url: String,
    server_key: String,
}

impl CmApiClient {
    pub fn new(base_url: impl Into<String>, server_key: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            server_key: server_key.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}.{}", self.base_url.trim_end_matches('/'), RPC_PREFIX, method)
    }

    async fn call(&self, method: &str, mut form: Vec<(&'static str, String)>) -> Result<(), ApiError> {
        form.push(("serverKey", self.server_key.clone()));
        let url = self.endpoint(method);

        let res = match self.http.post(&url).form(&form).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("{} request failed: {}", method, e);
                return Err(e.into());
            }
        };

        if res.status().is_success() {
            debug!("{} response OK", method);
            Ok(())
        } else {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            error!("{} error: {}", method, status);
            error!("{}", body);
            Err(ApiError::Status { status, body })
        }
    }
}

#[async_trait]
impl MediaControl for CmApiClient {
    async fn publish(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError> {
        self.call("publish", stream_form(channel_name, client_key, start, session_data, channel_data))
            .await
    }

    async fn unpublish(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError> {
        self.call(
            "unpublish",
            vec![
                ("streamName", channel_name.to_string()),
                ("clientKey", client_key.to_string()),
            ],
        )
        .await
    }

    async fn subscribe(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError> {
        self.call("subscribe", stream_form(channel_name, client_key, start, session_data, channel_data))
            .await
    }

    async fn unsubscribe(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError> {
        self.call(
            "unsubscribe",
            vec![
                ("streamName", channel_name.to_string()),
                ("clientKey", client_key.to_string()),
            ],
        )
        .await
    }
}

fn stream_form(
    channel_name: &str,
    client_key: &str,
    start: f64,
    session_data: &Value,
    channel_data: &Value,
) -> Vec<(&'static str, String)> {
    vec![
        ("streamName", channel_name.to_string()),
        ("clientKey", client_key.to_string()),
        ("start", format!("{}", start.trunc() as u64)),
        ("data", form_value(session_data)),
        ("channelData", form_value(channel_data)),
    ]
}

/// Strings go out raw, everything else as JSON text
fn form_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoint_joins_base_url_and_method() {
        let client = CmApiClient::new("http://cm.local/rpc/", "key", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint("publish"),
            "http://cm.local/rpc/CM_Janus_RpcEndpoints.publish"
        );
    }

    #[test]
    fn form_values() {
        assert_eq!(form_value(&json!("session-data")), "session-data");
        assert_eq!(form_value(&Value::Null), "");
        assert_eq!(form_value(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn stream_form_fields() {
        let form = stream_form("chan", "key-1", 1700000000.75, &json!("sd"), &json!("cd"));
        assert_eq!(form[0], ("streamName", "chan".to_string()));
        assert_eq!(form[1], ("clientKey", "key-1".to_string()));
        assert_eq!(form[2], ("start", "1700000000".to_string()));
        assert_eq!(form[3], ("data", "sd".to_string()));
        assert_eq!(form[4], ("channelData", "cd".to_string()));
    }

    #[tokio::test]
    async fn unreachable_api_is_an_error() {
        // Reserve a port, then free it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CmApiClient::new(format!("http://{}", addr), "key", Duration::from_secs(2)).unwrap();
        let result = client.unpublish("chan", "key-1").await;
        assert!(matches!(result, Err(ApiError::Http(_))));
    }
}
