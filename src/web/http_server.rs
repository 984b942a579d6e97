//! HTTP server for health checks and stream control

use crate::web::shared::SharedState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStreamRequest {
    pub stream_id: String,
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/stopStream", post(stop_stream_handler))
        .with_state(state)
}

/// Run the status HTTP server
pub async fn run_http_server(
    host: &str,
    port: u16,
    state: Arc<SharedState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Health check handler
async fn health_handler(State(state): State<Arc<SharedState>>) -> Response {
    json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "uptime_seconds": state.uptime().as_secs_f64(),
            "connections": state.connection_count(),
            "streams": state.streams().len(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Registered streams
async fn status_handler(State(state): State<Arc<SharedState>>) -> Response {
    json_response(StatusCode::OK, json!(state.streams().infos()))
}

/// Force the gateway to detach the plugin owning a stream
async fn stop_stream_handler(
    State(state): State<Arc<SharedState>>,
    Json(request): Json<StopStreamRequest>,
) -> Response {
    let stream = match state.streams().get(&request.stream_id) {
        Some(stream) => stream,
        None => {
            return json_response(
                StatusCode::NOT_FOUND,
                json!({"error": format!("Unknown stream {}", request.stream_id)}),
            )
        }
    };

    info!("Stopping {} on request", stream);
    match state
        .context()
        .gateway
        .detach(&stream.session_id, &stream.plugin_id)
        .await
    {
        Ok(()) => json_response(StatusCode::OK, json!({"status": "ok"})),
        Err(e) => {
            warn!("Cannot stop {}: {}", stream, e);
            json_response(StatusCode::BAD_GATEWAY, json!({"error": e.to_string()}))
        }
    }
}

fn json_response(status: StatusCode, payload: Value) -> Response {
    let mut response = Response::new(Body::from(payload.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, GatewayControl};
    use crate::config::ProxyConfig;
    use crate::janus::{JanusProxy, ProxyContext};
    use crate::testing::{fakes, publisher_stream, streaming_plugin, FakeJobs, FakeMedia};
    use async_trait::async_trait;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state_for(context: Arc<ProxyContext>) -> Arc<SharedState> {
        Arc::new(SharedState::new(JanusProxy::new(ProxyConfig::default(), context)))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn stop_request(stream_id: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/stopStream")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"streamId": stream_id}).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let fakes = fakes();
        let (_session, plugin) = streaming_plugin("session-id", "plugin-id");
        publisher_stream(&plugin, &fakes.context);
        let app = router(state_for(fakes.context.clone()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["streams"], 1);
    }

    #[tokio::test]
    async fn status_lists_streams() {
        let fakes = fakes();
        let (_session, plugin) = streaming_plugin("session-id", "plugin-id");
        let stream = publisher_stream(&plugin, &fakes.context);
        let app = router(state_for(fakes.context.clone()));

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(
            body,
            json!([{
                "id": stream.id,
                "channelName": "channel-name",
                "role": "publisher",
                "sessionId": "session-id",
                "pluginId": "plugin-id"
            }])
        );
    }

    #[tokio::test]
    async fn stop_stream_detaches_owner() {
        let fakes = fakes();
        let (_session, plugin) = streaming_plugin("session-id", "plugin-id");
        let stream = publisher_stream(&plugin, &fakes.context);
        let app = router(state_for(fakes.context.clone()));

        let response = app.oneshot(stop_request(&stream.id)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            fakes.gateway.detached(),
            vec![("session-id".to_string(), "plugin-id".to_string())]
        );
    }

    #[tokio::test]
    async fn stop_unknown_stream_is_not_found() {
        let fakes = fakes();
        let app = router(state_for(fakes.context.clone()));

        let response = app.oneshot(stop_request("missing")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(fakes.gateway.detached().is_empty());
    }

    struct RejectingGateway;

    #[async_trait]
    impl GatewayControl for RejectingGateway {
        async fn detach(&self, _session_id: &str, _plugin_id: &str) -> Result<(), ApiError> {
            Err(ApiError::Rejected("No such handle".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_detach_is_bad_gateway() {
        let context = Arc::new(ProxyContext::new(
            Arc::new(FakeMedia::default()),
            Arc::new(RejectingGateway),
            Arc::new(FakeJobs::default()),
        ));
        let (_session, plugin) = streaming_plugin("session-id", "plugin-id");
        let stream = publisher_stream(&plugin, &context);
        let app = router(state_for(context));

        let response = app.oneshot(stop_request(&stream.id)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "No such handle");
    }
}
