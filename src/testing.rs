//! In-memory collaborators for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;

use crate::api::{ApiError, GatewayControl, MediaControl};
use crate::janus::plugin::streaming::Registration;
use crate::janus::plugin::{Plugin, STREAMING_PLUGIN};
use crate::janus::{ProxyContext, Session};
use crate::jobs::{Job, JobError, JobSink};
use crate::streams::{Stream, StreamRole};

#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Publish {
        channel_name: String,
        client_key: String,
        start: f64,
        session_data: Value,
        channel_data: Value,
    },
    Unpublish {
        channel_name: String,
        client_key: String,
    },
    Subscribe {
        channel_name: String,
        client_key: String,
        start: f64,
        session_data: Value,
        channel_data: Value,
    },
    Unsubscribe {
        channel_name: String,
        client_key: String,
    },
}

#[derive(Default)]
pub struct FakeMedia {
    calls: Mutex<Vec<MediaCall>>,
    fail_publish: Option<String>,
    fail_subscribe: Option<String>,
    gate: Option<Arc<Notify>>,
}

impl FakeMedia {
    pub fn failing_publish(reason: &str) -> Self {
        Self {
            fail_publish: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn failing_subscribe(reason: &str) -> Self {
        Self {
            fail_subscribe: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Publish and subscribe calls block until the returned gate is notified
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let media = Self {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (media, gate)
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().clone()
    }

    async fn pass_gate(&self) {
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
    }

    fn outcome(failure: &Option<String>) -> Result<(), ApiError> {
        match failure {
            Some(reason) => Err(ApiError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaControl for FakeMedia {
    async fn publish(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError> {
        self.calls.lock().push(MediaCall::Publish {
            channel_name: channel_name.to_string(),
            client_key: client_key.to_string(),
            start,
            session_data: session_data.clone(),
            channel_data: channel_data.clone(),
        });
        self.pass_gate().await;
        Self::outcome(&self.fail_publish)
    }

    async fn unpublish(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError> {
        self.calls.lock().push(MediaCall::Unpublish {
            channel_name: channel_name.to_string(),
            client_key: client_key.to_string(),
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        channel_name: &str,
        client_key: &str,
        start: f64,
        session_data: &Value,
        channel_data: &Value,
    ) -> Result<(), ApiError> {
        self.calls.lock().push(MediaCall::Subscribe {
            channel_name: channel_name.to_string(),
            client_key: client_key.to_string(),
            start,
            session_data: session_data.clone(),
            channel_data: channel_data.clone(),
        });
        self.pass_gate().await;
        Self::outcome(&self.fail_subscribe)
    }

    async fn unsubscribe(&self, channel_name: &str, client_key: &str) -> Result<(), ApiError> {
        self.calls.lock().push(MediaCall::Unsubscribe {
            channel_name: channel_name.to_string(),
            client_key: client_key.to_string(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGateway {
    detached: Mutex<Vec<(String, String)>>,
}

impl FakeGateway {
    pub fn detached(&self) -> Vec<(String, String)> {
        self.detached.lock().clone()
    }
}

#[async_trait]
impl GatewayControl for FakeGateway {
    async fn detach(&self, session_id: &str, plugin_id: &str) -> Result<(), ApiError> {
        self.detached
            .lock()
            .push((session_id.to_string(), plugin_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeJobs {
    jobs: Mutex<Vec<Job>>,
}

impl FakeJobs {
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl JobSink for FakeJobs {
    async fn submit(&self, job: &Job) -> Result<(), JobError> {
        self.jobs.lock().push(job.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub media: Arc<FakeMedia>,
    pub gateway: Arc<FakeGateway>,
    pub jobs: Arc<FakeJobs>,
    pub context: Arc<ProxyContext>,
}

pub fn fakes() -> Fakes {
    fakes_with(FakeMedia::default())
}

pub fn fakes_with(media: FakeMedia) -> Fakes {
    let media = Arc::new(media);
    let gateway = Arc::new(FakeGateway::default());
    let jobs = Arc::new(FakeJobs::default());
    let context = Arc::new(ProxyContext::new(media.clone(), gateway.clone(), jobs.clone()));
    Fakes {
        media,
        gateway,
        jobs,
        context,
    }
}

/// Session holding one streaming plugin
pub fn streaming_plugin(session_id: &str, plugin_id: &str) -> (Arc<Session>, Arc<Plugin>) {
    let session = Session::new(session_id, json!("session-data"));
    let plugin = Plugin::new(plugin_id, STREAMING_PLUGIN, &session);
    session
        .add_plugin(plugin.clone())
        .expect("fresh session accepts plugin");
    (session, plugin)
}

/// Attach a registered publisher stream to `plugin`
pub fn publisher_stream(plugin: &Arc<Plugin>, context: &ProxyContext) -> Arc<Stream> {
    let stream = Arc::new(Stream::new(
        "channel-name".to_string(),
        json!("channel-data"),
        StreamRole::Publisher,
        plugin,
    ));
    let streaming = plugin.streaming().expect("streaming plugin");
    streaming.attach(stream.clone());
    assert!(streaming.confirm(&stream, Registration::Published, &context.streams));
    stream
}

/// Whether a unix timestamp in seconds lies within a few seconds of now
pub fn is_recent(start: f64) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs_f64();
    (now - start).abs() < 5.0
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Await `future` with a test-sized timeout
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
