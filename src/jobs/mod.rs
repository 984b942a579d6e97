//! Post-processing jobs raised by gateway plugin events
//!
//! The proxy does not process media itself. When a plugin reports an event
//! such as a finished recording, a `Job` describing it is handed to a
//! `JobSink` and the outcome is only logged.

pub mod spool;

pub use spool::SpoolDirectory;

use async_trait::async_trait;
use log::{error, info};
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Plugin events that produce a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// Audio and video recordings are ready to be merged
    RecordingFinished,
    /// A thumbnail frame was captured
    ThumbnailCreated,
}

impl JobEvent {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "recording-finished" => Some(JobEvent::RecordingFinished),
            "thumbnail-created" => Some(JobEvent::ThumbnailCreated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobEvent::RecordingFinished => "recording-finished",
            JobEvent::ThumbnailCreated => "thumbnail-created",
        }
    }

    fn required_params(&self) -> &'static [&'static str] {
        match self {
            JobEvent::RecordingFinished => &["audio", "video", "streamChannelId"],
            JobEvent::ThumbnailCreated => &["thumb", "id"],
        }
    }
}

#[derive(Debug)]
pub enum JobError {
    MissingParameter(&'static str),
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::MissingParameter(name) => write!(f, "No `{}` parameter provided", name),
            JobError::Io(e) => write!(f, "Job spool I/O error: {}", e),
            JobError::Serialize(e) => write!(f, "Job serialization error: {}", e),
        }
    }
}

impl Error for JobError {}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Io(err)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::Serialize(err)
    }
}

/// Job description handed to the sink
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub event: String,
    pub plugin: String,
    pub data: Value,
}

impl Job {
    /// Build a job from a plugin event payload
    ///
    /// Returns `Ok(None)` when the payload names no known job event.
    pub fn from_event(plugin: &str, data: &Value) -> Result<Option<Job>, JobError> {
        let event = match data
            .get("event")
            .and_then(Value::as_str)
            .and_then(JobEvent::from_name)
        {
            Some(event) => event,
            None => return Ok(None),
        };

        for param in event.required_params() {
            if data.get(*param).is_none() {
                return Err(JobError::MissingParameter(*param));
            }
        }

        Ok(Some(Job {
            id: uuid::Uuid::new_v4().to_string(),
            event: event.as_str().to_string(),
            plugin: plugin.to_string(),
            data: data.clone(),
        }))
    }
}

/// Out-of-band job executor
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: &Job) -> Result<(), JobError>;
}

/// Submit without waiting; the result is only logged
pub fn dispatch(sink: Arc<dyn JobSink>, job: Job) {
    tokio::spawn(async move {
        match sink.submit(&job).await {
            Ok(()) => info!("Job {} ({}) submitted for {}", job.id, job.event, job.plugin),
            Err(e) => error!("Job {} ({}) failed: {}", job.id, job.event, e),
        }
    });
}
