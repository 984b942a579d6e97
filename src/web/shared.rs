//! Shared state for the status API

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::janus::{JanusProxy, ProxyContext};
use crate::streams::StreamRegistry;

#[derive(Clone)]
pub struct SharedState {
    pub proxy: Arc<JanusProxy>,

    /// Server start time
    pub start_time: Instant,
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("connections", &self.connection_count())
            .field("streams", &self.streams().len())
            .finish()
    }
}

impl SharedState {
    pub fn new(proxy: Arc<JanusProxy>) -> Self {
        Self {
            proxy,
            start_time: Instant::now(),
        }
    }

    pub fn context(&self) -> &Arc<ProxyContext> {
        self.proxy.context()
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.context().streams
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn connection_count(&self) -> usize {
        self.proxy.connection_count()
    }
}
