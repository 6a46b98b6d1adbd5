//! Application state for the RAG server

use std::sync::Arc;
use std::time::Instant;

use crate::config::RagConfig;
use crate::pipeline::RagPipeline;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Pipeline shared by every handler
    pipeline: Arc<RagPipeline>,
    started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                pipeline,
                started_at: Instant::now(),
            }),
        }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.inner.pipeline
    }

    pub fn config(&self) -> &RagConfig {
        self.inner.pipeline.config()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
