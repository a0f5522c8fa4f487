//! External item sink
//!
//! Mirrors consolidated tasks to an HTTP endpoint. Publishing happens on a
//! spawned task after consolidation succeeds; failures are logged and never
//! affect the reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SinkConfig;
use crate::domain::{ConsolidatedTask, TaskGraph};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Sink returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Body of one POST
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    pub name_of_the_task: String,
    pub task_id: u64,
    pub dependencies: Vec<u64>,
    pub estimated_duration: Option<u64>,
}

impl From<&ConsolidatedTask> for TaskItem {
    fn from(task: &ConsolidatedTask) -> Self {
        Self {
            name_of_the_task: task.name_of_the_task.clone(),
            task_id: task.id,
            dependencies: task.dependencies.clone(),
            estimated_duration: task.estimation,
        }
    }
}

/// Destination for consolidated tasks
#[async_trait]
pub trait ItemSink: Send + Sync {
    async fn publish(&self, item: &TaskItem) -> Result<(), SinkError>;
}

/// POSTs each item as JSON
pub struct HttpItemSink {
    http: Client,
    url: String,
}

impl HttpItemSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let url = url.into();
        debug!(%url, ?timeout, "HttpItemSink::new: called");
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }

    /// Sink from config, or None when disabled
    pub fn from_config(config: &SinkConfig) -> Result<Option<Self>, SinkError> {
        if !config.enabled {
            debug!("HttpItemSink::from_config: sink disabled");
            return Ok(None);
        }
        Self::new(&config.url, Duration::from_millis(config.timeout_ms)).map(Some)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ItemSink for HttpItemSink {
    async fn publish(&self, item: &TaskItem) -> Result<(), SinkError> {
        debug!(task_id = item.task_id, "HttpItemSink::publish: called");
        let response = self.http.post(&self.url).json(item).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Publish every task of `graph` in the background
///
/// The handle resolves to the number of items accepted; callers that do not
/// care may drop it.
pub fn spawn_publish(sink: Arc<dyn ItemSink>, graph: &TaskGraph) -> JoinHandle<usize> {
    let items: Vec<TaskItem> = graph.tasks.iter().map(TaskItem::from).collect();
    debug!(items = items.len(), "spawn_publish: called");
    tokio::spawn(async move {
        let mut published = 0;
        for item in &items {
            match sink.publish(item).await {
                Ok(()) => published += 1,
                Err(e) => warn!(task_id = item.task_id, error = %e, "Failed to publish task item"),
            }
        }
        info!(published, total = items.len(), "Published task items");
        published
    })
}
