//! Host hook adapters
//!
//! The three entry points a chat host calls: before episodic recall, before
//! reading the user message, before sending the reply. They adapt host data
//! to the orchestrator and never fail; every error becomes a pass-through.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::breakdown::{BreakdownError, Orchestrator};
use crate::classify::ClassificationLabel;
use crate::domain::TaskGraph;
use crate::extract::is_json_fenced;
use crate::sink::{ItemSink, spawn_publish};

/// Episodic recall settings; keys the plugin does not own are kept as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    pub k: usize,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMessage {
    #[serde(default)]
    pub text: String,
}

impl UserMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(default)]
    pub text: String,
}

impl AgentMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Per-turn flags shared with the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// Set when this plugin took over the turn
    pub hacked: bool,
}

/// What the pre-send hook did
pub struct ReplyOutcome {
    pub message: AgentMessage,
    /// The consolidated graph, when the reply was replaced
    pub graph: Option<TaskGraph>,
    /// Background sink publish, when one was started
    pub publish: Option<JoinHandle<usize>>,
}

/// Binds the breakdown pipeline to the host's hooks
pub struct TaskBreakdownPlugin {
    orchestrator: Arc<Orchestrator>,
    sink: Option<Arc<dyn ItemSink>>,
}

impl TaskBreakdownPlugin {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ItemSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Force the recall breadth; other keys pass through
    pub fn before_recall(&self, mut config: RecallConfig) -> RecallConfig {
        let k = self.orchestrator.config().recall_k;
        debug!(from = config.k, to = k, "before_recall: called");
        config.k = k;
        config
    }

    /// Classify the goal and rewrite the message for the host's generation
    pub async fn before_read(&self, mut message: UserMessage, memory: &mut WorkingMemory) -> UserMessage {
        debug!(text_len = message.text.len(), "before_read: called");
        if message.text.trim().is_empty() {
            info!("before_read: empty message, passing through");
            return message;
        }

        match self.orchestrator.prepare(&message.text).await {
            Ok(prepared) => {
                info!(label = %prepared.label, state = %prepared.run.state(), "before_read: message rewritten");
                if prepared.label == ClassificationLabel::NotLearning {
                    info!("before_read: goal is not breakdown material, asking host to refuse");
                }
                message.text = prepared.text;
                memory.hacked = true;
            }
            Err(BreakdownError::Llm(e)) if e.is_transport() => {
                warn!(error = %e, "before_read: model unreachable, passing message through")
            }
            Err(e) => warn!(error = %e, "before_read: classification failed, passing message through"),
        }
        message
    }

    /// Replace a drafted stub list with the consolidated task graph
    pub async fn before_send(&self, message: AgentMessage) -> AgentMessage {
        self.process_reply(message).await.message
    }

    /// `before_send` that also reports the graph and the sink publish
    pub async fn process_reply(&self, mut message: AgentMessage) -> ReplyOutcome {
        debug!(text_len = message.text.len(), "process_reply: called");
        if !is_json_fenced(&message.text) {
            debug!("process_reply: reply is not JSON-fenced, passing through");
            return ReplyOutcome {
                message,
                graph: None,
                publish: None,
            };
        }

        let graph = match self.orchestrator.finish(&message.text).await {
            Ok(graph) => graph,
            Err(e) => {
                log_failure(&e);
                return ReplyOutcome {
                    message,
                    graph: None,
                    publish: None,
                };
            }
        };

        match graph.to_pretty_json() {
            Ok(text) => message.text = text,
            Err(e) => {
                warn!(error = %e, "process_reply: failed to serialize task graph, keeping draft");
                return ReplyOutcome {
                    message,
                    graph: None,
                    publish: None,
                };
            }
        }

        let publish = self.sink.as_ref().map(|sink| spawn_publish(sink.clone(), &graph));
        ReplyOutcome {
            message,
            graph: Some(graph),
            publish,
        }
    }
}

fn log_failure(e: &BreakdownError) {
    if e.is_consolidation_failure() {
        tracing::error!(error = %e, "process_reply: consolidation failed, keeping draft");
    } else {
        warn!(error = %e, "process_reply: breakdown stopped, keeping draft");
    }
}
