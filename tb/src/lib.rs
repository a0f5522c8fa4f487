//! TaskBreak - goal classification and LLM-driven task breakdown
//!
//! TaskBreak plugs into a chat host through three hooks. Before the user's
//! message is read it asks a model whether the goal is something to learn or
//! organise; if so the message is rewritten into a request for a JSON list of
//! task stubs. Before the host's reply is sent, a drafted stub list is broken
//! down further and consolidated into a dependency-ordered task graph with
//! hour estimates, which replaces the reply.
//!
//! # Core Concepts
//!
//! - **Model output is untrusted**: every reply goes through [`extract`]
//! - **Skip, don't fail**: a bad sub-expansion drops one stub; a bad
//!   consolidation leaves the user's draft untouched
//! - **Per-turn state**: each turn owns a [`breakdown::BreakdownRun`]
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait with Anthropic and OpenAI implementations
//! - [`classify`] - Few-shot label classification
//! - [`extract`] - Fence stripping, JSON parsing and task validation
//! - [`breakdown`] - The classify/expand/sub-expand/consolidate pipeline
//! - [`hooks`] - Host hook adapters
//! - [`sink`] - Optional HTTP mirror for consolidated tasks
//! - [`prompts`] - Prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod breakdown;
pub mod classify;
pub mod cli;
pub mod config;
pub mod domain;
pub mod extract;
pub mod hooks;
pub mod llm;
pub mod prompts;
pub mod sink;

// Re-export commonly used types
pub use breakdown::{BreakdownError, BreakdownRun, BreakdownState, Orchestrator, Prepared};
pub use classify::{
    ClassificationLabel, Classifier, LabelSet, LabelSetError, LlmClassifier, learning_labels, map_answer_to_label,
};
pub use config::{BreakdownConfig, Config, LlmConfig, SinkConfig};
pub use domain::{ConsolidatedTask, Task, TaskGraph, TaskSet};
pub use extract::{
    ExtractError, extract_task_stubs, is_json_fenced, is_valid_task_stub, parse_consolidation, strip_and_parse_fenced,
    strip_fences,
};
pub use hooks::{AgentMessage, RecallConfig, ReplyOutcome, TaskBreakdownPlugin, UserMessage, WorkingMemory};
pub use llm::{
    AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, ask, create_client,
};
pub use prompts::PromptLoader;
pub use sink::{HttpItemSink, ItemSink, SinkError, TaskItem, spawn_publish};
