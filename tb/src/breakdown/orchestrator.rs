//! Breakdown orchestrator
//!
//! Drives the model calls for one turn: classify the goal, rewrite the
//! message, then (once the host has drafted a stub list) sub-expand every
//! stub and consolidate the result into a dependency graph.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{BreakdownError, BreakdownRun, BreakdownState};
use crate::classify::{ClassificationLabel, Classifier, LabelSet, LlmClassifier, learning_labels};
use crate::config::BreakdownConfig;
use crate::domain::{Task, TaskGraph, TaskSet, subtask_id};
use crate::extract::{extract_task_stubs, parse_consolidation, strip_and_parse_fenced, stub_name};
use crate::llm::{self, LlmClient};
use crate::prompts::{ConsolidateContext, GoalContext, PromptLoader, TaskContext};

/// Outcome of the pre-read half of a turn
#[derive(Debug, Clone)]
pub struct Prepared {
    pub label: ClassificationLabel,
    /// Message text the host should generate from
    pub text: String,
    pub run: BreakdownRun,
}

/// Runs the breakdown pipeline over an LLM client
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    classifier: Arc<dyn Classifier>,
    prompts: Arc<PromptLoader>,
    labels: LabelSet,
    config: BreakdownConfig,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        classifier: Arc<dyn Classifier>,
        prompts: Arc<PromptLoader>,
        config: BreakdownConfig,
    ) -> Self {
        debug!(model = %llm.model(), ?config, "Orchestrator::new: called");
        Self {
            llm,
            classifier,
            prompts,
            labels: learning_labels(),
            config,
        }
    }

    /// Orchestrator whose classifier shares the same LLM client
    pub fn with_llm_classifier(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, config: BreakdownConfig) -> Self {
        let classifier = Arc::new(LlmClassifier::new(
            llm.clone(),
            prompts.clone(),
            config.classifier_max_tokens,
        ));
        Self::new(llm, classifier, prompts, config)
    }

    pub fn config(&self) -> &BreakdownConfig {
        &self.config
    }

    pub fn prompts(&self) -> &PromptLoader {
        &self.prompts
    }

    fn render<T: Serialize>(&self, name: &str, ctx: &T) -> Result<String, BreakdownError> {
        self.prompts
            .render(name, ctx)
            .map_err(|e| BreakdownError::Prompt(e.to_string()))
    }

    async fn ask(&self, prompt: &str, max_tokens: u32) -> Result<String, BreakdownError> {
        Ok(llm::ask(self.llm.as_ref(), "", prompt, max_tokens).await?)
    }

    /// Classifying: analyse the goal, then label the analysis
    pub async fn classify_goal(
        &self,
        run: &mut BreakdownRun,
        text: &str,
    ) -> Result<ClassificationLabel, BreakdownError> {
        debug!(text_len = text.len(), "Orchestrator::classify_goal: called");
        run.transition(BreakdownState::Classifying)?;
        let result = self.classify_inner(text).await;
        if let Err(e) = &result {
            run.abort(e.to_string());
        }
        result
    }

    async fn classify_inner(&self, text: &str) -> Result<ClassificationLabel, BreakdownError> {
        let prompt = self.render("analysis", &GoalContext { goal: text })?;
        let analysis = self.ask(&prompt, self.config.analysis_max_tokens).await?;
        debug!(analysis_len = analysis.len(), "Orchestrator::classify_inner: got analysis");

        let label = self.classifier.classify(&analysis, &self.labels).await?;
        let label = ClassificationLabel::from_label(&label).unwrap_or_else(|| {
            warn!(%label, "Orchestrator::classify_inner: unknown label, treating as Learning");
            ClassificationLabel::Learning
        });
        info!(%label, "Goal classified");
        Ok(label)
    }

    /// Classifying + Expanding: produce the text the host should answer
    ///
    /// Learning goals become a request for a JSON stub list; anything else
    /// becomes the fixed refusal instruction and the run is aborted.
    pub async fn prepare(&self, text: &str) -> Result<Prepared, BreakdownError> {
        debug!("Orchestrator::prepare: called");
        if text.trim().is_empty() {
            return Err(BreakdownError::EmptyOrMissingInput);
        }

        let mut run = BreakdownRun::new();
        let label = self.classify_goal(&mut run, text).await?;
        let rewritten = match label {
            ClassificationLabel::Learning => {
                run.transition(BreakdownState::Expanding)?;
                self.render("expand", &GoalContext { goal: text })?
            }
            ClassificationLabel::NotLearning => {
                run.abort("goal is not breakdown material");
                self.prompts
                    .text("refusal")
                    .map_err(|e| BreakdownError::Prompt(e.to_string()))?
            }
        };

        Ok(Prepared {
            label,
            text: rewritten,
            run,
        })
    }

    /// Expanding without a host: ask for the stub list directly
    pub async fn expand(&self, run: &mut BreakdownRun, goal: &str) -> Result<TaskSet, BreakdownError> {
        debug!("Orchestrator::expand: called");
        run.transition(BreakdownState::Expanding)?;
        let result = self.expand_inner(goal).await;
        if let Err(e) = &result {
            run.abort(e.to_string());
        }
        result
    }

    async fn expand_inner(&self, goal: &str) -> Result<TaskSet, BreakdownError> {
        let prompt = self.render("expand", &GoalContext { goal })?;
        let draft = self.ask(&prompt, self.config.subexpand_max_tokens).await?;
        let stubs = extract_task_stubs(&draft);
        if stubs.is_empty() {
            return Err(BreakdownError::NoTaskStubs("expansion"));
        }
        Ok(stubs)
    }

    /// SubExpanding: one call per stub, flattened into a single working set
    ///
    /// A failing call only drops that stub's sub-tasks. Output order follows
    /// stub order regardless of concurrency.
    pub async fn sub_expand(&self, run: &mut BreakdownRun, stubs: &TaskSet) -> Result<TaskSet, BreakdownError> {
        debug!(stubs = stubs.len(), "Orchestrator::sub_expand: called");
        run.transition(BreakdownState::SubExpanding)?;

        let concurrency = self.config.subexpand_concurrency.max(1);
        let batches: Vec<Vec<Task>> = futures::stream::iter(stubs.iter().map(|stub| self.sub_expand_one(stub)))
            .buffered(concurrency)
            .collect()
            .await;

        let working: TaskSet = batches.into_iter().flatten().collect();
        info!(stubs = stubs.len(), subtasks = working.len(), "Sub-expansion complete");
        if working.is_empty() {
            let err = BreakdownError::EmptyWorkingSet;
            run.abort(err.to_string());
            return Err(err);
        }
        Ok(working)
    }

    async fn sub_expand_one(&self, stub: &Task) -> Vec<Task> {
        debug!(task_id = %stub.task_id, "Orchestrator::sub_expand_one: called");
        let output = match self.sub_expand_call(stub).await {
            Ok(output) => output,
            Err(e) => {
                warn!(task_id = %stub.task_id, error = %e, "Sub-expansion call failed, skipping task");
                return Vec::new();
            }
        };

        let items = strip_and_parse_fenced(&output);
        if items.is_empty() {
            warn!(task_id = %stub.task_id, "Sub-expansion returned no usable tasks, skipping task");
        }
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let name = stub_name(item);
                if name.is_none() {
                    warn!(task_id = %stub.task_id, index = i, "Skipping invalid sub-task");
                }
                name.map(|n| Task::stub(subtask_id(&stub.task_id, i), n))
            })
            .collect()
    }

    async fn sub_expand_call(&self, stub: &Task) -> Result<String, BreakdownError> {
        let prompt = self.render("subexpand", &TaskContext { task: &stub.name })?;
        self.ask(&prompt, self.config.subexpand_max_tokens).await
    }

    /// Consolidating: one call over the whole working set
    pub async fn consolidate(&self, run: &mut BreakdownRun, working: &TaskSet) -> Result<TaskGraph, BreakdownError> {
        debug!(tasks = working.len(), "Orchestrator::consolidate: called");
        run.transition(BreakdownState::Consolidating)?;
        match self.consolidate_inner(working).await {
            Ok(graph) => {
                run.transition(BreakdownState::Done)?;
                info!(tasks = graph.tasks.len(), hours = graph.total_hours(), "Consolidation complete");
                Ok(graph)
            }
            Err(e) => {
                error!(error = %e, "Consolidation failed, leaving the draft unchanged");
                run.abort(e.to_string());
                Err(e)
            }
        }
    }

    async fn consolidate_inner(&self, working: &TaskSet) -> Result<TaskGraph, BreakdownError> {
        let tasks = serde_json::to_string_pretty(&working.names()).map_err(|e| BreakdownError::Prompt(e.to_string()))?;
        let prompt = self.render("consolidate", &ConsolidateContext { tasks })?;
        let output = self.ask(&prompt, self.config.consolidate_max_tokens).await?;
        Ok(parse_consolidation(&output)?)
    }

    /// SubExpanding + Consolidating over a drafted stub list
    pub async fn finish(&self, draft: &str) -> Result<TaskGraph, BreakdownError> {
        let mut run = BreakdownRun::new();
        self.finish_run(&mut run, draft).await
    }

    /// `finish` with a caller-owned run, for inspecting the path taken
    pub async fn finish_run(&self, run: &mut BreakdownRun, draft: &str) -> Result<TaskGraph, BreakdownError> {
        debug!(draft_len = draft.len(), "Orchestrator::finish_run: called");
        let stubs = extract_task_stubs(draft);
        if stubs.is_empty() {
            let err = BreakdownError::NoTaskStubs("draft");
            run.abort(err.to_string());
            return Err(err);
        }
        let working = self.sub_expand(run, &stubs).await?;
        self.consolidate(run, &working).await
    }

    /// Expanding + SubExpanding + Consolidating, without a host in between
    pub async fn breakdown(&self, run: &mut BreakdownRun, goal: &str) -> Result<TaskGraph, BreakdownError> {
        debug!("Orchestrator::breakdown: called");
        if goal.trim().is_empty() {
            return Err(BreakdownError::EmptyOrMissingInput);
        }
        let stubs = self.expand(run, goal).await?;
        let working = self.sub_expand(run, &stubs).await?;
        self.consolidate(run, &working).await
    }
}
