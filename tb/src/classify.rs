//! Text classification
//!
//! A few-shot label call over the model. The answer always maps to one of the
//! configured labels; when the model's text matches none of them the first
//! label wins.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{self, LlmClient, LlmError};
use crate::prompts::{ClassifierContext, LabelContext, PromptLoader};

/// The two outcomes the breakdown pipeline branches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationLabel {
    Learning,
    NotLearning,
}

impl ClassificationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Learning => "Learning",
            Self::NotLearning => "Not Learning",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Learning" => Some(Self::Learning),
            "Not Learning" => Some(Self::NotLearning),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelSetError {
    #[error("Label set is empty")]
    Empty,

    #[error("Label '{0}' has no examples")]
    NoExamples(String),

    #[error("Label '{0}' appears more than once")]
    Duplicate(String),
}

/// Ordered label -> few-shot examples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<(String, Vec<String>)>,
}

impl LabelSet {
    pub fn new<L, E>(labels: impl IntoIterator<Item = (L, Vec<E>)>) -> Result<Self, LabelSetError>
    where
        L: Into<String>,
        E: Into<String>,
    {
        let mut out: Vec<(String, Vec<String>)> = Vec::new();
        for (name, examples) in labels {
            let name = name.into();
            if examples.is_empty() {
                return Err(LabelSetError::NoExamples(name));
            }
            if out.iter().any(|(n, _)| *n == name) {
                return Err(LabelSetError::Duplicate(name));
            }
            out.push((name, examples.into_iter().map(Into::into).collect()));
        }
        if out.is_empty() {
            return Err(LabelSetError::Empty);
        }
        Ok(Self { labels: out })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(n, _)| n.as_str())
    }

    /// Fallback label for unmappable answers
    pub fn first(&self) -> &str {
        // Construction guarantees at least one label
        self.labels.first().map(|(n, _)| n.as_str()).unwrap_or_default()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|(n, _)| n == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn context<'a>(&'a self, text: &'a str) -> ClassifierContext<'a> {
        ClassifierContext {
            text,
            labels: self
                .labels
                .iter()
                .map(|(name, examples)| LabelContext { name, examples })
                .collect(),
        }
    }
}

/// Labels used to decide whether a goal is breakdown material
pub fn learning_labels() -> LabelSet {
    let examples = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    LabelSet {
        labels: vec![
            (
                ClassificationLabel::Learning.as_str().to_string(),
                examples(&[
                    "I want to learn python",
                    "How can I approach fishing",
                    "explain me how to became a software engineer",
                    "how could organise the garden",
                ]),
            ),
            (
                ClassificationLabel::NotLearning.as_str().to_string(),
                examples(&["Write a poetry", "What is the weather in London", "What is your name?"]),
            ),
        ],
    }
}

/// Map a free-text model answer onto a label
///
/// Case-insensitive exact match after trimming quotes and punctuation, then
/// the longest label contained in the answer, then the first label.
pub fn map_answer_to_label<'a>(answer: &str, labels: &'a LabelSet) -> &'a str {
    let cleaned = answer
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();

    if let Some(name) = labels.names().find(|n| n.to_lowercase() == cleaned) {
        return name;
    }

    let contained = labels
        .names()
        .filter(|n| cleaned.contains(&n.to_lowercase()))
        .max_by_key(|n| n.len());
    if let Some(name) = contained {
        debug!(%name, "map_answer_to_label: matched by containment");
        return name;
    }

    let fallback = labels.first();
    warn!(%answer, %fallback, "map_answer_to_label: ambiguous answer, using fallback label");
    fallback
}

/// Picks one label for a piece of text
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Returns a label name from `labels`; only transport failures are errors
    async fn classify(&self, text: &str, labels: &LabelSet) -> Result<String, LlmError>;
}

/// Few-shot classifier over an LLM client
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str, labels: &LabelSet) -> Result<String, LlmError> {
        debug!(text_len = text.len(), labels = labels.len(), "LlmClassifier::classify: called");
        let prompt = self
            .prompts
            .render("classifier", &labels.context(text))
            .map_err(|e| LlmError::Config(e.to_string()))?;
        let answer = llm::ask(self.llm.as_ref(), "", &prompt, self.max_tokens).await?;
        let label = map_answer_to_label(&answer, labels);
        debug!(%answer, %label, "LlmClassifier::classify: mapped");
        Ok(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use proptest::prelude::*;

    fn classifier(llm: Arc<MockLlmClient>) -> LlmClassifier {
        LlmClassifier::new(llm, Arc::new(PromptLoader::embedded_only()), 16)
    }

    #[test]
    fn test_label_set_validation() {
        let empty: Vec<(&str, Vec<&str>)> = vec![];
        assert_eq!(LabelSet::new(empty), Err(LabelSetError::Empty));
        assert_eq!(
            LabelSet::new([("a", vec!["x"]), ("b", vec![])]),
            Err(LabelSetError::NoExamples("b".to_string()))
        );
        assert_eq!(
            LabelSet::new([("a", vec!["x"]), ("a", vec!["y"])]),
            Err(LabelSetError::Duplicate("a".to_string()))
        );
    }

    #[test]
    fn test_learning_labels() {
        let labels = learning_labels();
        assert_eq!(labels.names().collect::<Vec<_>>(), vec!["Learning", "Not Learning"]);
        assert_eq!(labels.first(), "Learning");
        assert_eq!(ClassificationLabel::from_label("Not Learning"), Some(ClassificationLabel::NotLearning));
    }

    #[test]
    fn test_map_answer_to_label() {
        let labels = learning_labels();
        assert_eq!(map_answer_to_label("Learning", &labels), "Learning");
        assert_eq!(map_answer_to_label("  \"not learning\". ", &labels), "Not Learning");
        assert_eq!(map_answer_to_label("This is clearly Not Learning material", &labels), "Not Learning");
        assert_eq!(map_answer_to_label("It's about learning to fish", &labels), "Learning");
        assert_eq!(map_answer_to_label("no idea", &labels), "Learning");
        assert_eq!(map_answer_to_label("", &labels), "Learning");
    }

    #[tokio::test]
    async fn test_classify_renders_few_shot_prompt() {
        let llm = Arc::new(MockLlmClient::with_texts(&["Not Learning"]));
        let label = classifier(llm.clone())
            .classify("What is the weather in London", &learning_labels())
            .await
            .unwrap();

        assert_eq!(label, "Not Learning");
        let prompts = llm.prompts();
        assert!(prompts[0].contains("\"What is the weather in London\""));
        assert!(prompts[0].contains("\"Write a poetry\" -> \"Not Learning\""));
    }

    #[tokio::test]
    async fn test_classify_transport_error() {
        let llm = Arc::new(MockLlmClient::new(vec![Err(LlmError::ApiError {
            status: 500,
            message: "boom".to_string(),
        })]));
        let result = classifier(llm).classify("x", &learning_labels()).await;
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_mapping_returns_a_known_label(answer in "\\PC{0,60}") {
            let labels = LabelSet::new([
                ("alpha", vec!["a"]),
                ("beta", vec!["b"]),
                ("alpha beta", vec!["ab"]),
            ]).unwrap();
            prop_assert!(labels.contains(map_answer_to_label(&answer, &labels)));
        }
    }
}
