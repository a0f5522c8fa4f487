//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to
//! embedded defaults, then renders them with Handlebars.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for prompts built around the user's goal (analysis, expand)
#[derive(Debug, Clone, Serialize)]
pub struct GoalContext<'a> {
    pub goal: &'a str,
}

/// Context for the few-shot classifier prompt
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierContext<'a> {
    pub text: &'a str,
    pub labels: Vec<LabelContext<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelContext<'a> {
    pub name: &'a str,
    pub examples: &'a [String],
}

/// Context for one sub-expansion call
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext<'a> {
    pub task: &'a str,
}

/// Context for the consolidation call; `tasks` is pre-rendered JSON
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateContext {
    pub tasks: String,
}

/// Where a template was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    Override,
    Embedded,
}

impl std::fmt::Display for PromptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Embedded => write!(f, "embedded"),
        }
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Override directory with `{name}.pmt` files
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `override_dir` before the embedded prompts
    ///
    /// A directory that does not exist is ignored.
    pub fn new(override_dir: Option<&Path>) -> Self {
        debug!(?override_dir, "PromptLoader::new: called");
        let override_dir = override_dir.filter(|d| d.is_dir()).map(Path::to_path_buf);
        if override_dir.is_none() {
            debug!("PromptLoader::new: no override directory, embedded prompts only");
        }

        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    /// Prompts are plain text, so HTML escaping is off; missing variables are errors
    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.set_strict_mode(true);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks the override directory first, then the embedded fallback.
    fn load_template(&self, name: &str) -> Result<(String, PromptSource)> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt override {}: {}", path.display(), e))?;
                return Ok((content, PromptSource::Override));
            }
        }

        embedded::get_embedded(name)
            .map(|content| (content.to_string(), PromptSource::Embedded))
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let (template, source) = self.load_template(template_name)?;
        debug!(%source, "PromptLoader::render: rendering");
        self.hbs
            .render_template(&template, context)
            .map(|s| s.trim().to_string())
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// Raw template text, for templates without variables
    pub fn text(&self, template_name: &str) -> Result<String> {
        self.load_template(template_name).map(|(t, _)| t.trim().to_string())
    }

    /// Every known template with the source it resolves to
    pub fn list(&self) -> Vec<(&'static str, PromptSource)> {
        embedded::NAMES
            .iter()
            .map(|name| {
                let source = match &self.override_dir {
                    Some(dir) if dir.join(format!("{}.pmt", name)).exists() => PromptSource::Override,
                    _ => PromptSource::Embedded,
                };
                (*name, source)
            })
            .collect()
    }
}
