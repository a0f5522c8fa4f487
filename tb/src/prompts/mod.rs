//! Prompt Template System
//!
//! Every model call in the pipeline is rendered from a `.pmt` template.
//!
//! Template loading chain:
//! 1. `{prompts.dir}/{name}.pmt` (user override)
//! 2. Embedded fallback compiled from `tb/prompts/`
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{
    ClassifierContext, ConsolidateContext, GoalContext, LabelContext, PromptLoader, PromptSource, TaskContext,
};
