//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Goal analysis prompt (Classifying, first call)
pub const ANALYSIS: &str = include_str!("../../prompts/analysis.pmt");

/// Few-shot label prompt (Classifying, second call)
pub const CLASSIFIER: &str = include_str!("../../prompts/classifier.pmt");

/// Rewritten user message asking for task stubs (Expanding)
pub const EXPAND: &str = include_str!("../../prompts/expand.pmt");

/// Rewritten user message for goals that are not breakdown material
pub const REFUSAL: &str = include_str!("../../prompts/refusal.pmt");

/// Per-task sub-expansion prompt (SubExpanding)
pub const SUBEXPAND: &str = include_str!("../../prompts/subexpand.pmt");

/// Final pass assigning ids, dependencies and estimates (Consolidating)
pub const CONSOLIDATE: &str = include_str!("../../prompts/consolidate.pmt");

/// Names of all embedded templates, in pipeline order
pub const NAMES: &[&str] = &["analysis", "classifier", "expand", "refusal", "subexpand", "consolidate"];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "analysis" => Some(ANALYSIS),
        "classifier" => Some(CLASSIFIER),
        "expand" => Some(EXPAND),
        "refusal" => Some(REFUSAL),
        "subexpand" => Some(SUBEXPAND),
        "consolidate" => Some(CONSOLIDATE),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_name_resolves() {
        for name in NAMES {
            assert!(get_embedded(name).is_some(), "missing embedded prompt {name}");
        }
    }

    #[test]
    fn test_templates_carry_their_variables() {
        assert!(ANALYSIS.contains("{{goal}}"));
        assert!(EXPAND.contains("{{goal}}"));
        assert!(EXPAND.contains("name_of_the_task"));
        assert!(SUBEXPAND.contains("{{task}}"));
        assert!(CONSOLIDATE.contains("{{tasks}}"));
        assert!(CONSOLIDATE.contains("estimation"));
        assert!(CLASSIFIER.contains("{{#each labels}}"));
    }

    #[test]
    fn test_refusal_is_fixed_text() {
        assert_eq!(REFUSAL.trim(), "To this message answer: I cannot assist you with this request");
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
