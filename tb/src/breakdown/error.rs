//! Breakdown error types

use thiserror::Error;

use super::BreakdownState;
use crate::extract::ExtractError;
use crate::llm::LlmError;

/// Why a breakdown turn stopped
///
/// Hooks never surface these; they log them and pass the message through.
#[derive(Debug, Error)]
pub enum BreakdownError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Empty or missing input")]
    EmptyOrMissingInput,

    #[error("No valid task stubs in {0}")]
    NoTaskStubs(&'static str),

    #[error("Sub-expansion produced no tasks")]
    EmptyWorkingSet,

    #[error("Illegal state transition: {from} -> {to}")]
    InvalidTransition { from: BreakdownState, to: BreakdownState },
}

impl BreakdownError {
    /// Consolidation-level failures are the only ones logged as errors
    pub fn is_consolidation_failure(&self) -> bool {
        matches!(self, Self::Extract(ExtractError::ConsolidationFailure(_)))
    }
}
