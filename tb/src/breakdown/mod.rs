//! Task breakdown pipeline
//!
//! Classify, expand, sub-expand, consolidate. Each turn carries its own
//! `BreakdownRun`; stub-level failures skip, consolidation failures abort.

mod error;
mod orchestrator;
mod state;

pub use error::BreakdownError;
pub use orchestrator::{Orchestrator, Prepared};
pub use state::{BreakdownRun, BreakdownState};
