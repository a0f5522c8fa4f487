//! Per-turn breakdown state
//!
//! Each hook invocation owns a `BreakdownRun`. Nothing here outlives the turn.

use tracing::{debug, info, warn};

use super::BreakdownError;

/// Breakdown pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakdownState {
    /// Nothing has happened yet
    #[default]
    Idle,
    /// Asking the model whether the goal is breakdown material
    Classifying,
    /// Asking for a flat list of task stubs
    Expanding,
    /// Breaking every stub into sub-tasks
    SubExpanding,
    /// Final pass assigning ids, dependencies and estimates
    Consolidating,
    /// Consolidated graph produced
    Done,
    /// Stopped early; the message passes through
    Aborted,
}

impl BreakdownState {
    /// Whether `self -> next` is a legal step
    ///
    /// A run may start at Classifying (pre-read), Expanding (direct breakdown)
    /// or SubExpanding (pre-send resuming from a drafted stub list).
    pub fn can_transition_to(&self, next: BreakdownState) -> bool {
        use BreakdownState::*;
        match (self, next) {
            (Idle, Classifying | Expanding | SubExpanding) => true,
            (Classifying, Expanding) => true,
            (Expanding, SubExpanding) => true,
            (SubExpanding, Consolidating) => true,
            (Consolidating, Done) => true,
            (Classifying | Expanding | SubExpanding | Consolidating, Aborted) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl std::fmt::Display for BreakdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Classifying => write!(f, "classifying"),
            Self::Expanding => write!(f, "expanding"),
            Self::SubExpanding => write!(f, "sub-expanding"),
            Self::Consolidating => write!(f, "consolidating"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// State record for one breakdown turn
#[derive(Debug, Clone, Default)]
pub struct BreakdownRun {
    state: BreakdownState,
    history: Vec<BreakdownState>,
    abort_reason: Option<String>,
}

impl BreakdownRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BreakdownState {
        self.state
    }

    /// Every state entered so far, starting with Idle
    pub fn history(&self) -> Vec<BreakdownState> {
        std::iter::once(BreakdownState::Idle)
            .chain(self.history.iter().copied())
            .collect()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move to `next`, rejecting illegal steps
    pub fn transition(&mut self, next: BreakdownState) -> Result<(), BreakdownError> {
        debug!(from = %self.state, to = %next, "BreakdownRun::transition: called");
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "BreakdownRun::transition: illegal transition");
            return Err(BreakdownError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Stop the run, recording why
    ///
    /// Aborting a run that already ended keeps the first outcome.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.is_terminal() {
            debug!(state = %self.state, %reason, "BreakdownRun::abort: already terminal");
            return;
        }
        info!(from = %self.state, %reason, "BreakdownRun::abort: aborting");
        self.state = BreakdownState::Aborted;
        self.history.push(BreakdownState::Aborted);
        self.abort_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BreakdownState::*;

    #[test]
    fn test_full_path() {
        let mut run = BreakdownRun::new();
        for next in [Classifying, Expanding, SubExpanding, Consolidating, Done] {
            run.transition(next).unwrap();
        }
        assert!(run.is_terminal());
        assert_eq!(
            run.history(),
            vec![Idle, Classifying, Expanding, SubExpanding, Consolidating, Done]
        );
    }

    #[test]
    fn test_illegal_transitions() {
        let mut run = BreakdownRun::new();
        assert!(run.transition(Consolidating).is_err());
        assert!(run.transition(Done).is_err());
        assert!(run.transition(Aborted).is_err());
        assert_eq!(run.state(), Idle);

        run.transition(SubExpanding).unwrap();
        assert!(run.transition(Expanding).is_err());
    }

    #[test]
    fn test_abort_keeps_first_outcome() {
        let mut run = BreakdownRun::new();
        run.transition(Classifying).unwrap();
        run.abort("not learning");
        run.abort("second reason");

        assert_eq!(run.state(), Aborted);
        assert_eq!(run.abort_reason(), Some("not learning"));
        assert!(run.transition(Expanding).is_err());
    }

    #[test]
    fn test_abort_from_idle_is_recorded() {
        let mut run = BreakdownRun::new();
        run.abort("empty input");
        assert_eq!(run.history(), vec![Idle, Aborted]);
    }
}
