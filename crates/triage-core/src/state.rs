//! Escalation state machine for one cascade invocation.
//!
//! ```text
//! Routing ──> Answered ──> Complete
//!    └──────> Escalated ──> Validating ──> Complete
//!                  │            │  ^
//!                  │            v  │
//!                  │         Retrying
//!                  └──────────────────> Complete   (heavy failure)
//! ```

use std::fmt;

use tracing::{error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    Routing,
    Answered,
    Escalated,
    Validating,
    Retrying,
    Complete,
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CascadeState::Routing => "routing",
            CascadeState::Answered => "answered",
            CascadeState::Escalated => "escalated",
            CascadeState::Validating => "validating",
            CascadeState::Retrying => "retrying",
            CascadeState::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl CascadeState {
    pub fn can_transition_to(self, next: CascadeState) -> bool {
        use CascadeState::*;
        matches!(
            (self, next),
            (Routing, Answered)
                | (Routing, Escalated)
                | (Answered, Complete)
                | (Escalated, Validating)
                | (Escalated, Complete)
                | (Validating, Complete)
                | (Validating, Retrying)
                | (Retrying, Validating)
                | (Retrying, Complete)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == CascadeState::Complete
    }
}

/// Tracks the current state and rejects illegal transitions.
#[derive(Debug)]
pub struct StateMachine {
    state: CascadeState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: CascadeState::Routing,
        }
    }

    pub fn state(&self) -> CascadeState {
        self.state
    }

    /// Move to `next`. Illegal transitions are logged and ignored (and
    /// assert in debug builds). Returns whether the move happened.
    pub fn advance(&mut self, next: CascadeState) -> bool {
        if !self.state.can_transition_to(next) {
            error!(from = %self.state, to = %next, "Illegal cascade state transition");
            debug_assert!(false, "illegal cascade transition {} -> {}", self.state, next);
            return false;
        }
        trace!(from = %self.state, to = %next, "Cascade state transition");
        self.state = next;
        true
    }
}
