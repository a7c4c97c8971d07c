//! Per-node synchronization state machine.

use std::fmt;

use crate::domain::error::{DomainError, DomainResult};

/// Lifecycle states of a node (and of a whole configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Loading,
    Synced,
    Updated,
    Deleted,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Loading => "loading",
            State::Synced => "synced",
            State::Updated => "updated",
            State::Deleted => "deleted",
            State::Error => "error",
        };
        f.write_str(s)
    }
}

/// State holder attached to every node.
///
/// `Error` is terminal: once set, no transition succeeds and `loading()`
/// leaves it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    state: State,
    fault: Option<String>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            state: State::Loading,
            fault: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Message of the fault that put this node into `Error`.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.state == State::Error
    }

    pub fn is_synced(&self) -> bool {
        self.state == State::Synced
    }

    /// Force `Loading` (used when (re)building).
    pub fn loading(&mut self) {
        if self.state != State::Error {
            self.state = State::Loading;
        }
    }

    /// `Loading`/`Updated` → `Synced`. A deleted node stays deleted.
    pub fn loaded(&mut self) -> DomainResult<()> {
        match self.state {
            State::Error => Err(self.invalid("loaded")),
            State::Deleted => Ok(()),
            State::Loading | State::Updated | State::Synced => {
                self.state = State::Synced;
                Ok(())
            }
        }
    }

    /// `Synced` → `Updated`; no-op otherwise.
    pub fn updated(&mut self) {
        if self.state == State::Synced {
            self.state = State::Updated;
        }
    }

    /// `Synced`/`Updated` → `Deleted`. Returns whether the transition happened.
    pub fn deleted(&mut self) -> bool {
        match self.state {
            State::Synced | State::Updated => {
                self.state = State::Deleted;
                true
            }
            _ => false,
        }
    }

    pub fn set_error(&mut self, fault: impl fmt::Display) {
        self.state = State::Error;
        self.fault = Some(fault.to_string());
    }

    fn invalid(&self, operation: &str) -> DomainError {
        DomainError::InvalidState {
            state: self.state.to_string(),
            operation: operation.to_string(),
        }
    }
}
