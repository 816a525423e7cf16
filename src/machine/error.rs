//! Machine error taxonomy.
//!
//! Usage faults are programmer errors surfaced synchronously at the call
//! site and never retried. Observer faults ([`ListenerError`]) are contained
//! per notification round and surfaced through the listener-exception
//! policy; the tree is always structurally valid when they appear.

use thiserror::Error;

/// Failure raised by a listener callback.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type returned by listener callbacks.
pub type ListenerResult = Result<(), ListenerError>;

/// Errors raised by machine construction and event processing.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("machine is not running")]
    NotRunning,

    #[error("machine is destroyed")]
    Destroyed,

    #[error("multiple transitions match {event} in state {state}")]
    AmbiguousTransitions { event: String, state: String },

    #[error("initial state is not set for {state}")]
    NoInitialState { state: String },

    #[error("cannot change machine structure after start")]
    StructureFrozen,

    #[error("state {state} is already attached to a parent")]
    StateReuse { state: String },

    #[error("cannot move {state} into its own subtree")]
    MoveIntoOwnSubtree { state: String },

    #[error("state with name {name} already exists in {parent}")]
    DuplicateName { name: String, parent: String },

    #[error("{child} is not a child of {parent}")]
    NotAChild { child: String, parent: String },

    #[error("final and pseudo states are not allowed under a parallel state")]
    InvalidParallelChild,

    #[error("cannot set an initial state in parallel child mode")]
    InitialStateInParallel,

    #[error("state {state} cannot have children")]
    ChildrenNotAllowed { state: String },

    #[error("state {state} cannot have outgoing transitions")]
    TransitionsNotAllowed { state: String },

    #[error("pseudostate {state} cannot be an initial state")]
    InitialPseudoState { state: String },

    #[error("listener is already registered")]
    DuplicateListener,

    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),

    #[error("undo is not enabled for this machine")]
    UndoDisabled,

    #[error("undo stack is empty")]
    UndoStackEmpty,

    #[error("history state {state} has no stored, default or initial state to restore")]
    UnresolvedHistory { state: String },

    #[error("pseudostate resolution loop detected at {state}")]
    PseudostateLoop { state: String },
}
