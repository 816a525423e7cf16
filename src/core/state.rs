//! State tree nodes.
//!
//! States live in an arena owned by their [`Machine`](crate::machine::Machine)
//! and are addressed by [`StateId`] handles. Parent links are plain indices,
//! so the tree is owned strictly top-down.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::event::{Argument, EventAndArgument};
use crate::core::transition::{Transition, TransitionParams};
use crate::machine::error::ListenerResult;
use crate::machine::Machine;

/// Handle to a state inside the arena of the machine that created it.
///
/// Ids are only meaningful for their owning machine; using an id from a
/// different machine instance is a logic error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

/// How the children of a state relate to each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildMode {
    /// At most one child is active at a time.
    Exclusive,
    /// All children are simultaneously active regions.
    Parallel,
}

/// Resolver function of a choice pseudostate.
pub type ChoiceResolver = Box<dyn Fn(&EventAndArgument<'_>) -> StateId + Send + Sync>;

/// Closed set of state kinds, resolved at tree-build time.
pub(crate) enum StateKind {
    Plain,
    /// Entering a final state finishes its parent (EXCLUSIVE mode).
    Final,
    /// Holds the event argument while active; keeps the last value after exit.
    Data {
        default: Option<Argument>,
        data: Option<Argument>,
        last: Option<Argument>,
    },
    /// Pseudostate resolved to a concrete target during transition execution.
    Choice(ChoiceResolver),
    /// Pseudostate restoring the region's last active child.
    History {
        default: Option<StateId>,
        stored: Option<StateId>,
    },
    /// A nested machine managing its own internal state.
    SubMachine(Box<Machine>),
}

impl StateKind {
    /// Pseudostates are passed through automatically and can never be active.
    pub(crate) fn is_pseudo(&self) -> bool {
        matches!(self, StateKind::Choice(_) | StateKind::History { .. })
    }

    pub(crate) fn is_sub_machine(&self) -> bool {
        matches!(self, StateKind::SubMachine(_))
    }

    /// Only plain and data states own children.
    pub(crate) fn allows_children(&self) -> bool {
        matches!(self, StateKind::Plain | StateKind::Data { .. })
    }
}

/// Identifies a registered listener for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);

/// State-level lifecycle observer.
///
/// All methods default to `Ok(())` so implementers override selectively.
/// Returned errors are contained by the machine's listener-exception policy
/// and never corrupt tree state.
pub trait StateListener: Send + Sync {
    fn on_entry(&self, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }

    fn on_exit(&self, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }

    /// In EXCLUSIVE mode: a final child was entered. In PARALLEL mode: every
    /// child region has finished.
    fn on_finished(&self, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }
}

pub(crate) struct EntryFn<F>(pub(crate) F);

impl<F> StateListener for EntryFn<F>
where
    F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_entry(&self, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(params)
    }
}

pub(crate) struct ExitFn<F>(pub(crate) F);

impl<F> StateListener for ExitFn<F>
where
    F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_exit(&self, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(params)
    }
}

pub(crate) struct FinishedFn<F>(pub(crate) F);

impl<F> StateListener for FinishedFn<F>
where
    F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_finished(&self, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(params)
    }
}

/// Arena node. All runtime-mutable fields reset together, mirroring the
/// one-time-attachment lifecycle.
pub(crate) struct StateNode {
    pub(crate) name: Option<String>,
    pub(crate) kind: StateKind,
    pub(crate) child_mode: ChildMode,
    pub(crate) parent: Option<StateId>,
    pub(crate) children: Vec<StateId>,
    pub(crate) initial: Option<StateId>,
    /// Meaningful only in EXCLUSIVE mode; always `None` in PARALLEL mode.
    pub(crate) current: Option<StateId>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) listeners: Vec<(ListenerHandle, Arc<dyn StateListener>)>,
    pub(crate) is_active: bool,
    pub(crate) is_finished: bool,
}

impl StateNode {
    pub(crate) fn new(name: Option<String>, kind: StateKind, child_mode: ChildMode) -> Self {
        Self {
            name,
            kind,
            child_mode,
            parent: None,
            children: Vec::new(),
            initial: None,
            current: None,
            transitions: Vec::new(),
            listeners: Vec::new(),
            is_active: false,
            is_finished: false,
        }
    }

    /// Clears activation state without touching topology or listeners.
    pub(crate) fn reset_runtime(&mut self) {
        self.current = None;
        self.is_active = false;
        self.is_finished = false;
        match &mut self.kind {
            StateKind::Data { data, last, .. } => {
                *data = None;
                *last = None;
            }
            StateKind::History { stored, .. } => *stored = None,
            _ => {}
        }
    }

    /// Leaves the node inert; used on destroy.
    pub(crate) fn clear(&mut self) {
        self.reset_runtime();
        self.transitions.clear();
        self.listeners.clear();
        self.children.clear();
        self.initial = None;
        self.parent = None;
    }
}
