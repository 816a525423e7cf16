//! Pluggable machine policies and configuration.

use crate::core::event::{Argument, Event};
use crate::machine::error::ListenerError;

/// Logger sink invoked with internal trace messages. Messages are built
/// lazily; an unset logger costs nothing.
pub type Logger = Box<dyn Fn(&str) + Send + Sync>;

/// Invoked when an event matches no transition anywhere in the tree.
pub type IgnoredEventHandler = Box<dyn Fn(&dyn Event, Option<&Argument>) + Send + Sync>;

/// Receives every listener failure captured during a round, in order.
/// Returning `Err` propagates the failure from the triggering call;
/// the default policy (no handler) propagates the first failure.
pub type ListenerExceptionHandler =
    Box<dyn Fn(ListenerError) -> Result<(), ListenerError> + Send + Sync>;

/// Construction-time machine configuration.
#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// When a state already attached to a parent is moved, dissolve the old
    /// attachment (resetting the state) instead of failing.
    pub auto_destroy_on_states_reuse: bool,
    /// Record undo snapshots before each state-changing transition.
    pub enable_undo: bool,
    /// Capacity of the transition log; zero disables it.
    pub transition_log_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            auto_destroy_on_states_reuse: true,
            enable_undo: false,
            transition_log_capacity: 64,
        }
    }
}

/// Policy bundle owned by the machine; every slot is optional.
#[derive(Default)]
pub(crate) struct Policies {
    pub(crate) logger: Option<Logger>,
    pub(crate) ignored_event: Option<IgnoredEventHandler>,
    pub(crate) listener_exception: Option<ListenerExceptionHandler>,
}
