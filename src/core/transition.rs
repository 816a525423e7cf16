//! Transitions and their direction production.
//!
//! A transition owns an event matcher and a direction-producing function.
//! The producer runs during event processing, not during construction, so it
//! may consult outer business state, but it must be pure: target selection
//! only, no side effects.

use std::sync::Arc;

use crate::core::event::{Argument, Event, EventAndArgument};
use crate::core::state::{ListenerHandle, StateId};
use crate::core::EventMatcher;
use crate::machine::error::ListenerResult;

/// Outcome of a transition's direction producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionDirection {
    /// Transition fires but the machine keeps its current state.
    Stay,
    /// Transition does not fire for this event.
    NoTransition,
    /// Transition fires towards the given state.
    Target(StateId),
}

/// Function deciding where a matched transition leads.
pub type DirectionProducer =
    Box<dyn Fn(&EventAndArgument<'_>) -> TransitionDirection + Send + Sync>;

/// Transition-level observer, notified when its transition is triggered.
pub trait TransitionListener: Send + Sync {
    fn on_triggered(&self, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }
}

pub(crate) struct TriggeredFn<F>(pub(crate) F);

impl<F> TransitionListener for TriggeredFn<F>
where
    F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_triggered(&self, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(params)
    }
}

/// Outgoing transition owned by its source state. The source is implicit in
/// the owning node; build instances with
/// [`TransitionBuilder`](crate::builder::TransitionBuilder).
pub struct Transition {
    pub(crate) name: Option<String>,
    pub(crate) matcher: EventMatcher,
    pub(crate) producer: DirectionProducer,
    pub(crate) listeners: Vec<(ListenerHandle, Arc<dyn TransitionListener>)>,
}

impl Transition {
    pub(crate) fn matches_event(&self, event: &dyn Event) -> bool {
        self.matcher.matches(event)
    }

    pub(crate) fn produce_direction(&self, ea: &EventAndArgument<'_>) -> TransitionDirection {
        (self.producer)(ea)
    }
}

/// Context handed to every listener of a notification round.
pub struct TransitionParams<'a> {
    /// Name of the triggering transition, when it has one.
    pub transition_name: Option<String>,
    /// Source state of the triggering transition.
    pub source: StateId,
    /// Direction the transition resolved to.
    pub direction: TransitionDirection,
    pub event: &'a dyn Event,
    pub argument: Option<&'a Argument>,
}

impl<'a> TransitionParams<'a> {
    /// Downcasts the event to a concrete type.
    pub fn event_as<E: Event>(&self) -> Option<&E> {
        self.event.as_any().downcast_ref::<E>()
    }

    /// Downcasts the argument to a concrete type.
    pub fn argument_as<T: std::any::Any + Send + Sync>(&self) -> Option<&T> {
        self.argument.and_then(|a| a.downcast_ref::<T>())
    }
}
