//! Events and event matching.
//!
//! Events are plain values identified by their runtime type. Transitions
//! select events through an [`EventMatcher`], a predicate over the erased
//! event, so a single machine can route arbitrary user-defined event types.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::core::state::StateId;

/// Marker trait for machine events.
///
/// Events carry no behavior of their own; they are matched by runtime type
/// and optionally inspected by direction producers and listeners. Implement
/// it with the [`impl_event!`](crate::impl_event) macro:
///
/// ```rust
/// use canopy::impl_event;
///
/// #[derive(Debug)]
/// struct Switch;
/// impl_event!(Switch);
/// ```
pub trait Event: Any + fmt::Debug + Send + Sync {
    /// Erased view used for runtime type matching.
    fn as_any(&self) -> &dyn Any;
}

/// Implements [`Event`] for one or more concrete types.
#[macro_export]
macro_rules! impl_event {
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::core::Event for $ty {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        })+
    };
}

/// Opaque payload that may accompany an event or a machine start.
///
/// Arguments are reference-counted so the machine can keep them in undo
/// snapshots and data states without requiring `Clone` on the payload type.
pub type Argument = Arc<dyn Any + Send + Sync>;

/// Wraps a value into an [`Argument`].
pub fn arg<T: Any + Send + Sync>(value: T) -> Argument {
    Arc::new(value)
}

/// An event paired with its optional argument, as seen by direction
/// producers and choice resolvers during event processing.
pub struct EventAndArgument<'a> {
    pub event: &'a dyn Event,
    pub argument: Option<&'a Argument>,
}

impl<'a> EventAndArgument<'a> {
    /// Downcasts the event to a concrete type.
    pub fn event_as<E: Event>(&self) -> Option<&E> {
        self.event.as_any().downcast_ref::<E>()
    }

    /// Downcasts the argument to a concrete type.
    pub fn argument_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.argument.and_then(|a| a.downcast_ref::<T>())
    }
}

/// Predicate over an erased event, used by transitions to select which
/// events they react to.
pub struct EventMatcher {
    description: &'static str,
    predicate: Box<dyn Fn(&dyn Event) -> bool + Send + Sync>,
}

impl EventMatcher {
    /// Matcher accepting exactly the concrete event type `E`.
    pub fn instance_of<E: Event>() -> Self {
        Self {
            description: type_name::<E>(),
            predicate: Box::new(|event| event.as_any().is::<E>()),
        }
    }

    /// Matcher accepting every event.
    pub fn any() -> Self {
        Self {
            description: "any",
            predicate: Box::new(|_| true),
        }
    }

    /// Matcher built from an arbitrary predicate.
    pub fn new<F>(description: &'static str, predicate: F) -> Self
    where
        F: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        Self {
            description,
            predicate: Box::new(predicate),
        }
    }

    pub fn matches(&self, event: &dyn Event) -> bool {
        (self.predicate)(event)
    }
}

impl fmt::Debug for EventMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventMatcher").field(&self.description).finish()
    }
}

/// Synthetic event processed when a machine starts.
#[derive(Debug)]
pub struct StartEvent;

/// Synthetic event emitted when a non-root state finishes.
#[derive(Debug)]
pub struct FinishedEvent {
    /// The state that finished.
    pub state: StateId,
}

/// Synthetic event representing an undo replay.
#[derive(Debug)]
pub struct UndoEvent;

impl_event!(StartEvent, FinishedEvent, UndoEvent);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping;

    #[derive(Debug)]
    struct Pong(u32);

    impl_event!(Ping, Pong);

    #[test]
    fn instance_matcher_selects_by_type() {
        let matcher = EventMatcher::instance_of::<Ping>();
        assert!(matcher.matches(&Ping));
        assert!(!matcher.matches(&Pong(1)));
    }

    #[test]
    fn any_matcher_accepts_everything() {
        let matcher = EventMatcher::any();
        assert!(matcher.matches(&Ping));
        assert!(matcher.matches(&Pong(7)));
        assert!(matcher.matches(&StartEvent));
    }

    #[test]
    fn predicate_matcher_inspects_event_value() {
        let matcher = EventMatcher::new("pong over 10", |event| {
            event
                .as_any()
                .downcast_ref::<Pong>()
                .is_some_and(|p| p.0 > 10)
        });
        assert!(matcher.matches(&Pong(11)));
        assert!(!matcher.matches(&Pong(10)));
        assert!(!matcher.matches(&Ping));
    }

    #[test]
    fn event_and_argument_downcasts() {
        let argument = arg(42usize);
        let event = Pong(3);
        let ea = EventAndArgument {
            event: &event,
            argument: Some(&argument),
        };
        assert_eq!(ea.event_as::<Pong>().map(|p| p.0), Some(3));
        assert_eq!(ea.argument_as::<usize>(), Some(&42));
        assert!(ea.event_as::<Ping>().is_none());
        assert!(ea.argument_as::<String>().is_none());
    }
}
