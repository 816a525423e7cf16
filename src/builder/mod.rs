//! Fluent construction of transitions.
//!
//! A [`TransitionBuilder`] collects the matcher, the direction and any
//! listeners before the transition is attached to its source state with
//! [`Machine::add_transition`](crate::machine::Machine::add_transition).

pub mod error;

use std::sync::Arc;

use crate::core::event::{Event, EventAndArgument, EventMatcher};
use crate::core::state::{ListenerHandle, StateId};
use crate::core::transition::{
    Transition, TransitionDirection, TransitionListener, TransitionParams, TriggeredFn,
};
use crate::machine::error::ListenerResult;
use error::BuildError;

/// Builds a [`Transition`].
///
/// The event matcher is mandatory. The direction defaults to
/// [`TransitionDirection::Stay`], so a transition without a target still
/// fires its listeners without changing state.
#[derive(Default)]
pub struct TransitionBuilder {
    name: Option<String>,
    matcher: Option<EventMatcher>,
    producer: Option<crate::core::transition::DirectionProducer>,
    listeners: Vec<Arc<dyn TransitionListener>>,
}

impl TransitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the transition for logs and listener params.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Reacts to exactly the concrete event type `E`.
    pub fn on<E: Event>(mut self) -> Self {
        self.matcher = Some(EventMatcher::instance_of::<E>());
        self
    }

    /// Reacts to events accepted by an arbitrary matcher.
    pub fn matching(mut self, matcher: EventMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Always leads to the given state.
    pub fn target(mut self, target: StateId) -> Self {
        self.producer = Some(Box::new(move |_| TransitionDirection::Target(target)));
        self
    }

    /// Fires without changing state.
    pub fn stay(mut self) -> Self {
        self.producer = Some(Box::new(|_| TransitionDirection::Stay));
        self
    }

    /// Decides the direction per event. Returning
    /// [`TransitionDirection::NoTransition`] makes the transition not match,
    /// letting other transitions or ancestors handle the event.
    pub fn conditionally<F>(mut self, producer: F) -> Self
    where
        F: Fn(&EventAndArgument<'_>) -> TransitionDirection + Send + Sync + 'static,
    {
        self.producer = Some(Box::new(producer));
        self
    }

    /// Attaches a triggered listener.
    pub fn on_triggered<F>(mut self, f: F) -> Self
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(TriggeredFn(f)));
        self
    }

    pub fn build(self) -> Result<Transition, BuildError> {
        let matcher = self.matcher.ok_or(BuildError::MissingEventMatcher)?;
        let producer = self
            .producer
            .unwrap_or_else(|| Box::new(|_| TransitionDirection::Stay));
        Ok(Transition {
            name: self.name,
            matcher,
            producer,
            // Placeholder handles, replaced when the transition is attached.
            listeners: self
                .listeners
                .into_iter()
                .map(|l| (ListenerHandle(0), l))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impl_event;

    #[derive(Debug)]
    struct Go;
    impl_event!(Go);

    #[test]
    fn build_requires_matcher() {
        let result = TransitionBuilder::new().stay().build();
        assert_eq!(result.err(), Some(BuildError::MissingEventMatcher));
    }

    #[test]
    fn direction_defaults_to_stay() {
        let transition = TransitionBuilder::new().on::<Go>().build().unwrap();
        let ea = EventAndArgument {
            event: &Go,
            argument: None,
        };
        assert!(transition.matches_event(&Go));
        assert_eq!(transition.produce_direction(&ea), TransitionDirection::Stay);
    }

    #[test]
    fn conditional_direction_sees_the_event() {
        #[derive(Debug)]
        struct Counted(u32);
        impl_event!(Counted);

        let target = StateId(3);
        let transition = TransitionBuilder::new()
            .on::<Counted>()
            .conditionally(move |ea| match ea.event_as::<Counted>() {
                Some(Counted(n)) if *n > 5 => TransitionDirection::Target(target),
                Some(_) => TransitionDirection::NoTransition,
                None => TransitionDirection::NoTransition,
            })
            .build()
            .unwrap();

        let low = Counted(2);
        let high = Counted(9);
        let ea_low = EventAndArgument {
            event: &low,
            argument: None,
        };
        let ea_high = EventAndArgument {
            event: &high,
            argument: None,
        };
        assert_eq!(
            transition.produce_direction(&ea_low),
            TransitionDirection::NoTransition
        );
        assert_eq!(
            transition.produce_direction(&ea_high),
            TransitionDirection::Target(target)
        );
    }
}
