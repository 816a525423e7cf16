//! Core building blocks: events, state nodes, transitions and the
//! transition log.

pub mod event;
pub mod record;
pub mod state;
pub mod transition;

pub use event::{arg, Argument, Event, EventAndArgument, EventMatcher};
pub use event::{FinishedEvent, StartEvent, UndoEvent};
pub use record::{TransitionLog, TransitionRecord};
pub use state::{ChildMode, ChoiceResolver, ListenerHandle, StateId, StateListener};
pub use transition::{
    DirectionProducer, Transition, TransitionDirection, TransitionListener, TransitionParams,
};
