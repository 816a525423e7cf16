//! Canopy: a hierarchical state machine library
//!
//! Canopy machines are trees of states. A state's children are either
//! EXCLUSIVE (at most one active, classic nested states) or PARALLEL
//! (all active together, independent regions). Events are plain values
//! routed depth-first from the active leaves, so the deepest state that
//! knows an event wins. Final states finish their parent, completion
//! bubbles up through parallel regions, and optional undo replays the
//! machine into its previous configuration.
//!
//! # Core Concepts
//!
//! - **Machine**: owns the state tree and processes one event at a time
//! - **Transitions**: matcher plus direction producer, built fluently
//! - **Listeners**: fallible observers at state, transition and machine level
//!
//! # Example
//!
//! ```rust
//! use canopy::builder::TransitionBuilder;
//! use canopy::core::ChildMode;
//! use canopy::machine::policy::MachineConfig;
//! use canopy::machine::Machine;
//! use canopy::impl_event;
//!
//! #[derive(Debug)]
//! struct Submit;
//! impl_event!(Submit);
//!
//! # fn main() -> Result<(), canopy::machine::error::MachineError> {
//! let mut machine = Machine::new(Some("order"), ChildMode::Exclusive, MachineConfig::default());
//! let root = machine.root();
//! let draft = machine.add_initial_state(root, Some("draft"))?;
//! let placed = machine.add_state(root, Some("placed"), ChildMode::Exclusive)?;
//!
//! machine.add_transition(
//!     draft,
//!     TransitionBuilder::new().on::<Submit>().target(placed).build().unwrap(),
//! )?;
//!
//! machine.start(None)?;
//! machine.process_event(Submit, None)?;
//! assert!(machine.is_state_active(placed));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod core;
pub mod machine;

// Re-export commonly used types
pub use builder::TransitionBuilder;
pub use core::{arg, Argument, ChildMode, Event, EventMatcher, StateId, TransitionDirection};
pub use machine::error::{ListenerError, ListenerResult, MachineError};
pub use machine::policy::MachineConfig;
pub use machine::{Machine, MachineListener, MachineStatus, TransitionId};
