//! Machine-level observers and notification plumbing.
//!
//! Listener failures never interrupt a round: they are collected in order
//! and flushed through the listener-exception policy once the tree has
//! settled, so observers always see a structurally valid machine.

use std::sync::Arc;

use crate::core::state::{ListenerHandle, StateId, StateListener};
use crate::core::transition::TransitionParams;
use crate::machine::error::{ListenerResult, MachineError};
use crate::machine::Machine;

/// Machine-level observer, seeing every lifecycle and transition event.
///
/// All methods default to `Ok(())` so implementers override selectively.
pub trait MachineListener: Send + Sync {
    fn on_started(&self) -> ListenerResult {
        Ok(())
    }

    /// A transition was triggered, before any state change.
    fn on_transition(&self, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }

    /// A transition completed; `active` holds the resulting active states.
    fn on_transition_complete(
        &self,
        _params: &TransitionParams<'_>,
        _active: &[StateId],
    ) -> ListenerResult {
        Ok(())
    }

    /// Any state in the tree was entered.
    fn on_state_entry(&self, _state: StateId, _params: &TransitionParams<'_>) -> ListenerResult {
        Ok(())
    }

    fn on_stopped(&self) -> ListenerResult {
        Ok(())
    }
}

pub(crate) struct StartedFn<F>(pub(crate) F);

impl<F> MachineListener for StartedFn<F>
where
    F: Fn() -> ListenerResult + Send + Sync,
{
    fn on_started(&self) -> ListenerResult {
        (self.0)()
    }
}

pub(crate) struct StoppedFn<F>(pub(crate) F);

impl<F> MachineListener for StoppedFn<F>
where
    F: Fn() -> ListenerResult + Send + Sync,
{
    fn on_stopped(&self) -> ListenerResult {
        (self.0)()
    }
}

pub(crate) struct TransitionFn<F>(pub(crate) F);

impl<F> MachineListener for TransitionFn<F>
where
    F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_transition(&self, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(params)
    }
}

pub(crate) struct TransitionCompleteFn<F>(pub(crate) F);

impl<F> MachineListener for TransitionCompleteFn<F>
where
    F: Fn(&TransitionParams<'_>, &[StateId]) -> ListenerResult + Send + Sync,
{
    fn on_transition_complete(
        &self,
        params: &TransitionParams<'_>,
        active: &[StateId],
    ) -> ListenerResult {
        (self.0)(params, active)
    }
}

pub(crate) struct StateEntryFn<F>(pub(crate) F);

impl<F> MachineListener for StateEntryFn<F>
where
    F: Fn(StateId, &TransitionParams<'_>) -> ListenerResult + Send + Sync,
{
    fn on_state_entry(&self, state: StateId, params: &TransitionParams<'_>) -> ListenerResult {
        (self.0)(state, params)
    }
}

impl Machine {
    /// Registers a machine listener; duplicates are rejected.
    pub fn add_machine_listener(
        &mut self,
        listener: Arc<dyn MachineListener>,
    ) -> Result<ListenerHandle, MachineError> {
        if self.is_destroyed() {
            return Err(MachineError::Destroyed);
        }
        let exists = self
            .machine_listeners
            .iter()
            .any(|(_, l)| Arc::ptr_eq(l, &listener));
        if exists {
            return Err(MachineError::DuplicateListener);
        }
        let handle = ListenerHandle(self.next_listener);
        self.next_listener += 1;
        self.machine_listeners.push((handle, listener));
        Ok(handle)
    }

    /// Removes a previously registered machine listener.
    pub fn remove_machine_listener(&mut self, handle: ListenerHandle) -> bool {
        let before = self.machine_listeners.len();
        self.machine_listeners.retain(|(h, _)| *h != handle);
        self.machine_listeners.len() != before
    }

    /// Registers a started closure.
    pub fn on_started<F>(&mut self, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn() -> ListenerResult + Send + Sync + 'static,
    {
        self.add_machine_listener(Arc::new(StartedFn(f)))
    }

    /// Registers a stopped closure.
    pub fn on_stopped<F>(&mut self, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn() -> ListenerResult + Send + Sync + 'static,
    {
        self.add_machine_listener(Arc::new(StoppedFn(f)))
    }

    /// Registers a transition closure.
    pub fn on_transition<F>(&mut self, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_machine_listener(Arc::new(TransitionFn(f)))
    }

    /// Registers a transition-complete closure.
    pub fn on_transition_complete<F>(&mut self, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>, &[StateId]) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_machine_listener(Arc::new(TransitionCompleteFn(f)))
    }

    /// Registers a state-entry closure seeing every entered state.
    pub fn on_state_entry<F>(&mut self, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(StateId, &TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_machine_listener(Arc::new(StateEntryFn(f)))
    }

    pub(crate) fn machine_notify<F>(&mut self, f: F)
    where
        F: Fn(&dyn MachineListener) -> ListenerResult,
    {
        let listeners: Vec<_> = self
            .machine_listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            if let Err(error) = f(listener.as_ref()) {
                self.delayed.push(error);
            }
        }
    }

    pub(crate) fn state_notify<F>(&mut self, id: StateId, f: F)
    where
        F: Fn(&dyn StateListener) -> ListenerResult,
    {
        let listeners: Vec<_> = self
            .node(id)
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            if let Err(error) = f(listener.as_ref()) {
                self.delayed.push(error);
            }
        }
    }

    pub(crate) fn transition_notify(
        &mut self,
        source: StateId,
        index: usize,
        params: &TransitionParams<'_>,
    ) {
        let listeners: Vec<_> = self.node(source).transitions[index]
            .listeners
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            if let Err(error) = listener.on_triggered(params) {
                self.delayed.push(error);
            }
        }
    }

    /// Surfaces listener failures collected during the round. With a
    /// listener-exception handler installed every failure is offered to it
    /// in order and the first it rejects propagates; without one the first
    /// failure propagates directly.
    pub(crate) fn flush_delayed(&mut self) -> Result<(), MachineError> {
        if self.delayed.is_empty() {
            return Ok(());
        }
        let errors = std::mem::take(&mut self.delayed);
        let mut first = None;
        if let Some(handler) = &self.policies.listener_exception {
            for error in errors {
                if let Err(rejected) = handler(error) {
                    if first.is_none() {
                        first = Some(rejected);
                    }
                }
            }
        } else {
            first = errors.into_iter().next();
        }
        match first {
            Some(error) => Err(MachineError::Listener(error)),
            None => Ok(()),
        }
    }
}
