//! The machine kernel: tree construction, the event loop, lifecycle control
//! and introspection.
//!
//! A [`Machine`] owns its state tree in an arena and is logically
//! single-threaded: one event is fully resolved, its exit/enter sequence
//! fully executed and all notifications delivered before the next event
//! begins. Synthetic finished events raised by completion propagation are
//! queued internally and processed as their own rounds, preserving the
//! single-flight guarantee.

pub mod error;
pub mod policy;

mod lifecycle;
mod notify;
mod resolver;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::core::event::{Argument, Event, FinishedEvent, StartEvent, UndoEvent};
use crate::core::record::{TransitionLog, TransitionRecord};
use crate::core::state::{
    ChildMode, ChoiceResolver, EntryFn, ExitFn, FinishedFn, ListenerHandle, StateId, StateKind,
    StateListener, StateNode,
};
use crate::core::transition::{
    Transition, TransitionDirection, TransitionListener, TransitionParams, TriggeredFn,
};
use error::{ListenerError, ListenerResult, MachineError};
use policy::{MachineConfig, Policies};

pub use notify::MachineListener;

/// Machine lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineStatus {
    Created,
    Running,
    Stopped,
    Destroyed,
}

/// Handle to a transition owned by a source state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionId {
    pub(crate) source: StateId,
    pub(crate) index: usize,
}

/// Snapshot taken before a state-changing transition, replayed by `undo`.
struct UndoSnapshot {
    leaves: Vec<StateId>,
    argument: Option<Argument>,
}

/// Hierarchical state machine with parallel regions, pseudostates,
/// completion propagation and optional undo.
pub struct Machine {
    id: Uuid,
    states: Vec<StateNode>,
    root: StateId,
    status: MachineStatus,
    queued: VecDeque<(Box<dyn Event>, Option<Argument>)>,
    undo_stack: Vec<UndoSnapshot>,
    last_argument: Option<Argument>,
    machine_listeners: Vec<(ListenerHandle, Arc<dyn MachineListener>)>,
    delayed: Vec<ListenerError>,
    policies: Policies,
    config: MachineConfig,
    log: TransitionLog,
    next_listener: u64,
}

impl Machine {
    /// Creates a machine whose root state has the given name and child mode.
    pub fn new(name: Option<&str>, child_mode: ChildMode, config: MachineConfig) -> Self {
        let root = StateNode::new(name.map(String::from), StateKind::Plain, child_mode);
        Self {
            id: Uuid::new_v4(),
            states: vec![root],
            root: StateId(0),
            status: MachineStatus::Created,
            queued: VecDeque::new(),
            undo_stack: Vec::new(),
            last_argument: None,
            machine_listeners: Vec::new(),
            delayed: Vec::new(),
            policies: Policies::default(),
            log: TransitionLog::new(config.transition_log_capacity),
            config,
            next_listener: 0,
        }
    }

    /// Unique id of this machine instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Root state of the tree.
    pub fn root(&self) -> StateId {
        self.root
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == MachineStatus::Running
    }

    pub fn is_destroyed(&self) -> bool {
        self.status == MachineStatus::Destroyed
    }

    /// True once the root state has finished; a finished machine routes all
    /// further events to the ignored-event handler.
    pub fn is_finished(&self) -> bool {
        self.node(self.root).is_finished
    }

    // ------------------------------------------------------------------
    // Construction API (valid until the machine starts).
    // ------------------------------------------------------------------

    /// Adds a plain state under `parent`.
    pub fn add_state(
        &mut self,
        parent: StateId,
        name: Option<&str>,
        child_mode: ChildMode,
    ) -> Result<StateId, MachineError> {
        self.attach(
            parent,
            StateNode::new(name.map(String::from), StateKind::Plain, child_mode),
        )
    }

    /// Adds a plain state and makes it the initial child of `parent`.
    pub fn add_initial_state(
        &mut self,
        parent: StateId,
        name: Option<&str>,
    ) -> Result<StateId, MachineError> {
        let id = self.add_state(parent, name, ChildMode::Exclusive)?;
        self.set_initial_state(parent, id)?;
        Ok(id)
    }

    /// Adds a final state; entering it finishes `parent`.
    pub fn add_final_state(
        &mut self,
        parent: StateId,
        name: Option<&str>,
    ) -> Result<StateId, MachineError> {
        self.attach(
            parent,
            StateNode::new(name.map(String::from), StateKind::Final, ChildMode::Exclusive),
        )
    }

    /// Adds a data state that latches the event argument while active.
    pub fn add_data_state(
        &mut self,
        parent: StateId,
        name: Option<&str>,
        default: Option<Argument>,
    ) -> Result<StateId, MachineError> {
        self.attach(
            parent,
            StateNode::new(
                name.map(String::from),
                StateKind::Data {
                    default,
                    data: None,
                    last: None,
                },
                ChildMode::Exclusive,
            ),
        )
    }

    /// Adds a choice pseudostate resolved by `resolver` at transition time.
    pub fn add_choice_state<F>(
        &mut self,
        parent: StateId,
        name: Option<&str>,
        resolver: F,
    ) -> Result<StateId, MachineError>
    where
        F: Fn(&crate::core::event::EventAndArgument<'_>) -> StateId + Send + Sync + 'static,
    {
        let resolver: ChoiceResolver = Box::new(resolver);
        self.attach(
            parent,
            StateNode::new(
                name.map(String::from),
                StateKind::Choice(resolver),
                ChildMode::Exclusive,
            ),
        )
    }

    /// Adds a shallow history pseudostate remembering the region's last
    /// active child. Falls back to `default`, then to the region's initial
    /// state, when nothing was recorded yet.
    pub fn add_history_state(
        &mut self,
        parent: StateId,
        name: Option<&str>,
        default: Option<StateId>,
    ) -> Result<StateId, MachineError> {
        self.attach(
            parent,
            StateNode::new(
                name.map(String::from),
                StateKind::History {
                    default,
                    stored: None,
                },
                ChildMode::Exclusive,
            ),
        )
    }

    /// Adds a nested machine as a state. The nested machine manages its own
    /// internal state; the outer machine never descends into it.
    pub fn add_sub_machine(
        &mut self,
        parent: StateId,
        machine: Machine,
    ) -> Result<StateId, MachineError> {
        let name = machine.node(machine.root).name.clone();
        self.attach(
            parent,
            StateNode::new(
                name,
                StateKind::SubMachine(Box::new(machine)),
                ChildMode::Exclusive,
            ),
        )
    }

    /// Moves an attached state (with its subtree) under a new parent.
    ///
    /// Reusing an already-attached state is resolved by the reuse policy:
    /// with `auto_destroy_on_states_reuse` the previous attachment is
    /// dissolved and the subtree's runtime state reset, otherwise the call
    /// fails.
    pub fn move_state(&mut self, child: StateId, new_parent: StateId) -> Result<(), MachineError> {
        self.ensure_editable()?;
        if child == self.root {
            return Err(MachineError::StateReuse {
                state: self.state_display(child),
            });
        }
        let mut cursor = Some(new_parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(MachineError::MoveIntoOwnSubtree {
                    state: self.state_display(child),
                });
            }
            cursor = self.node(ancestor).parent;
        }
        if let Some(old_parent) = self.node(child).parent {
            if !self.config.auto_destroy_on_states_reuse {
                return Err(MachineError::StateReuse {
                    state: self.state_display(child),
                });
            }
            self.log_with(|| {
                format!(
                    "state {} reused, dissolving previous attachment",
                    self.state_display(child)
                )
            });
            self.detach(old_parent, child);
        }
        self.check_attachable(new_parent, child)?;
        self.node_mut(child).parent = Some(new_parent);
        self.node_mut(new_parent).children.push(child);
        Ok(())
    }

    /// Declares the initial child entered when `parent` activates.
    pub fn set_initial_state(
        &mut self,
        parent: StateId,
        child: StateId,
    ) -> Result<(), MachineError> {
        self.ensure_editable()?;
        if self.node(parent).child_mode == ChildMode::Parallel {
            return Err(MachineError::InitialStateInParallel);
        }
        if !self.node(parent).children.contains(&child) {
            return Err(MachineError::NotAChild {
                child: self.state_display(child),
                parent: self.state_display(parent),
            });
        }
        if self.node(child).kind.is_pseudo() {
            return Err(MachineError::InitialPseudoState {
                state: self.state_display(child),
            });
        }
        self.node_mut(parent).initial = Some(child);
        Ok(())
    }

    /// Adds an outgoing transition to `source`.
    pub fn add_transition(
        &mut self,
        source: StateId,
        mut transition: Transition,
    ) -> Result<TransitionId, MachineError> {
        self.ensure_editable()?;
        let kind = &self.node(source).kind;
        if kind.is_pseudo() || matches!(kind, StateKind::Final) {
            return Err(MachineError::TransitionsNotAllowed {
                state: self.state_display(source),
            });
        }
        // Listeners attached through the builder get real handles here.
        for (handle, _) in &mut transition.listeners {
            *handle = self.next_handle();
        }
        let node = self.node_mut(source);
        node.transitions.push(transition);
        Ok(TransitionId {
            source,
            index: node.transitions.len() - 1,
        })
    }

    fn attach(&mut self, parent: StateId, node: StateNode) -> Result<StateId, MachineError> {
        self.ensure_editable()?;
        let id = StateId(self.states.len());
        self.states.push(node);
        if let Err(e) = self.check_attachable(parent, id) {
            self.states.pop();
            return Err(e);
        }
        self.node_mut(id).parent = Some(parent);
        self.node_mut(parent).children.push(id);
        Ok(id)
    }

    fn check_attachable(&self, parent: StateId, child: StateId) -> Result<(), MachineError> {
        if !self.node(parent).kind.allows_children() {
            return Err(MachineError::ChildrenNotAllowed {
                state: self.state_display(parent),
            });
        }
        let child_node = self.node(child);
        if self.node(parent).child_mode == ChildMode::Parallel
            && (child_node.kind.is_pseudo() || matches!(child_node.kind, StateKind::Final))
        {
            return Err(MachineError::InvalidParallelChild);
        }
        if let Some(name) = &child_node.name {
            let duplicate = self
                .node(parent)
                .children
                .iter()
                .any(|c| *c != child && self.node(*c).name.as_deref() == Some(name));
            if duplicate {
                return Err(MachineError::DuplicateName {
                    name: name.clone(),
                    parent: self.state_display(parent),
                });
            }
        }
        Ok(())
    }

    fn detach(&mut self, parent: StateId, child: StateId) {
        self.node_mut(parent).children.retain(|c| *c != child);
        let parent_node = self.node_mut(parent);
        if parent_node.initial == Some(child) {
            parent_node.initial = None;
        }
        if parent_node.current == Some(child) {
            parent_node.current = None;
        }
        self.node_mut(child).parent = None;
        self.reset_subtree(child);
    }

    fn reset_subtree(&mut self, id: StateId) {
        self.node_mut(id).reset_runtime();
        for child in self.node(id).children.clone() {
            self.reset_subtree(child);
        }
    }

    // ------------------------------------------------------------------
    // State-level listener registration.
    // ------------------------------------------------------------------

    /// Registers a state listener; duplicates are rejected.
    pub fn add_state_listener(
        &mut self,
        state: StateId,
        listener: Arc<dyn StateListener>,
    ) -> Result<ListenerHandle, MachineError> {
        self.ensure_not_destroyed()?;
        let exists = self
            .node(state)
            .listeners
            .iter()
            .any(|(_, l)| Arc::ptr_eq(l, &listener));
        if exists {
            return Err(MachineError::DuplicateListener);
        }
        let handle = self.next_handle();
        self.node_mut(state).listeners.push((handle, listener));
        Ok(handle)
    }

    /// Removes a previously registered state listener.
    pub fn remove_state_listener(&mut self, state: StateId, handle: ListenerHandle) -> bool {
        let listeners = &mut self.node_mut(state).listeners;
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Registers an entry closure on a state.
    pub fn on_entry<F>(&mut self, state: StateId, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_state_listener(state, Arc::new(EntryFn(f)))
    }

    /// Registers an exit closure on a state.
    pub fn on_exit<F>(&mut self, state: StateId, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_state_listener(state, Arc::new(ExitFn(f)))
    }

    /// Registers a finish closure on a state.
    pub fn on_finished<F>(&mut self, state: StateId, f: F) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_state_listener(state, Arc::new(FinishedFn(f)))
    }

    /// Registers a transition listener; duplicates are rejected.
    pub fn add_transition_listener(
        &mut self,
        transition: TransitionId,
        listener: Arc<dyn TransitionListener>,
    ) -> Result<ListenerHandle, MachineError> {
        self.ensure_not_destroyed()?;
        let owned = &self.node(transition.source).transitions[transition.index];
        if owned.listeners.iter().any(|(_, l)| Arc::ptr_eq(l, &listener)) {
            return Err(MachineError::DuplicateListener);
        }
        let handle = self.next_handle();
        self.node_mut(transition.source).transitions[transition.index]
            .listeners
            .push((handle, listener));
        Ok(handle)
    }

    /// Registers a triggered closure on a transition.
    pub fn on_triggered<F>(
        &mut self,
        transition: TransitionId,
        f: F,
    ) -> Result<ListenerHandle, MachineError>
    where
        F: Fn(&TransitionParams<'_>) -> ListenerResult + Send + Sync + 'static,
    {
        self.add_transition_listener(transition, Arc::new(TriggeredFn(f)))
    }

    /// Removes a previously registered transition listener.
    pub fn remove_transition_listener(
        &mut self,
        transition: TransitionId,
        handle: ListenerHandle,
    ) -> bool {
        let listeners = &mut self.node_mut(transition.source).transitions[transition.index]
            .listeners;
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    // ------------------------------------------------------------------
    // Policies.
    // ------------------------------------------------------------------

    pub fn set_logger<F>(&mut self, logger: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.policies.logger = Some(Box::new(logger));
    }

    pub fn set_ignored_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&dyn Event, Option<&Argument>) + Send + Sync + 'static,
    {
        self.policies.ignored_event = Some(Box::new(handler));
    }

    pub fn set_listener_exception_handler<F>(&mut self, handler: F)
    where
        F: Fn(ListenerError) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.policies.listener_exception = Some(Box::new(handler));
    }

    // ------------------------------------------------------------------
    // Lifecycle control.
    // ------------------------------------------------------------------

    /// Starts the machine, entering the initial state path of the whole
    /// tree. A no-op when already running.
    pub fn start(&mut self, argument: Option<Argument>) -> Result<(), MachineError> {
        self.ensure_not_destroyed()?;
        if self.is_running() {
            return Ok(());
        }
        self.validate_initial_states(self.root)?;
        self.log_with(|| format!("machine {} starting", self.id));
        self.status = MachineStatus::Running;
        self.last_argument = argument.clone();

        let event = StartEvent;
        let params = TransitionParams {
            transition_name: Some("start".to_string()),
            source: self.root,
            direction: TransitionDirection::Target(self.root),
            event: &event,
            argument: argument.as_ref(),
        };
        self.do_enter(self.root, &params);
        self.recursive_enter_initial_states(self.root, &params)?;

        self.machine_notify(|l| l.on_started());
        self.log.record(TransitionRecord {
            event: format!("{:?}", params.event),
            source: self.node(self.root).name.clone(),
            target: self.node(self.root).name.clone(),
            timestamp: Utc::now(),
        });
        let active = self.active_states(false);
        self.machine_notify(|l| l.on_transition_complete(&params, &active));
        drop(params);
        self.drain_queued()?;
        self.flush_delayed()
    }

    /// Stops the machine, force-clearing activation state top-down without
    /// running exit hooks. A no-op when not running.
    pub fn stop(&mut self) -> Result<(), MachineError> {
        self.ensure_not_destroyed()?;
        if !self.is_running() {
            return Ok(());
        }
        self.log_with(|| format!("machine {} stopping", self.id));
        self.status = MachineStatus::Stopped;
        self.recursive_stop(self.root);
        self.undo_stack.clear();
        self.machine_notify(|l| l.on_stopped());
        self.flush_delayed()
    }

    /// Stops and starts the machine again.
    pub fn restart(&mut self, argument: Option<Argument>) -> Result<(), MachineError> {
        self.stop()?;
        self.start(argument)
    }

    /// Destroys the machine, clearing all listeners, transitions and
    /// internal state. The instance is permanently unusable afterwards.
    pub fn destroy(&mut self, stop: bool) -> Result<(), MachineError> {
        if self.is_destroyed() {
            return Ok(());
        }
        if stop && self.is_running() {
            self.status = MachineStatus::Stopped;
            self.recursive_stop(self.root);
            self.machine_notify(|l| l.on_stopped());
        }
        // Teardown always completes; the first nested failure is surfaced
        // only after the machine is fully destroyed.
        let mut nested_failure = None;
        for index in 0..self.states.len() {
            if let StateKind::SubMachine(inner) = &mut self.states[index].kind {
                if let Err(error) = inner.destroy(true) {
                    if nested_failure.is_none() {
                        nested_failure = Some(error);
                    }
                }
            }
            self.states[index].clear();
        }
        self.machine_listeners.clear();
        self.queued.clear();
        self.undo_stack.clear();
        self.log.clear();
        self.policies = Policies::default();
        self.status = MachineStatus::Destroyed;
        let flushed = self.flush_delayed();
        match nested_failure {
            Some(error) => Err(error),
            None => flushed,
        }
    }

    /// Routes an event through the tree. Fails when the machine is not
    /// running; a finished machine routes events to the ignored-event
    /// handler.
    ///
    /// Rounds never overlap: the machine is borrowed mutably for the whole
    /// round and listeners only receive the transition context, so there is
    /// no re-entrant submission path. Synthetic finished events raised
    /// mid-round are queued and processed as rounds of their own before
    /// this call returns.
    pub fn process_event<E: Event>(
        &mut self,
        event: E,
        argument: Option<Argument>,
    ) -> Result<(), MachineError> {
        self.ensure_not_destroyed()?;
        if !self.is_running() {
            return Err(MachineError::NotRunning);
        }
        self.process_round(&event, argument)?;
        self.drain_queued()?;
        self.flush_delayed()
    }

    /// Rolls back the most recent state-changing transition, restoring the
    /// previous active leaves with the argument that originally entered
    /// them.
    pub fn undo(&mut self) -> Result<(), MachineError> {
        self.ensure_not_destroyed()?;
        if !self.config.enable_undo {
            return Err(MachineError::UndoDisabled);
        }
        if !self.is_running() {
            return Err(MachineError::NotRunning);
        }
        let snapshot = self.undo_stack.pop().ok_or(MachineError::UndoStackEmpty)?;
        self.log_with(|| format!("machine {} undoing last transition", self.id));

        let event = UndoEvent;
        let direction = snapshot
            .leaves
            .first()
            .map(|l| TransitionDirection::Target(*l))
            .unwrap_or(TransitionDirection::Stay);
        let params = TransitionParams {
            transition_name: Some("undo".to_string()),
            source: self.root,
            direction,
            event: &event,
            argument: snapshot.argument.as_ref(),
        };
        self.machine_notify(|l| l.on_transition(&params));
        for leaf in snapshot.leaves.iter().copied() {
            self.switch_to_target(leaf, self.root, &params)?;
        }

        self.log.record(TransitionRecord {
            event: format!("{:?}", params.event),
            source: None,
            target: snapshot
                .leaves
                .first()
                .and_then(|l| self.node(*l).name.clone()),
            timestamp: Utc::now(),
        });
        let active = self.active_states(false);
        self.machine_notify(|l| l.on_transition_complete(&params, &active));
        drop(params);
        self.last_argument = snapshot.argument.clone();
        self.drain_queued()?;
        self.flush_delayed()
    }

    // ------------------------------------------------------------------
    // Event processing internals.
    // ------------------------------------------------------------------

    fn process_round(
        &mut self,
        event: &dyn Event,
        argument: Option<Argument>,
    ) -> Result<(), MachineError> {
        if self.node(self.root).is_finished {
            self.log_with(|| format!("machine is finished, not accepting {event:?}"));
            if !event.as_any().is::<FinishedEvent>() {
                if let Some(handler) = &self.policies.ignored_event {
                    handler(event, argument.as_ref());
                }
            }
            return Ok(());
        }
        let ea = crate::core::event::EventAndArgument {
            event,
            argument: argument.as_ref(),
        };
        let resolved = self.recursive_find_unique_resolved_transition(self.root, &ea)?;
        let Some(resolved) = resolved else {
            self.log_with(|| format!("no transition matches {event:?}"));
            if !event.as_any().is::<FinishedEvent>() {
                if let Some(handler) = &self.policies.ignored_event {
                    handler(event, argument.as_ref());
                }
            }
            return Ok(());
        };

        self.perform_transition(resolved, event, argument)
    }

    fn perform_transition(
        &mut self,
        resolved: resolver::ResolvedTransition,
        event: &dyn Event,
        argument: Option<Argument>,
    ) -> Result<(), MachineError> {
        let params = TransitionParams {
            transition_name: resolved.name.clone(),
            source: resolved.source,
            direction: resolved.direction,
            event,
            argument: argument.as_ref(),
        };
        self.log_with(|| {
            format!(
                "triggering transition from {} on {:?}",
                self.state_display(resolved.source),
                event
            )
        });
        self.transition_notify(resolved.source, resolved.index, &params);
        self.machine_notify(|l| l.on_transition(&params));

        let mut entered = None;
        if let TransitionDirection::Target(raw) = resolved.direction {
            let ea = crate::core::event::EventAndArgument {
                event,
                argument: argument.as_ref(),
            };
            let target = self.resolve_target(raw, &ea)?;
            if self.config.enable_undo {
                self.undo_stack.push(UndoSnapshot {
                    leaves: self.active_leaves(),
                    argument: self.last_argument.clone(),
                });
            }
            self.switch_to_target(target, resolved.source, &params)?;
            self.last_argument = argument.clone();
            entered = Some(target);
        }

        self.log.record(TransitionRecord {
            event: format!("{event:?}"),
            source: self.node(resolved.source).name.clone(),
            target: entered.and_then(|t| self.node(t).name.clone()),
            timestamp: Utc::now(),
        });
        let active = self.active_states(false);
        self.machine_notify(|l| l.on_transition_complete(&params, &active));
        Ok(())
    }

    fn drain_queued(&mut self) -> Result<(), MachineError> {
        while let Some((event, argument)) = self.queued.pop_front() {
            self.process_round(event.as_ref(), argument)?;
        }
        Ok(())
    }

    fn validate_initial_states(&self, id: StateId) -> Result<(), MachineError> {
        let node = self.node(id);
        if node.kind.is_sub_machine() {
            return Ok(());
        }
        if !node.children.is_empty()
            && node.child_mode == ChildMode::Exclusive
            && node.initial.is_none()
        {
            return Err(MachineError::NoInitialState {
                state: self.state_display(id),
            });
        }
        for child in &node.children {
            self.validate_initial_states(*child)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection.
    // ------------------------------------------------------------------

    /// States currently on an active path, in pre-order. Internals of nested
    /// machines are not included.
    pub fn active_states(&self, include_root: bool) -> Vec<StateId> {
        let mut out = Vec::new();
        self.collect_active(self.root, include_root, &mut out);
        out
    }

    fn collect_active(&self, id: StateId, include_self: bool, out: &mut Vec<StateId>) {
        if !self.node(id).is_active {
            return;
        }
        if include_self {
            out.push(id);
        }
        if self.node(id).kind.is_sub_machine() {
            return;
        }
        for child in &self.node(id).children {
            self.collect_active(*child, true, out);
        }
    }

    pub(crate) fn active_leaves(&self) -> Vec<StateId> {
        let mut out = Vec::new();
        self.collect_active_leaves(self.root, &mut out);
        out
    }

    fn collect_active_leaves(&self, id: StateId, out: &mut Vec<StateId>) {
        if !self.node(id).is_active {
            return;
        }
        if self.node(id).kind.is_sub_machine() {
            out.push(id);
            return;
        }
        let mut any_active_child = false;
        for child in &self.node(id).children {
            if self.node(*child).is_active {
                any_active_child = true;
                self.collect_active_leaves(*child, out);
            }
        }
        if !any_active_child {
            out.push(id);
        }
    }

    /// Finds a direct or (when `recursive`) nested state by name. Does not
    /// search inside nested machines.
    pub fn find_state(&self, name: &str, recursive: bool) -> Option<StateId> {
        self.find_state_in(self.root, name, recursive)
    }

    /// Finds a state by name below `parent`.
    pub fn find_state_in(&self, parent: StateId, name: &str, recursive: bool) -> Option<StateId> {
        for child in &self.node(parent).children {
            if self.node(*child).name.as_deref() == Some(name) {
                return Some(*child);
            }
        }
        if !recursive {
            return None;
        }
        for child in &self.node(parent).children {
            if self.node(*child).kind.is_sub_machine() {
                continue;
            }
            if let Some(found) = self.find_state_in(*child, name, recursive) {
                return Some(found);
            }
        }
        None
    }

    /// Total number of states in the tree, root included.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state_name(&self, id: StateId) -> Option<&str> {
        self.node(id).name.as_deref()
    }

    pub fn is_state_active(&self, id: StateId) -> bool {
        self.node(id).is_active
    }

    pub fn is_state_finished(&self, id: StateId) -> bool {
        self.node(id).is_finished
    }

    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.node(id).parent
    }

    pub fn children(&self, id: StateId) -> &[StateId] {
        &self.node(id).children
    }

    /// Current child of an EXCLUSIVE state, when one is active.
    pub fn current_child(&self, id: StateId) -> Option<StateId> {
        self.node(id).current
    }

    /// Data latched by an active data state.
    pub fn state_data(&self, id: StateId) -> Option<Argument> {
        let node = self.node(id);
        match &node.kind {
            StateKind::Data { data, .. } if node.is_active => data.clone(),
            _ => None,
        }
    }

    /// Data last held by a data state; survives exit.
    pub fn last_state_data(&self, id: StateId) -> Option<Argument> {
        match &self.node(id).kind {
            StateKind::Data { data, last, .. } => data.clone().or_else(|| last.clone()),
            _ => None,
        }
    }

    /// Nested machine behind a sub-machine state.
    pub fn sub_machine(&self, id: StateId) -> Option<&Machine> {
        match &self.node(id).kind {
            StateKind::SubMachine(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn sub_machine_mut(&mut self, id: StateId) -> Option<&mut Machine> {
        match &mut self.node_mut(id).kind {
            StateKind::SubMachine(inner) => Some(inner),
            _ => None,
        }
    }

    /// Ordered log of performed transitions.
    pub fn transition_log(&self) -> &TransitionLog {
        &self.log
    }

    // ------------------------------------------------------------------
    // Shared internals.
    // ------------------------------------------------------------------

    pub(crate) fn node(&self, id: StateId) -> &StateNode {
        &self.states[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: StateId) -> &mut StateNode {
        &mut self.states[id.0]
    }

    pub(crate) fn state_display(&self, id: StateId) -> String {
        match &self.node(id).name {
            Some(name) => format!("'{name}'"),
            None => format!("state#{}", id.0),
        }
    }

    pub(crate) fn log_with(&self, message: impl FnOnce() -> String) {
        if let Some(logger) = &self.policies.logger {
            logger(&message());
        }
    }

    fn next_handle(&mut self) -> ListenerHandle {
        let handle = ListenerHandle(self.next_listener);
        self.next_listener += 1;
        handle
    }

    fn ensure_not_destroyed(&self) -> Result<(), MachineError> {
        if self.is_destroyed() {
            return Err(MachineError::Destroyed);
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), MachineError> {
        self.ensure_not_destroyed()?;
        if self.is_running() {
            return Err(MachineError::StructureFrozen);
        }
        Ok(())
    }
}
