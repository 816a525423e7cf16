//! Entry and exit mechanics of the state tree.
//!
//! All functions here uphold the activation invariants: exits always run
//! before entries, EXCLUSIVE parents track exactly one current child, and
//! PARALLEL parents activate every child region together. Completion
//! propagates upward synchronously; the synthetic finished events it raises
//! are queued and processed as separate rounds.

use crate::core::event::FinishedEvent;
use crate::core::state::{ChildMode, StateId, StateKind};
use crate::core::transition::TransitionParams;
use crate::machine::error::MachineError;
use crate::machine::Machine;

impl Machine {
    /// Activates a single node. Idempotent.
    pub(crate) fn do_enter(&mut self, id: StateId, params: &TransitionParams<'_>) {
        if self.node(id).is_active {
            return;
        }
        self.log_with(|| format!("entering {}", self.state_display(id)));
        self.node_mut(id).is_active = true;
        if let StateKind::Data { default, data, .. } = &mut self.node_mut(id).kind {
            *data = params.argument.cloned().or_else(|| default.clone());
        }
        self.state_notify(id, |l| l.on_entry(params));
    }

    /// Deactivates a single node. Idempotent.
    pub(crate) fn do_exit(&mut self, id: StateId, params: &TransitionParams<'_>) {
        if !self.node(id).is_active {
            return;
        }
        self.log_with(|| format!("exiting {}", self.state_display(id)));
        let node = self.node_mut(id);
        if let StateKind::Data { data, last, .. } = &mut node.kind {
            if let Some(value) = data.take() {
                *last = Some(value);
            }
        }
        node.current = None;
        node.is_finished = false;
        node.is_active = false;
        self.state_notify(id, |l| l.on_exit(params));
    }

    /// Exits the subtree rooted at `id`, deepest states first.
    pub(crate) fn recursive_exit(&mut self, id: StateId, params: &TransitionParams<'_>) {
        match self.node(id).child_mode {
            ChildMode::Exclusive => {
                if let Some(current) = self.node(id).current {
                    self.recursive_exit(current, params);
                }
            }
            ChildMode::Parallel => {
                for child in self.node(id).children.clone() {
                    if self.node(child).is_active {
                        self.recursive_exit(child, params);
                    }
                }
            }
        }
        self.do_exit(id, params);
    }

    /// Enters the initial-state chain below an already-active `id`.
    pub(crate) fn recursive_enter_initial_states(
        &mut self,
        id: StateId,
        params: &TransitionParams<'_>,
    ) -> Result<(), MachineError> {
        if self.node(id).kind.is_sub_machine() || self.node(id).children.is_empty() {
            return Ok(());
        }
        match self.node(id).child_mode {
            ChildMode::Exclusive => {
                let initial = self.node(id).initial.ok_or_else(|| {
                    MachineError::NoInitialState {
                        state: self.state_display(id),
                    }
                })?;
                self.set_current_state(id, initial, params);
                self.recursive_enter_initial_states(initial, params)
            }
            ChildMode::Parallel => {
                for child in self.node(id).children.clone() {
                    self.handle_state_entry(id, child, params);
                    self.recursive_enter_initial_states(child, params)?;
                }
                Ok(())
            }
        }
    }

    /// Walks an enter path produced by LCA search, entering states top-down.
    /// When the path runs out, the remaining depth is filled with initial
    /// states. Sibling PARALLEL regions off the path activate their own
    /// initial chains.
    pub(crate) fn recursive_enter_state_path(
        &mut self,
        id: StateId,
        path: &mut Vec<StateId>,
        params: &TransitionParams<'_>,
    ) -> Result<(), MachineError> {
        let Some(next) = path.pop() else {
            return self.recursive_enter_initial_states(id, params);
        };
        match self.node(id).child_mode {
            ChildMode::Exclusive => {
                self.set_current_state(id, next, params);
                if self.node(next).kind.is_sub_machine() {
                    Ok(())
                } else {
                    self.recursive_enter_state_path(next, path, params)
                }
            }
            ChildMode::Parallel => {
                for child in self.node(id).children.clone() {
                    if child == next {
                        self.handle_state_entry(id, child, params);
                        self.recursive_enter_state_path(child, path, params)?;
                    } else if !self.node(child).is_active {
                        self.handle_state_entry(id, child, params);
                        self.recursive_enter_initial_states(child, params)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Makes `child` the current child of an EXCLUSIVE `parent`, exiting the
    /// previous current subtree first. A no-op when `child` is already
    /// current, so enter paths passing through the active branch leave it
    /// untouched. Sibling history pseudostates record the new child.
    pub(crate) fn set_current_state(
        &mut self,
        parent: StateId,
        child: StateId,
        params: &TransitionParams<'_>,
    ) {
        debug_assert_eq!(self.node(parent).child_mode, ChildMode::Exclusive);
        if self.node(parent).current == Some(child) {
            return;
        }
        if let Some(previous) = self.node(parent).current {
            self.recursive_exit(previous, params);
        }
        self.node_mut(parent).current = Some(child);
        for sibling in self.node(parent).children.clone() {
            if sibling == child {
                continue;
            }
            if let StateKind::History { stored, .. } = &mut self.node_mut(sibling).kind {
                *stored = Some(child);
            }
        }
        self.handle_state_entry(parent, child, params);
    }

    /// Enters `child` under `parent` and propagates completion when the
    /// entry finishes the parent.
    pub(crate) fn handle_state_entry(
        &mut self,
        parent: StateId,
        child: StateId,
        params: &TransitionParams<'_>,
    ) {
        let finishes = match self.node(parent).child_mode {
            ChildMode::Exclusive => matches!(self.node(child).kind, StateKind::Final),
            // Parallel parents finish through region completion instead.
            ChildMode::Parallel => false,
        };
        self.do_enter(child, params);
        self.machine_notify(|l| l.on_state_entry(child, params));
        if finishes {
            self.node_mut(parent).is_finished = true;
            self.notify_state_finish(parent, params);
            if let Some(grandparent) = self.node(parent).parent {
                self.after_child_finished(grandparent, params);
            }
        }
    }

    /// Called on the parent of a state that just finished. A PARALLEL parent
    /// finishes once every region has finished, and the check repeats up the
    /// tree.
    pub(crate) fn after_child_finished(&mut self, id: StateId, params: &TransitionParams<'_>) {
        let node = self.node(id);
        if node.child_mode != ChildMode::Parallel || node.is_finished || node.children.is_empty() {
            return;
        }
        let all_finished = node
            .children
            .iter()
            .all(|child| self.node(*child).is_finished);
        if !all_finished {
            return;
        }
        self.node_mut(id).is_finished = true;
        self.notify_state_finish(id, params);
        if let Some(parent) = self.node(id).parent {
            self.after_child_finished(parent, params);
        }
    }

    /// Notifies finish listeners and queues the synthetic finished event
    /// that lets other regions react to this state's completion.
    pub(crate) fn notify_state_finish(&mut self, id: StateId, params: &TransitionParams<'_>) {
        self.log_with(|| format!("{} finished", self.state_display(id)));
        self.state_notify(id, |l| l.on_finished(params));
        if id != self.root() {
            self.queued.push_back((
                Box::new(FinishedEvent { state: id }),
                params.argument.cloned(),
            ));
        }
    }

    /// Moves the active configuration from `source` to `target`.
    ///
    /// A self-targeting transition exits and re-enters the source. Otherwise
    /// the target-to-LCA path is entered top-down; exits of the abandoned
    /// branch happen inside the EXCLUSIVE switch at the divergence point.
    pub(crate) fn switch_to_target(
        &mut self,
        target: StateId,
        source: StateId,
        params: &TransitionParams<'_>,
    ) -> Result<(), MachineError> {
        if target == source {
            self.recursive_exit(source, params);
            match self.node(source).parent {
                Some(parent) => match self.node(parent).child_mode {
                    ChildMode::Exclusive => {
                        // The pointer still names the exited source; clear it
                        // so the switch re-enters instead of no-opping.
                        self.node_mut(parent).current = None;
                        self.set_current_state(parent, source, params);
                    }
                    ChildMode::Parallel => self.handle_state_entry(parent, source, params),
                },
                None => self.do_enter(source, params),
            }
            if self.node(source).kind.is_sub_machine() {
                return Ok(());
            }
            return self.recursive_enter_initial_states(source, params);
        }
        let (lca, mut path) = self.find_path_to_lca(source, target);
        self.recursive_enter_state_path(lca, &mut path, params)
    }

    /// Force-clears activation state top-down without running exit hooks.
    pub(crate) fn recursive_stop(&mut self, id: StateId) {
        self.node_mut(id).reset_runtime();
        for child in self.node(id).children.clone() {
            self.recursive_stop(child);
        }
    }
}
