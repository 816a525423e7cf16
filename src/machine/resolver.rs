//! Transition resolution over the active tree.
//!
//! Resolution walks depth-first from the active leaves towards the root:
//! within an active path the deepest state owning a matching transition
//! wins, overriding any ancestor's. Two matches in sibling PARALLEL regions,
//! or two matches on one state, are a fault rather than a silent pick.

use crate::core::event::EventAndArgument;
use crate::core::state::{ChildMode, StateId, StateKind};
use crate::core::transition::TransitionDirection;
use crate::machine::error::MachineError;
use crate::machine::Machine;

/// A transition picked for the current event, with its produced direction.
pub(crate) struct ResolvedTransition {
    pub(crate) source: StateId,
    pub(crate) index: usize,
    pub(crate) name: Option<String>,
    pub(crate) direction: TransitionDirection,
}

impl Machine {
    /// Resolves the unique transition for an event in the subtree rooted at
    /// `id`, preferring descendants over `id` itself.
    pub(crate) fn recursive_find_unique_resolved_transition(
        &self,
        id: StateId,
        ea: &EventAndArgument<'_>,
    ) -> Result<Option<ResolvedTransition>, MachineError> {
        let mut found = Vec::new();
        match self.node(id).child_mode {
            ChildMode::Exclusive => {
                if let Some(current) = self.node(id).current {
                    if let Some(resolved) =
                        self.recursive_find_unique_resolved_transition(current, ea)?
                    {
                        found.push(resolved);
                    }
                }
            }
            ChildMode::Parallel => {
                for child in &self.node(id).children {
                    if !self.node(*child).is_active {
                        continue;
                    }
                    if let Some(resolved) =
                        self.recursive_find_unique_resolved_transition(*child, ea)?
                    {
                        found.push(resolved);
                    }
                }
            }
        }
        match found.len() {
            0 => self.find_unique_resolved_transition(id, ea),
            1 => Ok(found.pop()),
            _ => Err(MachineError::AmbiguousTransitions {
                event: format!("{:?}", ea.event),
                state: self.state_display(id),
            }),
        }
    }

    /// Resolves among the transitions owned by `id` alone.
    fn find_unique_resolved_transition(
        &self,
        id: StateId,
        ea: &EventAndArgument<'_>,
    ) -> Result<Option<ResolvedTransition>, MachineError> {
        let mut matched = Vec::new();
        for (index, transition) in self.node(id).transitions.iter().enumerate() {
            if !transition.matches_event(ea.event) {
                continue;
            }
            let direction = transition.produce_direction(ea);
            if direction == TransitionDirection::NoTransition {
                continue;
            }
            matched.push(ResolvedTransition {
                source: id,
                index,
                name: transition.name.clone(),
                direction,
            });
        }
        match matched.len() {
            0 => Ok(None),
            1 => Ok(matched.pop()),
            _ => Err(MachineError::AmbiguousTransitions {
                event: format!("{:?}", ea.event),
                state: self.state_display(id),
            }),
        }
    }

    /// Follows pseudostates until a concrete target remains. Choice states
    /// run their resolver; history states restore their stored child,
    /// falling back to their default and then the region's initial state.
    pub(crate) fn resolve_target(
        &mut self,
        raw: StateId,
        ea: &EventAndArgument<'_>,
    ) -> Result<StateId, MachineError> {
        let mut id = raw;
        let mut hops = 0usize;
        loop {
            hops += 1;
            if hops > self.state_count() {
                return Err(MachineError::PseudostateLoop {
                    state: self.state_display(raw),
                });
            }
            let next = match &self.node(id).kind {
                StateKind::Choice(resolver) => {
                    let chosen = resolver(ea);
                    self.log_with(|| {
                        format!(
                            "choice {} resolved to {}",
                            self.state_display(id),
                            self.state_display(chosen)
                        )
                    });
                    chosen
                }
                StateKind::History { default, stored } => stored
                    .or(*default)
                    .or_else(|| {
                        self.node(id)
                            .parent
                            .and_then(|parent| self.node(parent).initial)
                    })
                    .ok_or_else(|| MachineError::UnresolvedHistory {
                        state: self.state_display(id),
                    })?,
                _ => return Ok(id),
            };
            id = next;
        }
    }

    /// Finds the lowest common ancestor of `source` and `target` and the
    /// path from the LCA down to the target. The path excludes the LCA and
    /// is ordered so that popping yields the next state to enter.
    pub(crate) fn find_path_to_lca(
        &self,
        source: StateId,
        target: StateId,
    ) -> (StateId, Vec<StateId>) {
        let mut path = Vec::new();
        let mut up_source = source;
        let mut up_target = target;
        let mut source_depth = self.depth(up_source);
        let mut target_depth = self.depth(up_target);
        while source_depth > target_depth {
            up_source = self.node(up_source).parent.expect("depth accounted for parent");
            source_depth -= 1;
        }
        while target_depth > source_depth {
            path.push(up_target);
            up_target = self.node(up_target).parent.expect("depth accounted for parent");
            target_depth -= 1;
        }
        while up_source != up_target {
            path.push(up_target);
            up_source = self
                .node(up_source)
                .parent
                .expect("distinct roots in one tree");
            up_target = self
                .node(up_target)
                .parent
                .expect("distinct roots in one tree");
        }
        (up_target, path)
    }

    fn depth(&self, mut id: StateId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.node(id).parent {
            id = parent;
            depth += 1;
        }
        depth
    }
}
