//! Summary-time resolution of ANYTHING placeholders.
//!
//! When a callee summary is spliced into a caller, callee-side ANYTHING
//! states whose source is one of the callee's own parameters must be
//! replaced by the caller's concrete argument states. Substitutions that
//! are self-referential (`p.f = p.g`) or sit on a reference cycle are not
//! resolved in place: they are queued as deferred updates and flushed in one
//! final pass after every parameter of the call has been bound, so
//! cross-parameter dependencies resolve deterministically.

use rustc_hash::{FxHashMap, FxHashSet};

use super::states::Resolver;
use crate::features::engine::frame::ComputeFrame;
use crate::features::state_space::{AccessPoint, StateKind};
use crate::shared::models::{StmtId, SymbolId};

/// Where a deferred substitution lands once it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTarget {
    /// A field set of a state in the caller's arena.
    StateField { state_index: usize, field: String },
    /// The final state set of a bound parameter.
    CalleeParam { symbol_id: SymbolId },
    /// The callee's return-state set.
    CalleeReturn,
    /// The final state set of an external symbol the callee touched.
    CalleeExternal { symbol_id: SymbolId },
}

/// One queued substitution: drill `access_path` into the final states of
/// `source_param` and write the result into `target`, dropping the
/// placeholder on the way.
#[derive(Debug, Clone)]
pub struct DeferredIndexUpdate {
    pub source_param: SymbolId,
    pub access_path: Vec<AccessPoint>,
    pub target: DeferredTarget,
    pub placeholder_index: Option<usize>,
}

/// What resolving one placeholder produced immediately.
#[derive(Debug)]
pub enum AnythingOutcome {
    /// Concrete replacement states found in the caller.
    Resolved(FxHashSet<usize>),
    /// A rebuilt state with resolved children.
    NewState(usize),
    /// Queued for the final pass; drop the placeholder now.
    Deferred,
    /// Nothing to do; keep the placeholder.
    Unchanged,
}

/// One resolution pass over a single call's summary application. The
/// in-progress set and result cache are explicit pass state, not hidden
/// globals, so concurrent calls in one caller cannot bleed into each other.
#[derive(Debug, Default)]
pub struct AnythingResolution {
    processing: FxHashSet<usize>,
    cache: FxHashMap<usize, usize>,
    pub deferred: Vec<DeferredIndexUpdate>,
}

impl AnythingResolution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve one ANYTHING placeholder found in a callee summary.
    ///
    /// `param_symbol_ids` are the callee's formals; `current_param` is the
    /// formal whose final states are being assembled (or a negative id when
    /// resolving return/external entries).
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_anything(
        &mut self,
        resolver: &Resolver<'_>,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        state_index: usize,
        param_symbol_ids: &FxHashSet<SymbolId>,
        current_param: SymbolId,
        target: DeferredTarget,
    ) -> AnythingOutcome {
        let Some(state) = frame.space.state(state_index).cloned() else {
            return AnythingOutcome::Unchanged;
        };
        let source = state.source_symbol_id;

        if resolver.db.is_class_decl(source) || resolver.db.is_method_decl(source) {
            return AnythingOutcome::Unchanged;
        }

        if param_symbol_ids.contains(&source) {
            if source != current_param {
                // cross-parameter reference: only the final pass can see the
                // other parameter's bound states
                self.deferred.push(DeferredIndexUpdate {
                    source_param: source,
                    access_path: state.access_path.clone(),
                    target,
                    placeholder_index: Some(state_index),
                });
                return AnythingOutcome::Deferred;
            }
            // self-referential: p.f = p.g, p.f = p, or a cycle through p
            return self.resolve_anything_with_same_source(
                resolver,
                frame,
                stmt_id,
                state_index,
                param_symbol_ids,
                current_param,
                target,
            );
        }

        // external to the call: resolve against the caller's own values
        let sources = if frame.symbol_to_define.contains_key(&source) {
            resolver.get_latest_source_state_indexes(frame, source)
        } else {
            FxHashSet::default()
        };
        let accessed = Resolver::get_state_from_path(&frame.space, &state.access_path, &sources);
        if accessed.is_empty() {
            AnythingOutcome::Unchanged
        } else {
            AnythingOutcome::Resolved(accessed)
        }
    }

    /// Handle a placeholder whose source is the parameter currently being
    /// bound. Childless or root-level placeholders cannot resolve until the
    /// parameter itself is final, so they defer; composites are rebuilt
    /// field by field, deferring cyclic children.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_anything_with_same_source(
        &mut self,
        resolver: &Resolver<'_>,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        state_index: usize,
        param_symbol_ids: &FxHashSet<SymbolId>,
        current_param: SymbolId,
        target: DeferredTarget,
    ) -> AnythingOutcome {
        if let Some(&done) = self.cache.get(&state_index) {
            return if done == state_index {
                AnythingOutcome::Unchanged
            } else {
                AnythingOutcome::NewState(done)
            };
        }
        let Some(state) = frame.space.state(state_index).cloned() else {
            return AnythingOutcome::Unchanged;
        };

        if self.processing.contains(&state_index)
            || state.fields.is_empty()
            || state.access_path.len() <= 1
        {
            self.deferred.push(DeferredIndexUpdate {
                source_param: current_param,
                access_path: state.access_path.clone(),
                target,
                placeholder_index: Some(state_index),
            });
            return AnythingOutcome::Deferred;
        }
        self.processing.insert(state_index);

        let created_index = frame.space.add_state(state.copy_at(stmt_id));
        let mut changed = false;

        for (field_name, children) in state.fields.clone() {
            for child_index in children {
                let Some(child) = frame.space.state(child_index).cloned() else {
                    continue;
                };
                if child.kind != StateKind::Anything {
                    continue;
                }
                let child_target = DeferredTarget::StateField {
                    state_index: created_index,
                    field: field_name.clone(),
                };
                let outcome = if child.source_symbol_id != current_param {
                    self.resolve_anything(
                        resolver,
                        frame,
                        stmt_id,
                        child_index,
                        param_symbol_ids,
                        current_param,
                        child_target,
                    )
                } else {
                    self.resolve_anything_with_same_source(
                        resolver,
                        frame,
                        stmt_id,
                        child_index,
                        param_symbol_ids,
                        current_param,
                        child_target,
                    )
                };
                match outcome {
                    AnythingOutcome::Resolved(replacements) => {
                        changed = true;
                        if let Some(created) = frame.space.state_mut(created_index) {
                            if let Some(set) = created.fields.get_mut(&field_name) {
                                set.remove(&child_index);
                                set.extend(replacements.iter().copied());
                            }
                        }
                    }
                    AnythingOutcome::NewState(new_child) => {
                        changed = true;
                        if let Some(created) = frame.space.state_mut(created_index) {
                            if let Some(set) = created.fields.get_mut(&field_name) {
                                set.remove(&child_index);
                                set.insert(new_child);
                            }
                        }
                    }
                    AnythingOutcome::Deferred => {
                        changed = true;
                        if let Some(created) = frame.space.state_mut(created_index) {
                            if let Some(set) = created.fields.get_mut(&field_name) {
                                set.remove(&child_index);
                            }
                        }
                    }
                    AnythingOutcome::Unchanged => {}
                }
            }
        }

        self.processing.remove(&state_index);
        if changed {
            if let Some(created) = frame.space.state_mut(created_index) {
                created.kind = StateKind::Regular;
            }
            self.cache.insert(state_index, created_index);
            AnythingOutcome::NewState(created_index)
        } else {
            self.cache.insert(state_index, state_index);
            AnythingOutcome::Unchanged
        }
    }

    /// The final pass: with every parameter of the call bound, drill each
    /// deferred access path into the recorded final states and hand back
    /// what lands where. `StateField` targets are applied to the frame
    /// directly; the caller applies the summary-level targets.
    pub fn flush_deferred(
        &mut self,
        frame: &mut ComputeFrame,
        param_final_states: &FxHashMap<SymbolId, FxHashSet<usize>>,
    ) -> Vec<(DeferredTarget, FxHashSet<usize>, Option<usize>)> {
        let mut remaining = Vec::new();
        for update in self.deferred.drain(..) {
            let Some(roots) = param_final_states.get(&update.source_param) else {
                continue;
            };
            let resolved =
                Resolver::get_state_from_path(&frame.space, &update.access_path, roots);
            if resolved.is_empty() {
                continue;
            }
            match update.target {
                DeferredTarget::StateField { state_index, field } => {
                    if let Some(state) = frame.space.state_mut(state_index) {
                        let set = state.fields.entry(field).or_default();
                        if let Some(placeholder) = update.placeholder_index {
                            set.remove(&placeholder);
                        }
                        set.extend(resolved.iter().copied());
                    }
                }
                target => remaining.push((target, resolved, update.placeholder_index)),
            }
        }
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engine::frame::ComputeFrame;
    use crate::features::loader::MemoryProgramDb;
    use crate::features::state_space::{AccessPoint, State, StateValue};
    use crate::shared::models::ConstValue;
    use rustc_hash::FxHashSet;

    const PARAM: i64 = 7;

    fn anything_node(frame: &mut ComputeFrame, state_id: i64, step: &str) -> usize {
        let state = State::new(10, state_id)
            .with_kind(StateKind::Anything)
            .with_source_symbol(PARAM)
            .with_access_path(vec![
                AccessPoint::top_level("p", 90),
                AccessPoint::field(step, state_id),
            ]);
        frame.space.add_state(state)
    }

    fn link(frame: &mut ComputeFrame, parent: usize, field: &str, child: usize) {
        frame.space.state_mut(parent).unwrap().add_field(field, child);
    }

    fn param_ids() -> FxHashSet<i64> {
        let mut set = FxHashSet::default();
        set.insert(PARAM);
        set
    }

    #[test]
    fn test_two_node_cycle_terminates_and_defers() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let p1 = anything_node(&mut frame, 101, "f");
        let p2 = anything_node(&mut frame, 102, "g");
        link(&mut frame, p1, "f", p2);
        link(&mut frame, p2, "g", p1);

        let mut resolution = AnythingResolution::new();
        let outcome = resolution.resolve_anything_with_same_source(
            &resolver,
            &mut frame,
            20,
            p1,
            &param_ids(),
            PARAM,
            DeferredTarget::CalleeParam { symbol_id: PARAM },
        );

        let AnythingOutcome::NewState(rebuilt) = outcome else {
            panic!("expected a rebuilt state, got {outcome:?}");
        };
        // the inner back-reference went onto the deferred queue instead of
        // recursing forever
        assert_eq!(resolution.deferred.len(), 1);
        assert_eq!(resolution.deferred[0].source_param, PARAM);
        let rebuilt_state = frame.space.state(rebuilt).unwrap();
        assert_eq!(rebuilt_state.kind, StateKind::Regular);
        assert!(!rebuilt_state.fields["f"].contains(&p2));
    }

    #[test]
    fn test_three_node_cycle_terminates_and_defers() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let p1 = anything_node(&mut frame, 101, "f");
        let p2 = anything_node(&mut frame, 102, "g");
        let p3 = anything_node(&mut frame, 103, "h");
        link(&mut frame, p1, "f", p2);
        link(&mut frame, p2, "g", p3);
        link(&mut frame, p3, "h", p1);

        let mut resolution = AnythingResolution::new();
        let outcome = resolution.resolve_anything_with_same_source(
            &resolver,
            &mut frame,
            20,
            p1,
            &param_ids(),
            PARAM,
            DeferredTarget::CalleeParam { symbol_id: PARAM },
        );

        assert!(matches!(outcome, AnythingOutcome::NewState(_)));
        assert_eq!(resolution.deferred.len(), 1);
    }

    #[test]
    fn test_flush_deferred_drills_into_bound_parameter() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let p1 = anything_node(&mut frame, 101, "f");
        let p2 = anything_node(&mut frame, 102, "g");
        link(&mut frame, p1, "f", p2);
        link(&mut frame, p2, "g", p1);

        let mut resolution = AnythingResolution::new();
        let outcome = resolution.resolve_anything_with_same_source(
            &resolver,
            &mut frame,
            20,
            p1,
            &param_ids(),
            PARAM,
            DeferredTarget::CalleeParam { symbol_id: PARAM },
        );
        let AnythingOutcome::NewState(rebuilt) = outcome else {
            panic!("expected a rebuilt state");
        };
        let inner = *frame.space.state(rebuilt).unwrap().fields["f"]
            .iter()
            .next()
            .unwrap();

        // the bound value of the parameter: a record with p.f = 5
        let leaf = frame
            .space
            .add_state(State::new(1, 200).with_value(StateValue::Const(ConstValue::Int(5))));
        let mut root = State::new(1, 201);
        root.add_field("f", leaf);
        let root_index = frame.space.add_state(root);

        let mut param_final = FxHashMap::default();
        let mut roots = FxHashSet::default();
        roots.insert(root_index);
        param_final.insert(PARAM, roots);

        let remaining = resolution.flush_deferred(&mut frame, &param_final);
        // the deferred update targeted a state field; it was applied in place
        assert!(remaining.is_empty());
        let inner_state = frame.space.state(inner).unwrap();
        assert!(inner_state.fields["g"].contains(&leaf));
    }
}
