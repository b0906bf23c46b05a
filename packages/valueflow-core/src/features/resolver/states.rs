//! State retrieval, aliasing, and cross-frame resolution.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::config::{IdAllocator, BUILTIN_THIS_SYMBOL_ID};
use crate::features::bitvector::StateDefNode;
use crate::features::engine::frame::ComputeFrame;
use crate::features::loader::{ArtifactStore, ProgramDb};
use crate::features::state_space::{
    AccessPoint, AccessStep, SpaceItem, State, StateKind, StateValue, SymbolStateSpace,
};
use crate::features::summary::CallSiteKey;
use crate::shared::models::{StateId, StmtId, SymbolId};

/// State-resolution half of the resolver; one instance serves both phases.
pub struct Resolver<'a> {
    pub db: &'a dyn ProgramDb,
}

/// What inferring an argument for a formal parameter produced.
pub enum InferOutcome {
    /// Keep walking outward, now chasing this symbol id.
    Redirect(SymbolId),
    /// A standalone space holding the argument's states.
    States {
        space: SymbolStateSpace,
        indexes: FxHashSet<usize>,
    },
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a dyn ProgramDb) -> Self {
        Self { db }
    }

    /// Translate each index to the live version sharing its `state_id`.
    ///
    /// Indices at or above `old_ceiling` were created by the statement being
    /// computed and are kept as-is; everything else goes through the
    /// reaching-state-definition set, falling back to itself when no live
    /// redefinition exists.
    pub fn collect_newest_states_by_indexes(
        &self,
        frame: &ComputeFrame,
        indices: &FxHashSet<usize>,
        available_state_defs: &FxHashSet<StateDefNode>,
        old_ceiling: Option<usize>,
    ) -> FxHashSet<usize> {
        let mut result = FxHashSet::default();
        for &index in indices {
            if let Some(ceiling) = old_ceiling {
                if index >= ceiling {
                    result.insert(index);
                    continue;
                }
            }
            let Some(state_id) = frame.space.state_id_of(index) else {
                result.insert(index);
                continue;
            };
            match frame.state_to_define.get(&state_id) {
                Some(defs) => {
                    let live: Vec<&StateDefNode> =
                        defs.intersection(available_state_defs).collect();
                    if live.is_empty() {
                        result.insert(index);
                    } else {
                        result.extend(live.into_iter().map(|d| d.index));
                    }
                }
                None => {
                    result.insert(index);
                }
            }
        }
        result
    }

    /// Live indices of the given identity groups.
    pub fn collect_newest_states_by_state_ids(
        &self,
        frame: &ComputeFrame,
        available_state_defs: &FxHashSet<StateDefNode>,
        state_ids: &FxHashSet<StateId>,
    ) -> FxHashSet<usize> {
        let mut result = FxHashSet::default();
        for state_id in state_ids {
            if let Some(defs) = frame.state_to_define.get(state_id) {
                for def in defs.intersection(available_state_defs) {
                    result.insert(def.index);
                }
            }
        }
        result
    }

    /// Structural parent's identity, recovered from the access path.
    pub fn obtain_parent_state_id(
        &self,
        frame: &ComputeFrame,
        base_index: usize,
    ) -> Option<StateId> {
        frame.space.state(base_index)?.parent_state_id()
    }

    /// Live versions of the structural parent of `base_index` at `stmt_id`.
    pub fn obtain_parent_states(
        &self,
        frame: &ComputeFrame,
        stmt_id: StmtId,
        base_index: usize,
    ) -> FxHashSet<usize> {
        let Some(parent_id) = self.obtain_parent_state_id(frame, base_index) else {
            return FxHashSet::default();
        };
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return FxHashSet::default();
        };
        let available = frame.state_bits.explain(&status.in_state_bits);
        let mut ids = FxHashSet::default();
        ids.insert(parent_id);
        self.collect_newest_states_by_state_ids(frame, &available, &ids)
    }

    /// Rewrite each state and all of its children to their newest versions,
    /// creating a new version only when at least one child actually changed.
    ///
    /// `memo` guarantees linear work and breaks reference cycles: an index
    /// in progress resolves to its provisional entry instead of recursing.
    pub fn retrieve_latest_states(
        &self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        indices: &FxHashSet<usize>,
        available_state_defs: &FxHashSet<StateDefNode>,
        memo: &mut FxHashMap<usize, FxHashSet<usize>>,
    ) -> FxHashSet<usize> {
        let mut result = FxHashSet::default();
        for &index in indices {
            if let Some(done) = memo.get(&index) {
                result.extend(done.iter().copied());
                continue;
            }
            let mut single = FxHashSet::default();
            single.insert(index);
            let newest = self.collect_newest_states_by_indexes(
                frame,
                &single,
                available_state_defs,
                None,
            );
            for newest_index in newest {
                if let Some(done) = memo.get(&newest_index) {
                    let done = done.clone();
                    memo.entry(index).or_default().extend(done.iter().copied());
                    result.extend(done);
                    continue;
                }
                let Some(state) = frame.space.state(newest_index).cloned() else {
                    continue;
                };
                if !state.has_children() {
                    memo.entry(index).or_default().insert(newest_index);
                    memo.entry(newest_index).or_default().insert(newest_index);
                    result.insert(newest_index);
                    continue;
                }

                // provisional: a cycle back to this index sees the old version
                memo.entry(newest_index).or_default().insert(newest_index);

                let mut changed = false;
                let mut new_fields = state.fields.clone();
                for (name, children) in &state.fields {
                    let latest = self.retrieve_latest_states(
                        frame,
                        stmt_id,
                        children,
                        available_state_defs,
                        memo,
                    );
                    if latest != *children {
                        changed = true;
                    }
                    new_fields.insert(name.clone(), latest);
                }
                let mut new_array = Vec::with_capacity(state.array.len());
                for children in &state.array {
                    let latest = self.retrieve_latest_states(
                        frame,
                        stmt_id,
                        children,
                        available_state_defs,
                        memo,
                    );
                    if latest != *children {
                        changed = true;
                    }
                    new_array.push(latest);
                }
                let new_collapsed = self.retrieve_latest_states(
                    frame,
                    stmt_id,
                    &state.collapsed_elements,
                    available_state_defs,
                    memo,
                );
                if new_collapsed != state.collapsed_elements {
                    changed = true;
                }

                let final_index = if changed {
                    let mut updated = state.copy_at(stmt_id);
                    updated.fields = new_fields;
                    updated.array = new_array;
                    updated.collapsed_elements = new_collapsed;
                    frame.space.add_state(updated)
                } else {
                    newest_index
                };
                memo.entry(index).or_default().insert(final_index);
                memo.entry(newest_index).or_default().insert(final_index);
                result.insert(final_index);
            }
        }
        result
    }

    /// All live states the given symbol id can flow to the frame's current
    /// statement, rewritten to their newest versions.
    pub fn get_latest_source_state_indexes(
        &self,
        frame: &mut ComputeFrame,
        symbol_id: SymbolId,
    ) -> FxHashSet<usize> {
        let Some(stmt_id) = frame.current_stmt_id() else {
            return FxHashSet::default();
        };
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return FxHashSet::default();
        };
        let available_symbol_defs = frame.symbol_bits.explain(&status.in_symbol_bits);
        let Some(defs) = frame.symbol_to_define.get(&symbol_id) else {
            return FxHashSet::default();
        };
        let reachable: Vec<_> = defs.intersection(&available_symbol_defs).copied().collect();
        if reachable.is_empty() {
            return FxHashSet::default();
        }
        let available_state_defs = frame.state_bits.explain(&status.in_state_bits);

        let mut source_indexes = FxHashSet::default();
        for def in reachable {
            if def.is_external() {
                continue;
            }
            let Some(symbol) = frame.space.symbol(def.index) else {
                continue;
            };
            let mut concrete = FxHashSet::default();
            for &state_index in &symbol.states {
                if let Some(state) = frame.space.state(state_index) {
                    if state.kind != StateKind::Anything {
                        concrete.insert(state_index);
                    }
                }
            }
            source_indexes.extend(self.collect_newest_states_by_indexes(
                frame,
                &concrete,
                &available_state_defs,
                None,
            ));
        }
        if source_indexes.is_empty() {
            return FxHashSet::default();
        }
        let mut memo = FxHashMap::default();
        self.retrieve_latest_states(frame, stmt_id, &source_indexes, &available_state_defs, &mut memo)
    }

    /// Drill an access path into a set of states, expanding symbols to
    /// their states at every step.
    pub fn get_state_from_path(
        space: &SymbolStateSpace,
        access_path: &[AccessPoint],
        sources: &FxHashSet<usize>,
    ) -> FxHashSet<usize> {
        if access_path.is_empty() {
            return sources.clone();
        }

        let mut current = sources.clone();
        for point in access_path {
            let mut next = FxHashSet::default();
            for &source_index in &current {
                let states: Vec<usize> = match space.get(source_index) {
                    Some(SpaceItem::Symbol(symbol)) => symbol.states.iter().copied().collect(),
                    Some(SpaceItem::State(_)) => vec![source_index],
                    None => continue,
                };
                for state_index in states {
                    let Some(state) = space.state(state_index) else {
                        continue;
                    };
                    match &point.step {
                        AccessStep::Field { name } => {
                            if let Some(children) = state.fields.get(name) {
                                next.extend(children.iter().copied());
                            } else if state.collapsed {
                                next.extend(state.collapsed_elements.iter().copied());
                            }
                        }
                        AccessStep::ArraySlot { index } => {
                            if let Some(children) = state.array.get(*index) {
                                next.extend(children.iter().copied());
                            } else if state.collapsed {
                                next.extend(state.collapsed_elements.iter().copied());
                            }
                        }
                        AccessStep::TopLevel { .. } => {
                            next.insert(state_index);
                        }
                    }
                }
            }
            // expand symbols reached through children
            let mut expanded = FxHashSet::default();
            for index in next {
                match space.get(index) {
                    Some(SpaceItem::Symbol(symbol)) => {
                        expanded.extend(symbol.states.iter().copied())
                    }
                    _ => {
                        expanded.insert(index);
                    }
                }
            }
            current = expanded;
        }
        current
    }

    /// Resolve the implicit receiver of the call the caller frame is parked
    /// on: the parents of the callee-name states. Returns a standalone space
    /// plus the receiver indices within it.
    pub fn get_this_state(
        &self,
        caller: &ComputeFrame,
    ) -> Option<(SymbolStateSpace, FxHashSet<usize>)> {
        let call_stmt_id = caller.current_stmt_id()?;
        let status = caller.statuses.get(&call_stmt_id)?;
        let &name_index = status.used_symbols.first()?;
        let name_symbol = caller.space.symbol(name_index)?;

        let mut receiver_set = FxHashSet::default();
        for &state_index in &name_symbol.states {
            receiver_set.extend(self.obtain_parent_states(caller, call_stmt_id, state_index));
        }
        if receiver_set.is_empty() {
            return None;
        }
        let extracted = caller.space.extract(&receiver_set);
        let indexes = receiver_set
            .iter()
            .map(|i| extracted.map_index(*i))
            .collect();
        Some((extracted.space, indexes))
    }

    /// Map a formal parameter back to the caller's actual argument.
    ///
    /// Packed parameters project through the recorded access point; default
    /// bindings redirect to the default-value symbol; symbol-valued
    /// arguments redirect the outward walk to the argument's source symbol.
    pub fn infer_arg_from_parameter(
        &self,
        store: &ArtifactStore,
        caller: &ComputeFrame,
        call_site: CallSiteKey,
        param_symbol_id: SymbolId,
        access_path: &mut Vec<AccessPoint>,
        ids: &mut IdAllocator,
    ) -> InferOutcome {
        let Some(mappings) = store.parameter_mappings(call_site) else {
            return InferOutcome::Redirect(param_symbol_id);
        };

        let mut packed_fields: FxHashMap<String, FxHashSet<usize>> = FxHashMap::default();
        let mut packed_array: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
        let mut direct_states: FxHashSet<usize> = FxHashSet::default();

        for mapping in mappings {
            if mapping.parameter_symbol_id != param_symbol_id {
                continue;
            }
            if mapping.is_default_value {
                return InferOutcome::Redirect(mapping.arg_source_symbol_id);
            }
            if mapping.arg_source_symbol_id < 0 {
                // the argument is a plain state, not a named value
                match &mapping.parameter_access_point {
                    Some(AccessPoint {
                        step: AccessStep::ArraySlot { index },
                        ..
                    }) => {
                        packed_array
                            .entry(*index)
                            .or_default()
                            .insert(mapping.arg_index_in_space);
                    }
                    Some(AccessPoint {
                        step: AccessStep::Field { name },
                        ..
                    }) => {
                        packed_fields
                            .entry(name.clone())
                            .or_default()
                            .insert(mapping.arg_index_in_space);
                    }
                    _ => {
                        direct_states.insert(mapping.arg_index_in_space);
                    }
                }
                continue;
            }
            if !caller
                .symbol_to_define
                .contains_key(&mapping.arg_source_symbol_id)
            {
                // defined even further out; keep walking
                return InferOutcome::Redirect(mapping.arg_source_symbol_id);
            }
            if let Some(point) = &mapping.parameter_access_point {
                // packed parameter: the leading projection step is consumed
                if let Some(pos) = access_path.iter().position(|p| p.step == point.step) {
                    access_path.remove(pos);
                }
            }
            let mut joined = mapping.arg_access_path.clone();
            joined.append(access_path);
            *access_path = joined;
            return InferOutcome::Redirect(mapping.arg_source_symbol_id);
        }

        if !packed_fields.is_empty() || !packed_array.is_empty() {
            let mut children = FxHashSet::default();
            for set in packed_fields.values() {
                children.extend(set.iter().copied());
            }
            for set in packed_array.values() {
                children.extend(set.iter().copied());
            }
            let extracted = caller.space.extract(&children);
            let mut packed = State::new(call_site.1, ids.state_id())
                .with_source_symbol(param_symbol_id);
            for (name, set) in packed_fields {
                packed.fields.insert(
                    name,
                    set.iter().map(|i| extracted.map_index(*i)).collect(),
                );
            }
            for (slot, set) in packed_array {
                packed.set_array_slot(
                    slot,
                    set.iter().map(|i| extracted.map_index(*i)).collect(),
                );
            }
            let mut space = extracted.space;
            let index = space.add_state(packed);
            let mut indexes = FxHashSet::default();
            indexes.insert(index);
            return InferOutcome::States { space, indexes };
        }

        if !direct_states.is_empty() {
            let extracted = caller.space.extract(&direct_states);
            let indexes = direct_states
                .iter()
                .map(|i| extracted.map_index(*i))
                .collect();
            return InferOutcome::States {
                space: extracted.space,
                indexes,
            };
        }

        InferOutcome::Redirect(param_symbol_id)
    }

    /// Resolve a state standing in for "whatever symbol X holds" against
    /// the frame stack: walk outward to the defining frame (binding formals
    /// to actuals on the way), drill the access path into the resolved
    /// value, and splice the result into the top frame's arena.
    pub fn resolve_symbol_states(
        &self,
        store: &ArtifactStore,
        ids: &mut IdAllocator,
        frames: &mut [ComputeFrame],
        stmt_id: StmtId,
        state: &State,
    ) -> FxHashSet<usize> {
        let len = frames.len();
        if len == 0 {
            return FxHashSet::default();
        }
        let mut state_symbol_id = state.source_symbol_id;
        let mut access_path = state.access_path.clone();
        let is_this = state.data_type == crate::features::def_use::THIS_NAME
            || state_symbol_id == BUILTIN_THIS_SYMBOL_ID;

        trace!(state_symbol_id, "resolve_symbol_states");

        let mut found: Option<(SymbolStateSpace, FxHashSet<usize>)> = None;
        for i in (0..len).rev() {
            if frames[i].current_stmt_id().is_none() {
                continue;
            }

            if is_this {
                if i == 0 {
                    break;
                }
                found = self.get_this_state(&frames[i - 1]);
                if found.is_some() {
                    break;
                }
                continue;
            }

            if self.db.is_method_decl(state_symbol_id) {
                let index = frames[len - 1].space.add_state(
                    State::new(stmt_id, ids.state_id())
                        .with_value(StateValue::MethodRef(state_symbol_id))
                        .with_source_symbol(state_symbol_id),
                );
                let mut result = FxHashSet::default();
                result.insert(index);
                return result;
            }
            if self.db.is_class_decl(state_symbol_id) {
                let index = frames[len - 1].space.add_state(
                    State::new(stmt_id, ids.state_id())
                        .with_value(StateValue::ClassRef(state_symbol_id))
                        .with_source_symbol(state_symbol_id),
                );
                let mut result = FxHashSet::default();
                result.insert(index);
                return result;
            }

            if !frames[i].symbol_to_define.contains_key(&state_symbol_id) {
                continue;
            }

            if i > 0 && self.db.is_parameter_decl_of(state_symbol_id, frames[i].method_id) {
                let call_site = frames[i].call_site();
                let outcome = self.infer_arg_from_parameter(
                    store,
                    &frames[i - 1],
                    call_site,
                    state_symbol_id,
                    &mut access_path,
                    ids,
                );
                match outcome {
                    InferOutcome::States { space, indexes } => {
                        found = Some((space, indexes));
                        break;
                    }
                    InferOutcome::Redirect(next_symbol) => {
                        state_symbol_id = next_symbol;
                        continue;
                    }
                }
            }

            let latest = self.get_latest_source_state_indexes(&mut frames[i], state_symbol_id);
            if latest.is_empty() {
                continue;
            }
            let extracted = frames[i].space.extract(&latest);
            let indexes = latest.iter().map(|l| extracted.map_index(*l)).collect();
            found = Some((extracted.space, indexes));
            break;
        }

        let Some((sub_space, sources)) = found else {
            return FxHashSet::default();
        };
        let accessed = Self::get_state_from_path(&sub_space, &access_path, &sources);
        if accessed.is_empty() {
            return FxHashSet::default();
        }
        let extracted = sub_space.extract(&accessed);
        let top = &mut frames[len - 1];
        let appended = top.space.append_space_copy(&extracted.space);
        accessed
            .iter()
            .map(|a| appended[&extracted.map_index(*a)])
            .collect()
    }

    /// Structural equality: recursive over fields/array children, literal
    /// equality at leaves. Used to deduplicate fused states.
    pub fn are_states_identical(
        space1: &SymbolStateSpace,
        index1: usize,
        space2: &SymbolStateSpace,
        index2: usize,
    ) -> bool {
        let mut visited = FxHashSet::default();
        Self::states_identical_inner(space1, index1, space2, index2, &mut visited)
    }

    fn states_identical_inner(
        space1: &SymbolStateSpace,
        index1: usize,
        space2: &SymbolStateSpace,
        index2: usize,
        visited: &mut FxHashSet<(usize, usize)>,
    ) -> bool {
        if !visited.insert((index1, index2)) {
            // a revisited pair is identical as far as this path can tell
            return true;
        }
        let (Some(a), Some(b)) = (space1.state(index1), space2.state(index2)) else {
            return false;
        };

        if !a.array.is_empty() || !b.array.is_empty() {
            if a.array.len() != b.array.len() {
                return false;
            }
            for (group1, group2) in a.array.iter().zip(b.array.iter()) {
                if group1.len() != group2.len() {
                    return false;
                }
                let mut sorted1: Vec<usize> = group1.iter().copied().collect();
                let mut sorted2: Vec<usize> = group2.iter().copied().collect();
                sorted1.sort_unstable();
                sorted2.sort_unstable();
                for (c1, c2) in sorted1.into_iter().zip(sorted2) {
                    if !Self::states_identical_inner(space1, c1, space2, c2, visited) {
                        return false;
                    }
                }
            }
            return true;
        }

        if !a.fields.is_empty() || !b.fields.is_empty() {
            if a.fields.len() != b.fields.len() {
                return false;
            }
            let mut keys1: Vec<&String> = a.fields.keys().collect();
            let mut keys2: Vec<&String> = b.fields.keys().collect();
            keys1.sort();
            keys2.sort();
            for (k1, k2) in keys1.into_iter().zip(keys2) {
                if k1 != k2 {
                    return false;
                }
                let group1 = &a.fields[k1];
                let group2 = &b.fields[k2];
                if group1.len() != group2.len() {
                    return false;
                }
                let mut sorted1: Vec<usize> = group1.iter().copied().collect();
                let mut sorted2: Vec<usize> = group2.iter().copied().collect();
                sorted1.sort_unstable();
                sorted2.sort_unstable();
                for (c1, c2) in sorted1.into_iter().zip(sorted2) {
                    if !Self::states_identical_inner(space1, c1, space2, c2, visited) {
                        return false;
                    }
                }
            }
            return true;
        }

        a.value == b.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::loader::MemoryProgramDb;
    use crate::features::summary::ParameterMapping;
    use crate::shared::models::ConstValue;

    fn literal(frame: &mut ComputeFrame, stmt_id: i64, state_id: i64, v: i64) -> usize {
        let state =
            State::new(stmt_id, state_id).with_value(StateValue::Const(ConstValue::Int(v)));
        let index = frame.space.add_state(state);
        frame
            .state_to_define
            .entry(state_id)
            .or_default()
            .insert(StateDefNode::new(index, state_id, stmt_id));
        index
    }

    fn composite(
        frame: &mut ComputeFrame,
        stmt_id: i64,
        state_id: i64,
        field: &str,
        child: usize,
    ) -> usize {
        let mut state = State::new(stmt_id, state_id);
        state.add_field(field, child);
        let index = frame.space.add_state(state);
        frame
            .state_to_define
            .entry(state_id)
            .or_default()
            .insert(StateDefNode::new(index, state_id, stmt_id));
        index
    }

    fn all_defs(frame: &ComputeFrame) -> FxHashSet<StateDefNode> {
        frame
            .state_to_define
            .values()
            .flat_map(|defs| defs.iter().copied())
            .collect()
    }

    #[test]
    fn test_collect_newest_translates_to_live_version() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let old = literal(&mut frame, 10, 100, 1);
        let newer = literal(&mut frame, 11, 100, 2);

        // only the redefinition is live
        let mut available = FxHashSet::default();
        available.insert(StateDefNode::new(newer, 100, 11));

        let mut input = FxHashSet::default();
        input.insert(old);
        let result =
            resolver.collect_newest_states_by_indexes(&frame, &input, &available, None);
        assert!(result.contains(&newer));
        assert!(!result.contains(&old));
    }

    #[test]
    fn test_collect_newest_falls_back_when_nothing_is_live() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let index = literal(&mut frame, 10, 100, 1);

        let mut input = FxHashSet::default();
        input.insert(index);
        let result = resolver.collect_newest_states_by_indexes(
            &frame,
            &input,
            &FxHashSet::default(),
            None,
        );
        assert!(result.contains(&index));
    }

    #[test]
    fn test_retrieve_latest_is_idempotent_on_latest_input() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let leaf = literal(&mut frame, 10, 100, 1);
        let parent = composite(&mut frame, 10, 101, "x", leaf);
        let available = all_defs(&frame);

        let mut input = FxHashSet::default();
        input.insert(parent);
        let mut memo = FxHashMap::default();
        let first = resolver.retrieve_latest_states(&mut frame, 11, &input, &available, &mut memo);
        assert_eq!(first, input);

        let len_before = frame.space.len();
        let mut memo = FxHashMap::default();
        let second = resolver.retrieve_latest_states(&mut frame, 11, &first, &available, &mut memo);
        assert_eq!(second, first);
        // no new versions minted when nothing changed
        assert_eq!(frame.space.len(), len_before);
    }

    #[test]
    fn test_retrieve_latest_rewrites_stale_children() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut frame = ComputeFrame::new(1, -1, -1);
        let stale = literal(&mut frame, 10, 100, 1);
        let parent = composite(&mut frame, 10, 101, "x", stale);
        let fresh = literal(&mut frame, 11, 100, 2);

        // the child identity was redefined; the parent itself is still live
        let mut available = FxHashSet::default();
        available.insert(StateDefNode::new(fresh, 100, 11));
        available.insert(StateDefNode::new(parent, 101, 10));

        let mut input = FxHashSet::default();
        input.insert(parent);
        let mut memo = FxHashMap::default();
        let result =
            resolver.retrieve_latest_states(&mut frame, 12, &input, &available, &mut memo);

        assert_eq!(result.len(), 1);
        let rewritten = *result.iter().next().unwrap();
        assert_ne!(rewritten, parent);
        let state = frame.space.state(rewritten).unwrap();
        assert_eq!(state.state_id, 101);
        assert!(state.fields["x"].contains(&fresh));
        assert!(!state.fields["x"].contains(&stale));
    }

    #[test]
    fn test_get_state_from_path_drills_fields_and_slots() {
        let mut space = SymbolStateSpace::new();
        let leaf = space.add_state(
            State::new(1, 100).with_value(StateValue::Const(ConstValue::Int(7))),
        );
        let mut inner = State::new(1, 101);
        inner.set_array_slot(1, {
            let mut set = FxHashSet::default();
            set.insert(leaf);
            set
        });
        let inner_index = space.add_state(inner);
        let mut outer = State::new(1, 102);
        outer.add_field("f", inner_index);
        let outer_index = space.add_state(outer);

        let path = vec![
            AccessPoint::top_level("root", 102),
            AccessPoint::field("f", 101),
            AccessPoint::array_slot(1, 100),
        ];
        let mut sources = FxHashSet::default();
        sources.insert(outer_index);
        let result = Resolver::get_state_from_path(&space, &path, &sources);
        assert_eq!(result.len(), 1);
        assert!(result.contains(&leaf));
    }

    #[test]
    fn test_are_states_identical_on_structure_and_leaves() {
        let mut space = SymbolStateSpace::new();
        let leaf1 = space.add_state(
            State::new(1, 100).with_value(StateValue::Const(ConstValue::Int(1))),
        );
        let leaf2 = space.add_state(
            State::new(2, 200).with_value(StateValue::Const(ConstValue::Int(1))),
        );
        let leaf3 = space.add_state(
            State::new(3, 300).with_value(StateValue::Const(ConstValue::Int(9))),
        );
        let mut a = State::new(1, 101);
        a.add_field("x", leaf1);
        let a_index = space.add_state(a);
        let mut b = State::new(2, 201);
        b.add_field("x", leaf2);
        let b_index = space.add_state(b);
        let mut c = State::new(3, 301);
        c.add_field("x", leaf3);
        let c_index = space.add_state(c);

        assert!(Resolver::are_states_identical(&space, a_index, &space, b_index));
        assert!(!Resolver::are_states_identical(&space, a_index, &space, c_index));
    }

    #[test]
    fn test_infer_arg_direct_states_are_extracted() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut ids = IdAllocator::new(500);
        let mut store = ArtifactStore::new();
        let mut caller = ComputeFrame::new(1, -1, -1);
        let arg = literal(&mut caller, 10, 100, 42);
        let call_site = (1, 50, 2);
        store.save_parameter_mappings(
            call_site,
            vec![ParameterMapping {
                arg_index_in_space: arg,
                arg_state_id: 100,
                arg_source_symbol_id: -1,
                arg_access_path: Vec::new(),
                parameter_symbol_id: 77,
                parameter_access_point: None,
                is_default_value: false,
            }],
        );

        let mut path = Vec::new();
        let outcome =
            resolver.infer_arg_from_parameter(&store, &caller, call_site, 77, &mut path, &mut ids);
        match outcome {
            InferOutcome::States { space, indexes } => {
                assert_eq!(indexes.len(), 1);
                let index = *indexes.iter().next().unwrap();
                assert_eq!(
                    space.state(index).unwrap().value,
                    StateValue::Const(crate::shared::models::ConstValue::Int(42))
                );
            }
            InferOutcome::Redirect(_) => panic!("expected extracted argument states"),
        }
    }

    #[test]
    fn test_infer_arg_packs_positional_rest_into_slots() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut ids = IdAllocator::new(500);
        let mut store = ArtifactStore::new();
        let mut caller = ComputeFrame::new(1, -1, -1);
        let first = literal(&mut caller, 10, 100, 1);
        let second = literal(&mut caller, 10, 101, 2);
        let call_site = (1, 50, 2);
        let slot_mapping = |arg, state_id, slot| ParameterMapping {
            arg_index_in_space: arg,
            arg_state_id: state_id,
            arg_source_symbol_id: -1,
            arg_access_path: Vec::new(),
            parameter_symbol_id: 88,
            parameter_access_point: Some(AccessPoint::array_slot(slot, -1)),
            is_default_value: false,
        };
        store.save_parameter_mappings(
            call_site,
            vec![slot_mapping(first, 100, 0), slot_mapping(second, 101, 1)],
        );

        let mut path = Vec::new();
        let outcome =
            resolver.infer_arg_from_parameter(&store, &caller, call_site, 88, &mut path, &mut ids);
        match outcome {
            InferOutcome::States { space, indexes } => {
                let packed = space.state(*indexes.iter().next().unwrap()).unwrap();
                assert_eq!(packed.array.len(), 2);
                assert_eq!(packed.source_symbol_id, 88);
            }
            InferOutcome::Redirect(_) => panic!("expected a packed state"),
        }
    }

    #[test]
    fn test_infer_arg_default_binding_redirects_to_default_symbol() {
        let db = MemoryProgramDb::default();
        let resolver = Resolver::new(&db);
        let mut ids = IdAllocator::new(500);
        let mut store = ArtifactStore::new();
        let caller = ComputeFrame::new(1, -1, -1);
        let call_site = (1, 50, 2);
        store.save_parameter_mappings(
            call_site,
            vec![ParameterMapping {
                arg_index_in_space: usize::MAX,
                arg_state_id: -1,
                arg_source_symbol_id: 99,
                arg_access_path: Vec::new(),
                parameter_symbol_id: 77,
                parameter_access_point: None,
                is_default_value: true,
            }],
        );

        let mut path = Vec::new();
        let outcome =
            resolver.infer_arg_from_parameter(&store, &caller, call_site, 77, &mut path, &mut ids);
        assert!(matches!(outcome, InferOutcome::Redirect(99)));
    }

    #[test]
    fn test_are_states_identical_terminates_on_cyclic_fields() {
        let mut space = SymbolStateSpace::new();
        let a = space.add_state(State::new(1, 100));
        let b = space.add_state(State::new(1, 101));
        space.state_mut(a).unwrap().add_field("next", b);
        space.state_mut(b).unwrap().add_field("next", a);

        assert!(Resolver::are_states_identical(&space, a, &space, b));
    }
}
