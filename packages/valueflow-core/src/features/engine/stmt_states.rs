//! Per-statement state transfer.
//!
//! Given a statement whose reaching definitions and input states are in
//! place, compute the states it defines: aliasing on assignment,
//! copy-on-write versioning on field/array writes (the new version keeps its
//! `state_id`, so reaching definitions retire the old one), placeholder
//! materialization on reads from ANYTHING values, and summary application on
//! calls.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use super::frame::{ComputeFrame, InterruptionData, StmtResultFlag};
use crate::config::{AnalysisConfig, IdAllocator};
use crate::features::loader::ArtifactStore;
use crate::features::resolver::{
    AnythingOutcome, AnythingResolution, DeferredTarget, Resolver,
};
use crate::features::state_space::{
    AccessPoint, State, StateKind, StateValue, SpaceItem, Symbol,
};
use crate::features::summary::{
    Argument, CallSiteKey, IndexMapInSummary, MethodCallArguments, MethodSummaryTemplate,
    ParameterMapping,
};
use crate::shared::models::{ConstValue, MethodId, Operand, Stmt, StmtId, StmtKind, SymbolId};

/// Which phase is driving; controls summary lookup and path recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Intraprocedural with stubs; produces call-site-independent templates.
    SummaryGeneration,
    /// Interprocedural over the frame stack; produces call-site instances.
    GlobalAnalysis,
}

/// Map of symbol id → live input state indices for the current statement.
pub type InStates = FxHashMap<SymbolId, FxHashSet<usize>>;

/// Per-statement state computation, shared by both phase drivers.
pub struct StmtStateAnalysis<'a> {
    pub resolver: &'a Resolver<'a>,
    pub ids: &'a mut IdAllocator,
    pub store: &'a mut ArtifactStore,
    pub config: &'a AnalysisConfig,
    pub phase: Phase,
    pub analyzed_methods: &'a FxHashSet<MethodId>,
    /// Methods currently on the frame stack (recursion guard).
    pub stack_methods: &'a FxHashSet<MethodId>,
}

/// Merge states sharing one identity group into a single state: field-wise
/// union, slot-wise array union, collapsed-set union. Keeps the common
/// `state_id` and registers the fusion as a definition of this statement.
pub fn fuse_states(
    frame: &mut ComputeFrame,
    stmt_id: StmtId,
    indices: &FxHashSet<usize>,
) -> Option<usize> {
    let mut iter = indices.iter();
    let first_index = *iter.next()?;
    let mut fused = frame.space.state(first_index)?.copy_at(stmt_id);
    for &index in iter {
        let Some(state) = frame.space.state(index) else {
            continue;
        };
        for (name, children) in &state.fields {
            fused
                .fields
                .entry(name.clone())
                .or_default()
                .extend(children.iter().copied());
        }
        for (slot, children) in state.array.iter().enumerate() {
            while fused.array.len() <= slot {
                fused.array.push(FxHashSet::default());
            }
            fused.array[slot].extend(children.iter().copied());
        }
        fused
            .collapsed_elements
            .extend(state.collapsed_elements.iter().copied());
        fused.collapsed |= state.collapsed;
        if fused.value.is_none() {
            fused.value = state.value.clone();
        }
    }
    let index = register_defined_state(frame, stmt_id, fused);
    Some(index)
}

/// Group a set of state indices by identity.
pub fn group_states_by_id(
    frame: &ComputeFrame,
    indices: &FxHashSet<usize>,
) -> FxHashMap<i64, FxHashSet<usize>> {
    let mut groups: FxHashMap<i64, FxHashSet<usize>> = FxHashMap::default();
    for &index in indices {
        if let Some(state_id) = frame.space.state_id_of(index) {
            groups.entry(state_id).or_default().insert(index);
        }
    }
    groups
}

/// Add a state to the frame's arena and register it as a definition of
/// `stmt_id` (identity index + this statement's defined-state set).
pub fn register_defined_state(frame: &mut ComputeFrame, stmt_id: StmtId, state: State) -> usize {
    let state_id = state.state_id;
    let index = frame.space.add_state(state);
    frame
        .state_to_define
        .entry(state_id)
        .or_default()
        .insert(crate::features::bitvector::StateDefNode::new(
            index, state_id, stmt_id,
        ));
    if let Some(status) = frame.statuses.get_mut(&stmt_id) {
        status.defined_states.insert(index);
    }
    index
}

impl<'a> StmtStateAnalysis<'a> {
    /// Entry point: dispatch on the statement kind.
    pub fn compute_stmt_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt: &Stmt,
        in_states: &InStates,
    ) -> StmtResultFlag {
        let stmt_id = stmt.stmt_id;
        trace!(stmt_id, op = stmt.kind.operation(), "compute state");
        match &stmt.kind {
            StmtKind::Assign {
                operand2, operator, ..
            } => self.assign_state(frame, stmt_id, operator.is_some(), operand2.is_some(), in_states),
            StmtKind::Call { .. } => self.call_state(frame, stmt, in_states),
            StmtKind::ParameterDecl { .. } => self.parameter_decl_state(frame, stmt_id, in_states),
            StmtKind::MethodDecl { .. } => {
                self.decl_ref_state(frame, stmt_id, true);
                StmtResultFlag::default()
            }
            StmtKind::ClassDecl { .. } => {
                self.decl_ref_state(frame, stmt_id, false);
                StmtResultFlag::default()
            }
            StmtKind::NewObject { .. } | StmtKind::NewRecord { .. } => {
                self.new_composite_state(frame, stmt_id, in_states, false);
                StmtResultFlag::default()
            }
            StmtKind::NewArray { .. } => {
                self.new_composite_state(frame, stmt_id, in_states, true);
                StmtResultFlag::default()
            }
            StmtKind::FieldRead { field, .. } => {
                let field = field.clone();
                self.field_read_state(frame, stmt_id, &field, in_states);
                StmtResultFlag::default()
            }
            StmtKind::FieldWrite { field, .. } => {
                let field = field.clone();
                self.field_write_state(frame, stmt_id, &field, in_states);
                StmtResultFlag::default()
            }
            StmtKind::ArrayRead { index, .. } => {
                let slot = const_index(index);
                self.array_read_state(frame, stmt_id, slot, in_states);
                StmtResultFlag::default()
            }
            StmtKind::ArrayWrite { index, .. } => {
                let slot = const_index(index);
                self.array_write_state(frame, stmt_id, slot, 2, in_states);
                StmtResultFlag::default()
            }
            StmtKind::ArrayAppend { .. } => {
                self.array_write_state(frame, stmt_id, None, 1, in_states);
                StmtResultFlag::default()
            }
            StmtKind::ForIn { .. } => {
                self.forin_state(frame, stmt_id, in_states);
                StmtResultFlag::default()
            }
            // control headers, returns, declarations without values, and
            // no-ops move no state themselves
            StmtKind::Return { .. }
            | StmtKind::Yield { .. }
            | StmtKind::Throw { .. }
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::DoWhile { .. }
            | StmtKind::For { .. }
            | StmtKind::Switch { .. }
            | StmtKind::Case { .. }
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Goto
            | StmtKind::Block
            | StmtKind::Try
            | StmtKind::Catch { .. }
            | StmtKind::VariableDecl { .. }
            | StmtKind::Import { .. }
            | StmtKind::FromImport { .. }
            | StmtKind::Export { .. }
            | StmtKind::Nop => StmtResultFlag::default(),
        }
    }

    // ── small helpers ────────────────────────────────────────────────

    /// Input states of the used operand at `position`: a symbol reads its
    /// live in-states, a literal is itself.
    fn read_used_states(
        &self,
        frame: &ComputeFrame,
        stmt_id: StmtId,
        position: usize,
        in_states: &InStates,
    ) -> FxHashSet<usize> {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return FxHashSet::default();
        };
        let Some(&index) = status.used_symbols.get(position) else {
            return FxHashSet::default();
        };
        match frame.space.get(index) {
            Some(SpaceItem::Symbol(symbol)) => in_states
                .get(&symbol.symbol_id)
                .cloned()
                .unwrap_or_else(|| symbol.states.clone()),
            Some(SpaceItem::State(_)) => {
                let mut set = FxHashSet::default();
                set.insert(index);
                set
            }
            None => FxHashSet::default(),
        }
    }

    fn set_defined_symbol_states(
        &self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        states: FxHashSet<usize>,
    ) {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return;
        };
        let Some(defined_index) = status.defined_symbol else {
            return;
        };
        if let Some(symbol) = frame.space.symbol_mut(defined_index) {
            symbol.states = states;
        }
    }

    fn defined_symbol_id(&self, frame: &ComputeFrame, stmt_id: StmtId) -> Option<SymbolId> {
        let status = frame.statuses.get(&stmt_id)?;
        let index = status.defined_symbol?;
        frame.space.symbol(index).map(|s| s.symbol_id)
    }

    /// Tag a symbol as key dynamic content: its states must be re-resolved
    /// at every apply site.
    fn tag_key_state(&self, frame: &mut ComputeFrame, symbol_id: SymbolId, state_index: usize) {
        if frame.all_local_symbol_ids.contains(&symbol_id) {
            return;
        }
        MethodSummaryTemplate::add_entry(
            &mut frame.summary_template.key_dynamic_content,
            symbol_id,
            IndexMapInSummary::raw(state_index),
        );
    }

    // ── simple transfers ─────────────────────────────────────────────

    fn assign_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        has_operator: bool,
        has_second_operand: bool,
        in_states: &InStates,
    ) -> StmtResultFlag {
        let first = self.read_used_states(frame, stmt_id, 0, in_states);
        let states = if has_operator && has_second_operand {
            // a binary expression produces a fresh value
            let second = self.read_used_states(frame, stmt_id, 1, in_states);
            let folded = self.try_const_fold(frame, &first, &second);
            let state = match folded {
                Some(value) => {
                    State::new(stmt_id, self.ids.state_id()).with_value(StateValue::Const(value))
                }
                None => State::new(stmt_id, self.ids.state_id()),
            };
            let index = register_defined_state(frame, stmt_id, state);
            let mut set = FxHashSet::default();
            set.insert(index);
            set
        } else {
            // plain copy: the target aliases the source's states
            first
        };
        self.set_defined_symbol_states(frame, stmt_id, states);
        StmtResultFlag::default()
    }

    fn try_const_fold(
        &self,
        frame: &ComputeFrame,
        first: &FxHashSet<usize>,
        second: &FxHashSet<usize>,
    ) -> Option<ConstValue> {
        if first.len() != 1 || second.len() != 1 {
            return None;
        }
        let a = frame.space.state(*first.iter().next().unwrap())?;
        let b = frame.space.state(*second.iter().next().unwrap())?;
        match (&a.value, &b.value) {
            (StateValue::Const(ConstValue::Int(x)), StateValue::Const(ConstValue::Int(y))) => {
                x.checked_add(*y).map(ConstValue::Int)
            }
            _ => None,
        }
    }

    fn decl_ref_state(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId, is_method: bool) {
        let value = if is_method {
            StateValue::MethodRef(stmt_id)
        } else {
            StateValue::ClassRef(stmt_id)
        };
        let state = State::new(stmt_id, self.ids.state_id()).with_value(value);
        let index = register_defined_state(frame, stmt_id, state);
        let mut set = FxHashSet::default();
        set.insert(index);
        self.set_defined_symbol_states(frame, stmt_id, set);
    }

    fn new_composite_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        in_states: &InStates,
        _is_array: bool,
    ) {
        let class_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let mut state = State::new(stmt_id, self.ids.state_id());
        for class_index in class_states {
            if let Some(class_state) = frame.space.state(class_index) {
                if let StateValue::ClassRef(class_id) = class_state.value {
                    state.value = StateValue::ClassRef(class_id);
                    break;
                }
            }
        }
        let state_id = state.state_id;
        if let Some(symbol_id) = self.defined_symbol_id(frame, stmt_id) {
            state.source_symbol_id = symbol_id;
        }
        state.access_path = vec![AccessPoint::top_level("", state_id)];
        let index = register_defined_state(frame, stmt_id, state);
        let mut set = FxHashSet::default();
        set.insert(index);
        self.set_defined_symbol_states(frame, stmt_id, set);
    }

    fn forin_state(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId, in_states: &InStates) {
        // the loop variable ranges over every element of the receiver
        let receiver_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let mut element_states = FxHashSet::default();
        for &index in &receiver_states {
            if let Some(state) = frame.space.state(index) {
                for children in &state.array {
                    element_states.extend(children.iter().copied());
                }
                for children in state.fields.values() {
                    element_states.extend(children.iter().copied());
                }
                element_states.extend(state.collapsed_elements.iter().copied());
            }
        }
        self.set_defined_symbol_states(frame, stmt_id, element_states);
    }

    // ── field access ─────────────────────────────────────────────────

    fn field_read_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        field: &str,
        in_states: &InStates,
    ) {
        let receiver_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let receiver_symbol_id = self.used_symbol_id(frame, stmt_id, 0);
        let mut result = FxHashSet::default();

        for receiver_index in receiver_states {
            let Some(state) = frame.space.state(receiver_index).cloned() else {
                continue;
            };
            if let Some(children) = state.fields.get(field) {
                result.extend(children.iter().copied());
                continue;
            }
            if state.collapsed {
                result.extend(state.collapsed_elements.iter().copied());
                continue;
            }
            if state.kind == StateKind::Anything || state.kind == StateKind::Unsolved {
                // materialize the unknown member and remember it on a new
                // version of the receiver so later reads agree
                let child_id = self.ids.state_id();
                let mut child_path = state.access_path.clone();
                child_path.push(AccessPoint::field(field, child_id));
                let mut child = State::new(stmt_id, child_id)
                    .with_kind(StateKind::Anything)
                    .with_source_symbol(state.source_symbol_id)
                    .with_access_path(child_path);
                child.source_state_id = state.state_id;
                let child_index = register_defined_state(frame, stmt_id, child);

                let mut new_version = state.copy_at(stmt_id);
                new_version.add_field(field, child_index);
                let parent_index = register_defined_state(frame, stmt_id, new_version);

                if let Some(symbol_id) = receiver_symbol_id {
                    self.tag_key_state(frame, symbol_id, parent_index);
                }
                result.insert(child_index);
            }
        }
        self.set_defined_symbol_states(frame, stmt_id, result);
    }

    fn field_write_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        field: &str,
        in_states: &InStates,
    ) {
        let receiver_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let source_states = self.read_used_states(frame, stmt_id, 1, in_states);
        let mut new_versions = FxHashSet::default();

        for receiver_index in receiver_states {
            let Some(state) = frame.space.state(receiver_index).cloned() else {
                continue;
            };
            let self_referential = source_states.iter().any(|&src| {
                frame
                    .space
                    .state(src)
                    .map(|s| s.descends_from(state.state_id))
                    .unwrap_or(false)
            });
            let mut new_version = state.copy_at(stmt_id);
            if self_referential {
                // the value being written contains the receiver itself;
                // flatten instead of nesting so resolution stays finite
                new_version.collapsed = true;
                new_version
                    .collapsed_elements
                    .extend(source_states.iter().copied());
            } else {
                new_version.fields.insert(field.to_string(), source_states.clone());
            }
            let index = register_defined_state(frame, stmt_id, new_version);
            new_versions.insert(index);
        }
        self.set_defined_symbol_states(frame, stmt_id, new_versions);
    }

    // ── array access ─────────────────────────────────────────────────

    fn array_read_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        slot: Option<usize>,
        in_states: &InStates,
    ) {
        let receiver_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let mut result = FxHashSet::default();
        for receiver_index in receiver_states {
            let Some(state) = frame.space.state(receiver_index).cloned() else {
                continue;
            };
            match slot {
                Some(index) if index < state.array.len() => {
                    result.extend(state.array[index].iter().copied());
                }
                Some(index) => {
                    if state.kind == StateKind::Anything {
                        let child_id = self.ids.state_id();
                        let mut child_path = state.access_path.clone();
                        child_path.push(AccessPoint::array_slot(index, child_id));
                        let mut child = State::new(stmt_id, child_id)
                            .with_kind(StateKind::Anything)
                            .with_source_symbol(state.source_symbol_id)
                            .with_access_path(child_path);
                        child.source_state_id = state.state_id;
                        let child_index = register_defined_state(frame, stmt_id, child);

                        let mut new_version = state.copy_at(stmt_id);
                        new_version.set_array_slot(index, {
                            let mut set = FxHashSet::default();
                            set.insert(child_index);
                            set
                        });
                        register_defined_state(frame, stmt_id, new_version);
                        result.insert(child_index);
                    }
                }
                None => {
                    // unknown index: any element may be read
                    for children in &state.array {
                        result.extend(children.iter().copied());
                    }
                    result.extend(state.collapsed_elements.iter().copied());
                }
            }
        }
        self.set_defined_symbol_states(frame, stmt_id, result);
    }

    fn array_write_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        slot: Option<usize>,
        source_position: usize,
        in_states: &InStates,
    ) {
        let receiver_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let source_states = self.read_used_states(frame, stmt_id, source_position, in_states);
        let mut new_versions = FxHashSet::default();
        for receiver_index in receiver_states {
            let Some(state) = frame.space.state(receiver_index).cloned() else {
                continue;
            };
            let self_referential = source_states.iter().any(|&src| {
                frame
                    .space
                    .state(src)
                    .map(|s| s.descends_from(state.state_id))
                    .unwrap_or(false)
            });
            let mut new_version = state.copy_at(stmt_id);
            if self_referential {
                new_version.collapsed = true;
                new_version
                    .collapsed_elements
                    .extend(source_states.iter().copied());
            } else {
                match slot {
                    Some(index) => new_version.set_array_slot(index, source_states.clone()),
                    None => new_version.array.push(source_states.clone()),
                }
            }
            let index = register_defined_state(frame, stmt_id, new_version);
            new_versions.insert(index);
        }
        self.set_defined_symbol_states(frame, stmt_id, new_versions);
    }

    fn used_symbol_id(
        &self,
        frame: &ComputeFrame,
        stmt_id: StmtId,
        position: usize,
    ) -> Option<SymbolId> {
        let status = frame.statuses.get(&stmt_id)?;
        let &index = status.used_symbols.get(position)?;
        frame.space.symbol(index).map(|s| s.symbol_id)
    }

    // ── parameter binding ────────────────────────────────────────────

    fn parameter_decl_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        in_states: &InStates,
    ) -> StmtResultFlag {
        let Some(param_symbol_id) = self.defined_symbol_id(frame, stmt_id) else {
            return StmtResultFlag::default();
        };

        let bound: Vec<ParameterMapping> = frame
            .bound_parameters
            .iter()
            .filter(|m| m.parameter_symbol_id == param_symbol_id && !m.is_default_value)
            .cloned()
            .collect();

        if !bound.is_empty() {
            // interprocedural: the actual arguments are already in this
            // frame's arena
            let mut states = FxHashSet::default();
            for mapping in &bound {
                states.insert(mapping.arg_index_in_space);
                if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                    status.defined_states.insert(mapping.arg_index_in_space);
                }
                if let Some(state_id) = frame.space.state_id_of(mapping.arg_index_in_space) {
                    frame
                        .state_to_define
                        .entry(state_id)
                        .or_default()
                        .insert(crate::features::bitvector::StateDefNode::new(
                            mapping.arg_index_in_space,
                            state_id,
                            stmt_id,
                        ));
                }
            }
            self.set_defined_symbol_states(frame, stmt_id, states);
            return StmtResultFlag::default();
        }

        // template generation: the parameter is an ANYTHING placeholder
        // owned by whoever calls us
        let default_states = self.read_used_states(frame, stmt_id, 0, in_states);
        let state_id = self.ids.state_id();
        let name = frame
            .statuses
            .get(&stmt_id)
            .and_then(|s| s.defined_symbol)
            .and_then(|i| frame.space.symbol(i))
            .map(|s| s.name.clone())
            .unwrap_or_default();
        let placeholder = State::new(stmt_id, state_id)
            .with_kind(StateKind::Anything)
            .with_source_symbol(param_symbol_id)
            .with_access_path(vec![AccessPoint::top_level(name, state_id)]);
        let index = register_defined_state(frame, stmt_id, placeholder);
        frame
            .initial_state_to_external_symbol
            .insert(state_id, param_symbol_id);
        frame
            .external_symbol_to_initial_state_index
            .insert(param_symbol_id, index);

        let mut states = FxHashSet::default();
        states.insert(index);
        states.extend(default_states.iter().copied());
        self.set_defined_symbol_states(frame, stmt_id, states);
        StmtResultFlag::default()
    }

    // ── calls ────────────────────────────────────────────────────────

    fn call_state(
        &mut self,
        frame: &mut ComputeFrame,
        stmt: &Stmt,
        in_states: &InStates,
    ) -> StmtResultFlag {
        let stmt_id = stmt.stmt_id;
        let name_states = self.read_used_states(frame, stmt_id, 0, in_states);

        let mut callee_method_ids: Vec<MethodId> = Vec::new();
        let mut constructor_class: Option<i64> = None;
        let mut unsolved = false;

        for &name_index in &name_states {
            let Some(state) = frame.space.state(name_index) else {
                continue;
            };
            match state.value {
                StateValue::MethodRef(method_id) => {
                    if !callee_method_ids.contains(&method_id) {
                        callee_method_ids.push(method_id);
                    }
                }
                StateValue::ClassRef(class_id) => {
                    constructor_class = Some(class_id);
                }
                _ => unsolved = true,
            }
        }
        if name_states.is_empty() {
            unsolved = true;
        }

        if let Some(class_id) = constructor_class {
            // calling a class constructs an instance
            let mut state = State::new(stmt_id, self.ids.state_id())
                .with_value(StateValue::ClassRef(class_id));
            if let Some(symbol_id) = self.defined_symbol_id(frame, stmt_id) {
                state.source_symbol_id = symbol_id;
            }
            let state_id = state.state_id;
            state.access_path = vec![AccessPoint::top_level("", state_id)];
            let index = register_defined_state(frame, stmt_id, state);
            let mut set = FxHashSet::default();
            set.insert(index);
            self.set_defined_symbol_states(frame, stmt_id, set);
            return StmtResultFlag::default();
        }

        if callee_method_ids.is_empty() {
            if unsolved {
                self.unresolved_call_result(frame, stmt_id);
            }
            return StmtResultFlag::default();
        }

        let args = self.prepare_args(frame, stmt, in_states);
        let caller_id = frame.method_id;

        // schedule callees that still need analysis
        let mut callees_to_analyze = Vec::new();
        for &callee_id in &callee_method_ids {
            let call_site: CallSiteKey = (caller_id, stmt_id, callee_id);
            if self.has_summary_for(frame, call_site) {
                continue;
            }
            if self.stack_methods.contains(&callee_id) {
                // recursion: the callee is being analyzed somewhere below
                // us; this round completes with a placeholder result
                continue;
            }
            if self.phase == Phase::GlobalAnalysis {
                let callee_path = frame.path.push_call(stmt_id, callee_id);
                if callee_path.count_cycles() > 1 || frame.path.contains_method(callee_id) {
                    continue;
                }
            } else if self.analyzed_methods.contains(&callee_id) {
                continue;
            }
            if frame
                .content_to_be_analyzed
                .contains_key(&call_site)
            {
                // already scheduled once; never twice
                continue;
            }
            let mappings = self.map_arguments(frame, &args, callee_id, stmt_id);
            self.store.save_parameter_mappings(call_site, mappings);
            callees_to_analyze.push(callee_id);
        }
        if !callees_to_analyze.is_empty() {
            debug!(caller_id, stmt_id, ?callees_to_analyze, "interrupting for callees");
            return StmtResultFlag::interrupted(InterruptionData {
                caller_id,
                call_stmt_id: stmt_id,
                callee_ids: callees_to_analyze,
            });
        }

        // apply whatever summaries exist
        let mut flag = StmtResultFlag::default();
        let mut return_states = FxHashSet::default();
        let mut applied_any = false;
        for &callee_id in &callee_method_ids {
            let call_site: CallSiteKey = (caller_id, stmt_id, callee_id);
            if self
                .store
                .parameter_mappings(call_site)
                .is_none()
            {
                let mappings = self.map_arguments(frame, &args, callee_id, stmt_id);
                self.store.save_parameter_mappings(call_site, mappings);
            }
            if self.apply_callee_summary(frame, stmt_id, call_site, &mut return_states, &mut flag) {
                applied_any = true;
                self.store.call_graph.add_edge(caller_id, callee_id, stmt_id);
            }
        }

        if !applied_any {
            self.unresolved_call_result(frame, stmt_id);
            return flag;
        }
        self.set_defined_symbol_states(frame, stmt_id, return_states);
        flag
    }

    /// A call whose callee set could not be fixed: the result is an
    /// ANYTHING placeholder and the statement is flagged for re-resolution.
    fn unresolved_call_result(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId) {
        frame.summary_template.dynamic_call_stmts.insert(stmt_id);
        if let Some(symbol_id) = self.used_symbol_id(frame, stmt_id, 0) {
            if let Some(status) = frame.statuses.get(&stmt_id) {
                if let Some(&name_index) = status.used_symbols.first() {
                    self.tag_key_state(frame, symbol_id, name_index);
                }
            }
        }
        let state_id = self.ids.state_id();
        let mut placeholder = State::new(stmt_id, state_id).with_kind(StateKind::Anything);
        if let Some(symbol_id) = self.defined_symbol_id(frame, stmt_id) {
            placeholder.source_symbol_id = symbol_id;
        }
        placeholder.access_path = vec![AccessPoint::top_level("", state_id)];
        let index = register_defined_state(frame, stmt_id, placeholder);
        let mut set = FxHashSet::default();
        set.insert(index);
        self.set_defined_symbol_states(frame, stmt_id, set);
    }

    fn has_summary_for(&self, frame: &ComputeFrame, call_site: CallSiteKey) -> bool {
        match self.phase {
            Phase::SummaryGeneration => self.store.has_summary_template(call_site.2),
            // call-site memoization: a template alone is not enough, the
            // callee must be re-analyzed at this exact site (the template
            // stays as the fallback for recursion-guarded calls)
            Phase::GlobalAnalysis => {
                frame.summary_collection.contains_key(&call_site)
                    || self.store.summary_instance(call_site).is_some()
            }
        }
    }

    /// Snapshot the call's actual arguments from the caller's live states.
    fn prepare_args(
        &self,
        frame: &ComputeFrame,
        stmt: &Stmt,
        in_states: &InStates,
    ) -> MethodCallArguments {
        let stmt_id = stmt.stmt_id;
        let StmtKind::Call {
            positional_args,
            named_args,
            ..
        } = &stmt.kind
        else {
            return MethodCallArguments::default();
        };
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return MethodCallArguments::default();
        };

        let mut result = MethodCallArguments::default();
        let mut used_cursor = 1; // used[0] is the callee name
        for (position, _) in positional_args.iter().enumerate() {
            if let Some(argument) =
                self.snapshot_argument(frame, stmt_id, used_cursor, position, None, in_states)
            {
                result.positional.push(argument);
            }
            used_cursor += 1;
        }
        for (name, _) in named_args {
            if let Some(argument) = self.snapshot_argument(
                frame,
                stmt_id,
                used_cursor,
                usize::MAX,
                Some(name.clone()),
                in_states,
            ) {
                result.named.push(argument);
            }
            used_cursor += 1;
        }
        let _ = status;
        result
    }

    fn snapshot_argument(
        &self,
        frame: &ComputeFrame,
        stmt_id: StmtId,
        used_position: usize,
        position: usize,
        name: Option<String>,
        in_states: &InStates,
    ) -> Option<Argument> {
        let status = frame.statuses.get(&stmt_id)?;
        let &index = status.used_symbols.get(used_position)?;
        let states = self.read_used_states(frame, stmt_id, used_position, in_states);
        let source_symbol_id = frame
            .space
            .symbol(index)
            .map(|s| s.symbol_id)
            .unwrap_or(-1);
        Some(Argument {
            call_stmt_id: stmt_id,
            position,
            name,
            source_symbol_id,
            access_path: Vec::new(),
            states,
            index_in_space: index,
        })
    }

    /// Bind actuals to formals, including packed and default parameters.
    fn map_arguments(
        &self,
        frame: &ComputeFrame,
        args: &MethodCallArguments,
        callee_id: MethodId,
        call_stmt_id: StmtId,
    ) -> Vec<ParameterMapping> {
        let parameters = self.resolver.db.method_parameters(callee_id);
        let mut mappings = Vec::new();
        let mut used_positional = 0usize;
        let mut used_named: FxHashSet<String> = FxHashSet::default();

        for param in &parameters {
            if param.packed_positional {
                // everything positional that is left lands in the pack
                let mut slot = 0usize;
                for arg in args.positional.iter().skip(used_positional) {
                    for &state_index in &arg.states {
                        let mut mapping = ParameterMapping::direct(
                            arg,
                            frame.space.state_id_of(state_index).unwrap_or(-1),
                            param.symbol_id,
                        );
                        mapping.arg_index_in_space = state_index;
                        mapping.parameter_access_point =
                            Some(AccessPoint::array_slot(slot, -1));
                        mappings.push(mapping);
                    }
                    slot += 1;
                }
                used_positional = args.positional.len();
                continue;
            }
            if param.packed_named {
                for arg in &args.named {
                    let Some(key) = &arg.name else { continue };
                    if used_named.contains(key) {
                        continue;
                    }
                    for &state_index in &arg.states {
                        let mut mapping = ParameterMapping::direct(
                            arg,
                            frame.space.state_id_of(state_index).unwrap_or(-1),
                            param.symbol_id,
                        );
                        mapping.arg_index_in_space = state_index;
                        mapping.parameter_access_point = Some(AccessPoint::field(key.clone(), -1));
                        mappings.push(mapping);
                    }
                }
                continue;
            }

            let matched: Option<&Argument> = if used_positional < args.positional.len() {
                let arg = &args.positional[used_positional];
                used_positional += 1;
                Some(arg)
            } else {
                args.named.iter().find(|a| a.name.as_deref() == Some(param.name.as_str()))
            };
            match matched {
                Some(arg) => {
                    if let Some(key) = &arg.name {
                        used_named.insert(key.clone());
                    }
                    for &state_index in &arg.states {
                        let mut mapping = ParameterMapping::direct(
                            arg,
                            frame.space.state_id_of(state_index).unwrap_or(-1),
                            param.symbol_id,
                        );
                        mapping.arg_index_in_space = state_index;
                        mappings.push(mapping);
                    }
                }
                None if param.has_default => {
                    mappings.push(ParameterMapping {
                        arg_index_in_space: usize::MAX,
                        arg_state_id: -1,
                        arg_source_symbol_id: param.symbol_id,
                        arg_access_path: Vec::new(),
                        parameter_symbol_id: param.symbol_id,
                        parameter_access_point: None,
                        is_default_value: true,
                    });
                }
                None => {}
            }
        }
        let _ = call_stmt_id;
        mappings
    }

    /// Splice a callee's summary into the caller at one call site: append
    /// the compact space, substitute parameter placeholders with actual
    /// arguments (deferring self-referential and cross-parameter cases),
    /// re-version argument identities for write-through, propagate external
    /// definitions, and collect return states.
    fn apply_callee_summary(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        call_site: CallSiteKey,
        return_states: &mut FxHashSet<usize>,
        flag: &mut StmtResultFlag,
    ) -> bool {
        let callee_id = call_site.2;
        let (template, compact_space) = match self.phase {
            Phase::GlobalAnalysis => {
                if let (Some(instance), Some(space)) = (
                    frame.summary_collection.get(&call_site),
                    frame.space_collection.get(&call_site),
                ) {
                    (instance.summary.clone(), space.clone())
                } else if let (Some(instance), Some(space)) = (
                    self.store.summary_instance(call_site),
                    self.store.instance_space(call_site),
                ) {
                    (instance.summary.clone(), space.clone())
                } else if let (Some(template), Some(space)) = (
                    self.store.summary_template(callee_id),
                    self.store.template_space(callee_id),
                ) {
                    (template.clone(), space.clone())
                } else {
                    return false;
                }
            }
            Phase::SummaryGeneration => {
                if let (Some(template), Some(space)) = (
                    self.store.summary_template(callee_id),
                    self.store.template_space(callee_id),
                ) {
                    (template.clone(), space.clone())
                } else {
                    return false;
                }
            }
        };

        debug!(caller = call_site.0, stmt_id, callee = callee_id, "applying summary");
        let appended = frame.space.append_space_copy(&compact_space);
        let map_entry = |entry: &IndexMapInSummary| -> Option<usize> {
            entry.new_index.and_then(|n| appended.get(&n).copied())
        };

        let param_ids: FxHashSet<SymbolId> = self
            .resolver
            .db
            .method_parameters(callee_id)
            .iter()
            .map(|p| p.symbol_id)
            .collect();
        let mappings: Vec<ParameterMapping> = self
            .store
            .parameter_mappings(call_site)
            .map(|m| m.to_vec())
            .unwrap_or_default();

        let mut resolution = AnythingResolution::new();
        let mut param_final: FxHashMap<SymbolId, FxHashSet<usize>> = FxHashMap::default();

        // 1) parameters: rebind each final root state to the argument's
        // identity, then resolve the ANYTHING children inside it
        for (&param_id, entries) in &template.parameter_symbols {
            let mut final_states = FxHashSet::default();
            for entry in entries {
                let Some(caller_index) = map_entry(entry) else {
                    continue;
                };
                let Some(state) = frame.space.state(caller_index).cloned() else {
                    continue;
                };
                if state.kind == StateKind::Anything
                    && state.source_symbol_id == param_id
                    && !state.has_children()
                {
                    // the callee never touched this parameter
                    continue;
                }
                final_states.insert(caller_index);
            }
            if final_states.is_empty() {
                continue;
            }
            let rebound =
                self.rebind_to_arguments(frame, stmt_id, param_id, &final_states, &mappings, flag);
            for &rebound_index in rebound.iter() {
                self.resolve_anything_children(
                    frame,
                    stmt_id,
                    rebound_index,
                    &param_ids,
                    param_id,
                    &mut resolution,
                );
            }
            param_final.insert(param_id, rebound);
        }

        // 2) flush deferred cross-parameter updates in one pass
        let remaining = resolution.flush_deferred(frame, &param_final);
        for (target, resolved, _) in remaining {
            match target {
                DeferredTarget::CalleeParam { symbol_id } => {
                    let extra =
                        self.rebind_to_arguments(frame, stmt_id, symbol_id, &resolved, &mappings, flag);
                    param_final.entry(symbol_id).or_default().extend(extra);
                }
                DeferredTarget::CalleeReturn => {
                    return_states.extend(resolved);
                }
                DeferredTarget::CalleeExternal { symbol_id } => {
                    self.apply_external_definition(frame, stmt_id, symbol_id, &resolved, flag);
                }
                DeferredTarget::StateField { .. } => {}
            }
        }

        // 3) return states
        for entries in template.return_symbols.values() {
            for entry in entries {
                let Some(caller_index) = map_entry(entry) else {
                    continue;
                };
                let Some(state) = frame.space.state(caller_index).cloned() else {
                    continue;
                };
                if state.kind == StateKind::Anything && param_ids.contains(&state.source_symbol_id)
                {
                    // returns a parameter (projection): resolve against the
                    // bound arguments
                    let roots = param_final
                        .get(&state.source_symbol_id)
                        .cloned()
                        .unwrap_or_else(|| {
                            self.argument_states(frame, &mappings, state.source_symbol_id)
                        });
                    let resolved =
                        Resolver::get_state_from_path(&frame.space, &state.access_path, &roots);
                    if resolved.is_empty() {
                        return_states.insert(caller_index);
                    } else {
                        return_states.extend(resolved);
                    }
                    continue;
                }
                let outcome = resolution.resolve_anything(
                    self.resolver,
                    frame,
                    stmt_id,
                    caller_index,
                    &param_ids,
                    -1,
                    DeferredTarget::CalleeReturn,
                );
                match outcome {
                    AnythingOutcome::Resolved(set) => return_states.extend(set),
                    AnythingOutcome::NewState(index) => {
                        return_states.insert(index);
                    }
                    AnythingOutcome::Deferred => {}
                    AnythingOutcome::Unchanged => {
                        return_states.insert(caller_index);
                    }
                }
            }
        }
        for &index in return_states.iter() {
            if let Some(state_id) = frame.space.state_id_of(index) {
                frame
                    .state_to_define
                    .entry(state_id)
                    .or_default()
                    .insert(crate::features::bitvector::StateDefNode::new(
                        index, state_id, stmt_id,
                    ));
            }
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.defined_states.insert(index);
            }
        }

        // 4) externals the callee defined
        for (&ext_id, entries) in &template.defined_external_symbols {
            let mut states = FxHashSet::default();
            for entry in entries {
                if let Some(caller_index) = map_entry(entry) {
                    states.insert(caller_index);
                }
            }
            if !states.is_empty() {
                self.apply_external_definition(frame, stmt_id, ext_id, &states, flag);
            }
        }

        // final flush for anything deferred while resolving returns
        let late = resolution.flush_deferred(frame, &param_final);
        for (target, resolved, _) in late {
            if matches!(target, DeferredTarget::CalleeReturn) {
                return_states.extend(resolved);
            }
        }
        true
    }

    /// Resolve the ANYTHING placeholders sitting in a spliced state's field
    /// sets: externals resolve against the caller's own values, parameter
    /// references defer until every formal of the call is bound.
    fn resolve_anything_children(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        parent_index: usize,
        param_ids: &FxHashSet<SymbolId>,
        current_param: SymbolId,
        resolution: &mut AnythingResolution,
    ) {
        let fields: Vec<(String, Vec<usize>)> = match frame.space.state(parent_index) {
            Some(state) => state
                .fields
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
                .collect(),
            None => return,
        };
        for (field_name, children) in fields {
            for child_index in children {
                let is_anything = frame
                    .space
                    .state(child_index)
                    .map(|s| s.kind == StateKind::Anything)
                    .unwrap_or(false);
                if !is_anything {
                    continue;
                }
                let target = DeferredTarget::StateField {
                    state_index: parent_index,
                    field: field_name.clone(),
                };
                let outcome = resolution.resolve_anything(
                    self.resolver,
                    frame,
                    stmt_id,
                    child_index,
                    param_ids,
                    current_param,
                    target,
                );
                let Some(parent) = frame.space.state_mut(parent_index) else {
                    continue;
                };
                let Some(set) = parent.fields.get_mut(&field_name) else {
                    continue;
                };
                match outcome {
                    AnythingOutcome::Resolved(replacements) => {
                        set.remove(&child_index);
                        set.extend(replacements.iter().copied());
                    }
                    AnythingOutcome::NewState(index) => {
                        set.remove(&child_index);
                        set.insert(index);
                    }
                    AnythingOutcome::Deferred => {
                        set.remove(&child_index);
                    }
                    AnythingOutcome::Unchanged => {}
                }
            }
        }
    }

    /// All caller-side argument states bound to `param_id`.
    fn argument_states(
        &self,
        frame: &ComputeFrame,
        mappings: &[ParameterMapping],
        param_id: SymbolId,
    ) -> FxHashSet<usize> {
        let mut result = FxHashSet::default();
        for mapping in mappings {
            if mapping.parameter_symbol_id == param_id
                && !mapping.is_default_value
                && mapping.arg_index_in_space != usize::MAX
            {
                result.insert(mapping.arg_index_in_space);
            }
        }
        let _ = frame;
        result
    }

    /// Re-version a parameter's final states under the bound arguments'
    /// identities so reaching definitions retire the old argument versions
    /// (alias write-through). Arguments that are caller locals are also
    /// recorded as implicitly redefined symbols.
    fn rebind_to_arguments(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        param_id: SymbolId,
        final_states: &FxHashSet<usize>,
        mappings: &[ParameterMapping],
        flag: &mut StmtResultFlag,
    ) -> FxHashSet<usize> {
        let arg_mappings: Vec<&ParameterMapping> = mappings
            .iter()
            .filter(|m| m.parameter_symbol_id == param_id && !m.is_default_value)
            .collect();
        if arg_mappings.is_empty() {
            // no binding; register the states as plain definitions
            for &index in final_states {
                if let Some(state_id) = frame.space.state_id_of(index) {
                    frame
                        .state_to_define
                        .entry(state_id)
                        .or_default()
                        .insert(crate::features::bitvector::StateDefNode::new(
                            index, state_id, stmt_id,
                        ));
                }
                if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                    status.defined_states.insert(index);
                }
            }
            return final_states.clone();
        }

        let mut rebound = FxHashSet::default();
        let mut by_symbol: FxHashMap<SymbolId, FxHashSet<usize>> = FxHashMap::default();
        for mapping in arg_mappings {
            for &final_index in final_states {
                let Some(state) = frame.space.state(final_index).cloned() else {
                    continue;
                };
                let mut version = state.copy_at(stmt_id);
                if mapping.arg_state_id > 0 {
                    version.state_id = mapping.arg_state_id;
                }
                version.kind = StateKind::Regular;
                let index = register_defined_state(frame, stmt_id, version);
                rebound.insert(index);
                if mapping.arg_source_symbol_id >= 0 {
                    by_symbol
                        .entry(mapping.arg_source_symbol_id)
                        .or_default()
                        .insert(index);
                }
            }
        }

        // argument symbols now hold the new versions
        for (symbol_id, states) in by_symbol {
            if !frame.all_local_symbol_ids.contains(&symbol_id) {
                continue;
            }
            let mut symbol = Symbol::new(stmt_id, "");
            symbol.symbol_id = symbol_id;
            symbol.states = states;
            let symbol_index = frame.space.add_symbol(symbol);
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                if !status.implicitly_defined_symbols.contains(&symbol_index) {
                    status.implicitly_defined_symbols.push(symbol_index);
                    flag.def_changed = true;
                }
            }
        }
        rebound
    }

    /// The callee wrote an external symbol: redefine it here when it is one
    /// of our locals, otherwise bubble it up through our own summary.
    fn apply_external_definition(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        symbol_id: SymbolId,
        states: &FxHashSet<usize>,
        flag: &mut StmtResultFlag,
    ) {
        for &index in states {
            if let Some(state_id) = frame.space.state_id_of(index) {
                frame
                    .state_to_define
                    .entry(state_id)
                    .or_default()
                    .insert(crate::features::bitvector::StateDefNode::new(
                        index, state_id, stmt_id,
                    ));
            }
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.defined_states.insert(index);
            }
        }
        if frame.all_local_symbol_ids.contains(&symbol_id) {
            let mut symbol = Symbol::new(stmt_id, "");
            symbol.symbol_id = symbol_id;
            symbol.states = states.clone();
            let symbol_index = frame.space.add_symbol(symbol);
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                if !status.implicitly_defined_symbols.contains(&symbol_index) {
                    status.implicitly_defined_symbols.push(symbol_index);
                    flag.def_changed = true;
                }
            }
        } else {
            for &index in states {
                MethodSummaryTemplate::add_entry(
                    &mut frame.summary_template.defined_external_symbols,
                    symbol_id,
                    IndexMapInSummary::raw(index),
                );
            }
            frame
                .def_use_summary
                .defined_external_symbol_ids
                .insert(symbol_id);
        }
    }
}

fn const_index(operand: &Operand) -> Option<usize> {
    match operand {
        Operand::Const(value) => value.as_int().and_then(|v| usize::try_from(v).ok()),
        Operand::Var(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::state_space::State;

    fn add_state(frame: &mut ComputeFrame, state_id: i64) -> usize {
        frame.space.add_state(State::new(1, state_id))
    }

    #[test]
    fn test_group_states_by_identity() {
        let mut frame = ComputeFrame::new(1, -1, -1);
        let a1 = add_state(&mut frame, 100);
        let a2 = add_state(&mut frame, 100);
        let b = add_state(&mut frame, 200);

        let indices: FxHashSet<usize> = [a1, a2, b].into_iter().collect();
        let groups = group_states_by_id(&frame, &indices);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&100].len(), 2);
        assert_eq!(groups[&200].len(), 1);
    }

    #[test]
    fn test_fuse_states_unions_fields_and_slots() {
        let mut frame = ComputeFrame::new(1, -1, -1);
        let child_a = add_state(&mut frame, 300);
        let child_b = add_state(&mut frame, 301);
        let child_c = add_state(&mut frame, 302);

        let mut first = State::new(1, 100);
        first.add_field("x", child_a);
        first.set_array_slot(0, [child_c].into_iter().collect());
        let first_index = frame.space.add_state(first);

        let mut second = State::new(2, 100);
        second.add_field("x", child_b);
        second.add_field("y", child_a);
        second.collapsed_elements.insert(child_b);
        second.collapsed = true;
        let second_index = frame.space.add_state(second);

        frame.statuses.insert(9, crate::features::def_use::StmtStatus::new(9));
        let indices: FxHashSet<usize> = [first_index, second_index].into_iter().collect();
        let fused_index = fuse_states(&mut frame, 9, &indices).unwrap();

        let fused = frame.space.state(fused_index).unwrap();
        assert_eq!(fused.state_id, 100);
        assert!(fused.fields["x"].contains(&child_a) && fused.fields["x"].contains(&child_b));
        assert!(fused.fields["y"].contains(&child_a));
        assert!(fused.array[0].contains(&child_c));
        assert!(fused.collapsed);
        assert!(fused.collapsed_elements.contains(&child_b));
        // fusion is a definition of the fusing statement
        assert!(frame.statuses[&9].defined_states.contains(&fused_index));
        assert!(frame.state_to_define[&100]
            .iter()
            .any(|d| d.index == fused_index && d.stmt_id == 9));
    }
}
