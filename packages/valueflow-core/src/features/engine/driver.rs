//! Phase drivers.
//!
//! One driver implementation serves both phases: the intraprocedural
//! summary phase (stubs for unanalyzed callees, call-site-independent
//! templates) and the interprocedural phase (frame-stack DFS from the entry
//! points, call-site instances, call-path recording). Per-statement work is
//! a small state machine — reaching definitions, then state computation —
//! re-entered up to the configured round caps.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use super::frame::{ComputeFrame, ComputeFrameStack, InterruptionData, StmtResultFlag, StmtWorkList};
use super::stmt_states::{fuse_states, group_states_by_id, InStates, Phase, StmtStateAnalysis};
use crate::config::{AnalysisConfig, IdAllocator, BUILTIN_THIS_SYMBOL_ID, FIRST_ROUND, RETURN_SYMBOL_ID};
use crate::errors::Result;
use crate::features::bitvector::{BitSet, StateDefNode, SymbolDefNode};
use crate::features::call_path::PathManager;
use crate::features::def_use::THIS_NAME;
use crate::features::loader::{ArtifactStore, ProgramDb, SummaryPhaseArtifacts};
use crate::features::resolver::Resolver;
use crate::features::state_space::{
    AccessPoint, SpaceItem, State, StateKind, StateValue, SymbolStateSpace,
};
use crate::features::summary::{
    IndexMapInSummary, MethodSummaryInstance, MethodSummaryTemplate, ParameterMapping,
};
use crate::shared::models::{ControlFlowKind, MethodId, Stmt, StmtId, SymbolId};

/// Drives one analysis phase over a program.
pub struct AnalysisDriver<'a> {
    pub db: &'a dyn ProgramDb,
    pub store: &'a mut ArtifactStore,
    pub ids: &'a mut IdAllocator,
    pub config: &'a AnalysisConfig,
    pub phase: Phase,
    pub analyzed_methods: FxHashSet<MethodId>,
    pub path_manager: PathManager,
}

impl<'a> AnalysisDriver<'a> {
    pub fn new(
        db: &'a dyn ProgramDb,
        store: &'a mut ArtifactStore,
        ids: &'a mut IdAllocator,
        config: &'a AnalysisConfig,
        phase: Phase,
    ) -> Self {
        Self {
            db,
            store,
            ids,
            config,
            phase,
            analyzed_methods: FxHashSet::default(),
            path_manager: PathManager::new(),
        }
    }

    // ── frame initialization ─────────────────────────────────────────

    fn load_stmts_and_counters(&self, frame: &mut ComputeFrame) -> bool {
        let Some(ir) = self.db.method_ir(frame.method_id) else {
            return false;
        };
        for stmt in ir.all_stmts() {
            frame.stmts.insert(stmt.stmt_id, stmt.clone());
            frame.stmt_counters.insert(stmt.stmt_id, FIRST_ROUND);
        }
        let Some(cfg) = self.db.method_cfg(frame.method_id) else {
            return false;
        };
        frame.cfg = cfg.clone();
        for node in frame.cfg.nodes() {
            let has_back_edge = frame
                .cfg
                .predecessors(node)
                .iter()
                .any(|p| frame.cfg.edge_kind(*p, node) == Some(ControlFlowKind::LoopBack));
            if has_back_edge {
                frame
                    .loop_total_rounds
                    .insert(node, self.config.loop_rounds);
            }
        }
        frame.unit_id = self.db.method_unit(frame.method_id).unwrap_or(-1);
        true
    }

    fn rebuild_symbol_defs(&self, frame: &mut ComputeFrame, per_symbol_stmts: &FxHashMap<SymbolId, FxHashSet<StmtId>>) {
        let mut all_defs = FxHashSet::default();
        let mut result: FxHashMap<SymbolId, FxHashSet<SymbolDefNode>> = FxHashMap::default();
        for (&symbol_id, stmt_ids) in per_symbol_stmts {
            for &stmt_id in stmt_ids {
                let Some(status) = frame.statuses.get(&stmt_id) else {
                    continue;
                };
                for index in status.all_defined_symbols() {
                    if let Some(symbol) = frame.space.symbol(index) {
                        if symbol.symbol_id == symbol_id {
                            let node = SymbolDefNode::new(index, symbol_id, stmt_id);
                            result.entry(symbol_id).or_default().insert(node);
                            all_defs.insert(node);
                            break;
                        }
                    }
                }
            }
        }
        frame.symbol_bits.init(all_defs.iter().copied());
        frame.symbol_to_define = result;
        frame.all_symbol_defs = all_defs;
    }

    fn init_state_defs(&self, frame: &mut ComputeFrame) {
        let mut all_defs = FxHashSet::default();
        for defs in frame.state_to_define.values() {
            all_defs.extend(defs.iter().copied());
        }
        frame.state_bits.init(all_defs.iter().copied());
        frame.all_state_defs = all_defs;
    }

    /// Splice pending caller-argument states into this frame's arena and
    /// rewrite the parameter bindings accordingly.
    fn bind_pending_arguments(&self, frame: &mut ComputeFrame) {
        let Some((arg_space, mappings)) = frame.pending_argument_space.take() else {
            return;
        };
        let appended = frame.space.append_space_copy(&arg_space);
        let mut rebound = Vec::with_capacity(mappings.len());
        for mut mapping in mappings {
            if mapping.arg_index_in_space != usize::MAX {
                if let Some(&new_index) = appended.get(&mapping.arg_index_in_space) {
                    mapping.arg_index_in_space = new_index;
                }
            }
            rebound.push(mapping);
        }
        frame.bound_parameters = rebound;
    }

    /// Initialize a frame from the def/use artifacts (summary phase).
    fn init_summary_frame(&mut self, frame: &mut ComputeFrame) -> bool {
        frame.has_been_inited = true;
        if !self.load_stmts_and_counters(frame) {
            return false;
        }
        let Ok(artifacts) = self.store.def_use(frame.method_id) else {
            return false;
        };
        frame.statuses = artifacts.statuses.clone();
        frame.space = artifacts.space.clone();
        frame.state_to_define = artifacts.state_to_define.clone();
        frame.def_use_summary = artifacts.def_use_summary.clone();
        frame.all_local_symbol_ids = artifacts.def_use_summary.local_symbol_ids.clone();
        frame.all_local_symbol_ids.extend(
            artifacts
                .def_use_summary
                .parameter_symbol_ids
                .iter()
                .copied(),
        );
        for callee in &artifacts.callees {
            frame.callee_info.insert(callee.stmt_id, callee.clone());
        }
        let symbol_to_define_stmts = artifacts.symbol_to_define.clone();
        if frame.space.is_empty() {
            return false;
        }
        self.rebuild_symbol_defs(frame, &symbol_to_define_stmts);
        self.init_state_defs(frame);

        frame.worklist = StmtWorkList::new(frame.cfg.reverse_postorder_ranks());
        let entries = frame.cfg.entry_nodes();
        frame.worklist.add_all(entries.iter().copied());
        frame.symbol_changed_stmts.extend(entries);
        self.bind_pending_arguments(frame);
        true
    }

    /// Initialize a frame from the summary-phase artifacts (global phase).
    fn init_global_frame(&mut self, frame: &mut ComputeFrame) -> bool {
        frame.has_been_inited = true;
        if !self.load_stmts_and_counters(frame) {
            return false;
        }
        let Ok(artifacts) = self.store.summary_phase(frame.method_id) else {
            return false;
        };
        frame.statuses = artifacts.statuses.clone();
        frame.space = artifacts.space.clone();
        frame.state_to_define = artifacts.state_to_define.clone();
        frame.def_use_summary = artifacts.def_use_summary.clone();
        let symbol_to_define_stmts = artifacts.symbol_to_define.clone();
        frame.all_local_symbol_ids = frame.def_use_summary.local_symbol_ids.clone();
        frame
            .all_local_symbol_ids
            .extend(frame.def_use_summary.parameter_symbol_ids.iter().copied());
        if let Ok(def_use) = self.store.def_use(frame.method_id) {
            for callee in &def_use.callees {
                frame.callee_info.insert(callee.stmt_id, callee.clone());
            }
        }
        if let Some(template) = self.store.summary_template(frame.method_id) {
            frame.summary_template = template.clone();
            frame.external_symbol_to_initial_state_index =
                template.external_symbol_to_state.clone();
            for (&symbol_id, &index) in &template.external_symbol_to_state {
                if let Some(state_id) = frame.space.state_id_of(index) {
                    frame
                        .initial_state_to_external_symbol
                        .insert(state_id, symbol_id);
                }
            }
            frame.summary_instance =
                MethodSummaryInstance::from_template(frame.call_site(), template);
        }

        // the saved bit sets belong to the previous phase's managers; the
        // fixpoint below rebuilds them from scratch
        for status in frame.statuses.values_mut() {
            status.in_symbol_bits = BitSet::new();
            status.out_symbol_bits = BitSet::new();
            status.in_state_bits = BitSet::new();
            status.out_state_bits = BitSet::new();
        }
        self.rebuild_symbol_defs(frame, &symbol_to_define_stmts);
        self.init_state_defs(frame);

        frame.worklist = StmtWorkList::new(frame.cfg.reverse_postorder_ranks());
        let nodes = frame.cfg.nodes();
        frame.worklist.add_all(nodes.iter().copied());
        frame.symbol_changed_stmts.extend(nodes);
        self.bind_pending_arguments(frame);
        true
    }

    // ── reaching definitions ─────────────────────────────────────────

    fn loop_filtered_predecessors(frame: &ComputeFrame, stmt: &Stmt) -> Vec<StmtId> {
        let preds = frame.cfg.predecessors(stmt.stmt_id);
        if !stmt.is_loop_header() {
            return preds;
        }
        let round = frame
            .stmt_counters
            .get(&stmt.stmt_id)
            .copied()
            .unwrap_or(FIRST_ROUND);
        preds
            .into_iter()
            .filter(|p| {
                let is_back = frame.cfg.edge_kind(*p, stmt.stmt_id)
                    == Some(ControlFlowKind::LoopBack);
                if round == FIRST_ROUND {
                    !is_back
                } else {
                    is_back
                }
            })
            .collect()
    }

    fn update_current_symbol_bit(
        frame: &mut ComputeFrame,
        def: SymbolDefNode,
        bits: &mut BitSet,
    ) {
        if !frame.all_symbol_defs.contains(&def) {
            frame.all_symbol_defs.insert(def);
            frame
                .symbol_to_define
                .entry(def.symbol_id)
                .or_default()
                .insert(def);
            frame.symbol_bits.add_bit_id(def);
        }
        let all_defs = frame.symbol_to_define[&def.symbol_id].clone();
        frame.symbol_bits.kill(bits, all_defs);
        frame.symbol_bits.gen(bits, [def]);
    }

    fn update_current_state_bit(
        frame: &mut ComputeFrame,
        def: StateDefNode,
        bits: &mut BitSet,
        new_defined: &FxHashSet<usize>,
    ) {
        if !frame.all_state_defs.contains(&def) {
            frame.all_state_defs.insert(def);
            frame
                .state_to_define
                .entry(def.state_id)
                .or_default()
                .insert(def);
            frame.state_bits.add_bit_id(def);
        }
        // a statement may define several same-identity states in one round;
        // only versions from other rounds/statements get killed
        let kill_set: Vec<StateDefNode> = frame.state_to_define[&def.state_id]
            .iter()
            .filter(|d| !new_defined.contains(&d.index))
            .copied()
            .collect();
        frame.state_bits.kill(bits, kill_set);
        frame.state_bits.gen(bits, [def]);
    }

    fn analyze_reaching_symbols(&mut self, frame: &mut ComputeFrame, stmt: &Stmt) {
        let stmt_id = stmt.stmt_id;
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return;
        };
        let old_in = status.in_symbol_bits.clone();
        let old_out = status.out_symbol_bits.clone();

        let mut new_in = BitSet::new();
        for pred in Self::loop_filtered_predecessors(frame, stmt) {
            if let Some(pred_status) = frame.statuses.get(&pred) {
                new_in.union_with(&pred_status.out_symbol_bits);
            }
        }
        let round = frame.stmt_counters.get(&stmt_id).copied().unwrap_or(0);
        if let Some(status) = frame.statuses.get_mut(&stmt_id) {
            status.in_symbol_bits = new_in.clone();
        }
        if round != FIRST_ROUND && new_in == old_in {
            return;
        }

        let mut current = new_in;
        let defined = frame
            .statuses
            .get(&stmt_id)
            .map(|s| s.all_defined_symbols())
            .unwrap_or_default();
        for index in defined {
            let Some(symbol) = frame.space.symbol(index) else {
                continue;
            };
            let def = SymbolDefNode::new(index, symbol.symbol_id, stmt_id);
            Self::update_current_symbol_bit(frame, def, &mut current);
            frame.symbol_graph.add_def_edge(stmt_id, def);
        }
        if let Some(status) = frame.statuses.get_mut(&stmt_id) {
            status.out_symbol_bits = current;
        }

        if round == FIRST_ROUND {
            self.update_used_symbols_to_symbol_graph(frame, stmt_id, false);
            let successors = frame.cfg.successors(stmt_id);
            frame.symbol_changed_stmts.extend(successors);
        } else {
            self.update_symbols_if_changed(frame, stmt_id, &old_in, &old_out, false, false);
        }
    }

    fn rerun_analyze_reaching_symbols(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId, flag: &StmtResultFlag) {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return;
        };
        let old_out = status.out_symbol_bits.clone();
        let old_in = status.in_symbol_bits.clone();
        let mut current = old_out.clone();
        let implicit = status.implicitly_defined_symbols.clone();
        for index in implicit {
            let Some(symbol) = frame.space.symbol(index) else {
                continue;
            };
            let def = SymbolDefNode::new(index, symbol.symbol_id, stmt_id);
            Self::update_current_symbol_bit(frame, def, &mut current);
            frame.symbol_graph.add_def_edge(stmt_id, def);
        }
        if let Some(status) = frame.statuses.get_mut(&stmt_id) {
            status.out_symbol_bits = current;
        }
        self.update_symbols_if_changed(
            frame,
            stmt_id,
            &old_in,
            &old_out,
            flag.def_changed,
            flag.use_changed,
        );
    }

    fn update_symbols_if_changed(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        old_in: &BitSet,
        old_out: &BitSet,
        def_changed: bool,
        use_changed: bool,
    ) {
        let status_in_changed = frame
            .statuses
            .get(&stmt_id)
            .map(|s| s.in_symbol_bits != *old_in)
            .unwrap_or(false);
        if use_changed {
            self.update_used_symbols_to_symbol_graph(frame, stmt_id, true);
        } else if status_in_changed {
            self.update_used_symbols_to_symbol_graph(frame, stmt_id, false);
        }
        let out_changed = frame
            .statuses
            .get(&stmt_id)
            .map(|s| s.out_symbol_bits != *old_out)
            .unwrap_or(false);
        if out_changed || def_changed {
            let successors = frame.cfg.successors(stmt_id);
            frame.symbol_changed_stmts.extend(successors);
        }
    }

    fn reachable_symbol_defs(
        &self,
        frame: &mut ComputeFrame,
        used_symbol_index: usize,
        available: &FxHashSet<SymbolDefNode>,
    ) -> FxHashSet<SymbolDefNode> {
        let Some(symbol) = frame.space.symbol(used_symbol_index) else {
            return FxHashSet::default();
        };
        let symbol_id = symbol.symbol_id;
        if let Some(defs) = frame.symbol_to_define.get(&symbol_id) {
            return defs.intersection(available).copied().collect();
        }
        let mut result = FxHashSet::default();
        if !frame.all_local_symbol_ids.contains(&symbol_id) {
            frame
                .def_use_summary
                .used_external_symbol_ids
                .insert(symbol_id);
            result.insert(SymbolDefNode::external(symbol_id));
        }
        result
    }

    fn update_used_symbols_to_symbol_graph(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        only_implicit: bool,
    ) {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return;
        };
        let available = frame.symbol_bits.explain(&status.in_symbol_bits);
        let used: Vec<usize> = if only_implicit {
            status.implicitly_used_symbols.clone()
        } else {
            status.all_used_symbols()
        };
        for index in used {
            let reachable = self.reachable_symbol_defs(frame, index, &available);
            for def in reachable {
                frame.symbol_graph.add_use_edge(def, stmt_id);
            }
        }
    }

    // ── state computation ────────────────────────────────────────────

    fn collect_in_state_bits(frame: &ComputeFrame, stmt: &Stmt) -> BitSet {
        let mut bits = BitSet::new();
        for pred in Self::loop_filtered_predecessors(frame, stmt) {
            if let Some(status) = frame.statuses.get(&pred) {
                bits.union_with(&status.out_state_bits);
            }
        }
        bits
    }

    /// For every defined state of the statement, kill the stale versions of
    /// its identity and gen the new one. Falls back to an UNSOLVED state for
    /// a defined symbol that resolved to nothing.
    fn update_out_states(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        old_index_ceiling: usize,
        override_defined: Option<FxHashSet<usize>>,
    ) -> FxHashSet<usize> {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return FxHashSet::default();
        };
        let mut new_defined: FxHashSet<usize> = status
            .defined_states
            .iter()
            .copied()
            .filter(|&i| i >= old_index_ceiling)
            .collect();
        let defined = match override_defined {
            Some(old) => {
                if new_defined.is_empty() {
                    new_defined = old.clone();
                }
                old
            }
            None => status.defined_states.clone(),
        };

        let mut bits = status.in_state_bits.clone();
        for index in defined {
            let Some(state_id) = frame.space.state_id_of(index) else {
                continue;
            };
            let def = StateDefNode::new(index, state_id, stmt_id);
            Self::update_current_state_bit(frame, def, &mut bits, &new_defined);
        }
        if let Some(status) = frame.statuses.get_mut(&stmt_id) {
            status.out_state_bits = bits;
        }

        // a defined symbol with no states at all gets an UNSOLVED marker
        let defined_symbol = frame.statuses.get(&stmt_id).and_then(|s| s.defined_symbol);
        if let Some(symbol_index) = defined_symbol {
            let needs_placeholder = frame
                .space
                .symbol(symbol_index)
                .map(|s| s.states.is_empty())
                .unwrap_or(false);
            if needs_placeholder {
                let symbol_id = frame
                    .space
                    .symbol(symbol_index)
                    .map(|s| s.symbol_id)
                    .unwrap_or(-1);
                let state = State::new(stmt_id, self.ids.state_id())
                    .with_kind(StateKind::Unsolved)
                    .with_source_symbol(symbol_id);
                let index = frame.space.add_state(state);
                if let Some(symbol) = frame.space.symbol_mut(symbol_index) {
                    symbol.states.insert(index);
                }
            }
        }
        new_defined
    }

    /// Input symbols of the statement: the arena records of every reaching
    /// definition of its used symbols.
    fn generate_in_symbols(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId) -> Vec<usize> {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return Vec::new();
        };
        let available = frame.symbol_bits.explain(&status.in_symbol_bits);
        let used = status.all_used_symbols();
        let mut reachable = FxHashSet::default();
        for index in used {
            reachable.extend(self.reachable_symbol_defs(frame, index, &available));
        }
        reachable
            .into_iter()
            .filter(|def| !def.is_external() && def.stmt_id > 0)
            .map(|def| def.index)
            .collect()
    }

    /// symbol id → newest live states, with same-identity duplicates fused.
    fn group_used_states(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        in_symbols: &[usize],
    ) -> InStates {
        let resolver = Resolver::new(self.db);
        let mut result: InStates = FxHashMap::default();
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return result;
        };
        let available_state_defs = frame.state_bits.explain(&status.in_state_bits);

        for &index in in_symbols {
            let Some(symbol) = frame.space.symbol(index) else {
                continue;
            };
            let symbol_id = symbol.symbol_id;
            let states = symbol.states.clone();
            let latest = resolver.collect_newest_states_by_indexes(
                frame,
                &states,
                &available_state_defs,
                None,
            );
            if !latest.is_empty() {
                result.entry(symbol_id).or_default().extend(latest);
            }
        }

        for states in result.values_mut() {
            let groups = group_states_by_id(frame, states);
            for (_, same_identity) in groups {
                if same_identity.len() < 2 {
                    continue;
                }
                if let Some(fused) = fuse_states(frame, stmt_id, &same_identity) {
                    for index in &same_identity {
                        states.remove(index);
                    }
                    states.insert(fused);
                }
            }
        }
        result
    }

    /// Create the placeholder state for an external symbol first seen here.
    fn generate_external_symbol_states(
        &mut self,
        frame: &mut ComputeFrame,
        stmt_id: StmtId,
        symbol_id: SymbolId,
        name: &str,
    ) -> FxHashSet<IndexMapInSummary> {
        let state_id = self.ids.state_id();
        let mut state = if self.db.is_method_decl(symbol_id) {
            State::new(stmt_id, state_id).with_value(StateValue::MethodRef(symbol_id))
        } else if self.db.is_class_decl(symbol_id) {
            State::new(stmt_id, state_id).with_value(StateValue::ClassRef(symbol_id))
        } else if self.db.is_unit_id(symbol_id) {
            State::new(stmt_id, state_id).with_value(StateValue::UnitRef(symbol_id))
        } else {
            State::new(stmt_id, state_id).with_kind(StateKind::Anything)
        };
        state.source_symbol_id = symbol_id;
        state.access_path = vec![AccessPoint::top_level(name, state_id)];
        if name == THIS_NAME {
            state.data_type = THIS_NAME.to_string();
        }

        let index = frame.space.add_state(state);
        frame
            .initial_state_to_external_symbol
            .insert(state_id, symbol_id);
        frame
            .external_symbol_to_initial_state_index
            .insert(symbol_id, index);
        frame
            .state_to_define
            .entry(state_id)
            .or_default()
            .insert(StateDefNode::new(index, state_id, stmt_id));
        if let Some(status) = frame.statuses.get_mut(&stmt_id) {
            status.defined_states.insert(index);
        }
        let mut result = FxHashSet::default();
        result.insert(IndexMapInSummary::raw(index));
        result
    }

    /// The phase-specific part of external-state lookup: the summary phase
    /// reuses the recorded placeholders; the global phase re-resolves
    /// ANYTHING placeholders against the frame stack on the first round.
    fn collect_external_symbol_states(
        &mut self,
        stack: &mut ComputeFrameStack,
        stmt_id: StmtId,
        symbol_id: SymbolId,
        old_key_states: &FxHashSet<usize>,
    ) -> FxHashSet<usize> {
        match self.phase {
            Phase::SummaryGeneration => {
                let frame = stack.top_mut().expect("top frame");
                if frame
                    .summary_template
                    .key_dynamic_content
                    .contains_key(&symbol_id)
                {
                    return old_key_states.clone();
                }
                frame
                    .summary_template
                    .used_external_symbols
                    .get(&symbol_id)
                    .map(|entries| entries.iter().map(|e| e.raw_index).collect())
                    .unwrap_or_else(|| old_key_states.clone())
            }
            Phase::GlobalAnalysis => {
                let round = stack
                    .top()
                    .and_then(|f| f.stmt_counters.get(&stmt_id).copied())
                    .unwrap_or(FIRST_ROUND);
                if round != FIRST_ROUND {
                    return old_key_states.clone();
                }
                let mut result = FxHashSet::default();
                let old_states: Vec<(usize, State)> = {
                    let frame = stack.top().expect("top frame");
                    old_key_states
                        .iter()
                        .filter_map(|&i| frame.space.state(i).cloned().map(|s| (i, s)))
                        .collect()
                };
                for (old_index, old_state) in old_states {
                    match old_state.value {
                        StateValue::MethodRef(_) | StateValue::ClassRef(_) => {
                            result.insert(old_index);
                            continue;
                        }
                        _ => {}
                    }
                    if old_state.kind != StateKind::Anything {
                        result.insert(old_index);
                        continue;
                    }
                    let resolver = Resolver::new(self.db);
                    let old_len = stack.top().map(|f| f.space.len()).unwrap_or(0);
                    let resolved = resolver.resolve_symbol_states(
                        self.store,
                        self.ids,
                        stack.frames_mut(),
                        stmt_id,
                        &old_state,
                    );
                    let frame = stack.top_mut().expect("top frame");
                    for &resolved_index in &resolved {
                        if let Some(state) = frame.space.state_mut(resolved_index) {
                            // the placeholder's identity carries over so
                            // existing references retire correctly
                            state.state_id = old_state.state_id;
                        }
                    }
                    frame
                        .summary_instance
                        .resolved_placeholders
                        .entry(old_index)
                        .or_default()
                        .extend(resolved.iter().copied());
                    // everything spliced in above counts as defined here
                    let new_len = frame.space.len();
                    for index in old_len..new_len {
                        if frame.space.is_state_index(index) {
                            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                                status.defined_states.insert(index);
                            }
                        }
                    }
                    if resolved.is_empty() {
                        result.insert(old_index);
                    } else {
                        result.extend(resolved);
                    }
                }
                result
            }
        }
    }

    /// Refresh the used symbols' states for this round; decides whether the
    /// statement actually needs recomputation.
    fn complete_in_states_and_check_continue_flag(
        &mut self,
        stack: &mut ComputeFrameStack,
        stmt: &Stmt,
        in_states: &mut InStates,
    ) -> bool {
        let stmt_id = stmt.stmt_id;
        if matches!(stmt.kind, crate::shared::models::StmtKind::ParameterDecl { .. }) {
            return true;
        }
        {
            let frame = stack.top().expect("top frame");
            if !frame.symbol_changed_stmts.contains(&stmt_id) {
                return false;
            }
            let round = frame.stmt_counters.get(&stmt_id).copied().unwrap_or(0);
            let cap = frame
                .loop_total_rounds
                .get(&stmt_id)
                .copied()
                .unwrap_or(self.config.max_stmt_rounds);
            if round >= cap || round >= self.config.max_stmt_rounds {
                return false;
            }
        }

        let (mut change_flag, used_indices) = {
            let frame = stack.top().expect("top frame");
            let round = frame.stmt_counters.get(&stmt_id).copied().unwrap_or(0);
            // the first round always computes (a suspended call statement
            // resumes at round 0); later rounds only when inputs changed or
            // the statement sits on a loop body still within its cap
            let change = round == FIRST_ROUND
                || frame
                    .loop_total_rounds
                    .get(&stmt_id)
                    .map(|cap| round < *cap)
                    .unwrap_or(false);
            let used = frame
                .statuses
                .get(&stmt_id)
                .map(|s| s.all_used_symbols())
                .unwrap_or_default();
            (change, used)
        };

        for used_index in used_indices {
            let (symbol_id, current_states) = {
                let frame = stack.top().expect("top frame");
                match frame.space.symbol(used_index) {
                    Some(symbol) => (symbol.symbol_id, symbol.states.clone()),
                    None => continue,
                }
            };

            if let Some(states) = in_states.get(&symbol_id) {
                // locally known value
                let states = states.clone();
                let frame = stack.top_mut().expect("top frame");
                if states != current_states {
                    change_flag = true;
                }
                if let Some(symbol) = frame.space.symbol_mut(used_index) {
                    symbol.states = states;
                }
                let round = frame.stmt_counters.get(&stmt_id).copied().unwrap_or(0);
                let is_key_dynamic = frame
                    .summary_template
                    .key_dynamic_content
                    .contains_key(&symbol_id);
                let in_dynamic = frame.summary_template.dynamic_call_stmts.contains(&stmt_id);
                if !is_key_dynamic || round > FIRST_ROUND || !in_dynamic {
                    continue;
                }
            } else {
                // external to this method: materialize or refresh
                let frame = stack.top_mut().expect("top frame");
                let known = frame
                    .summary_template
                    .used_external_symbols
                    .contains_key(&symbol_id);
                if !known {
                    let eligible = frame
                        .def_use_summary
                        .used_external_symbol_ids
                        .contains(&symbol_id)
                        || frame
                            .def_use_summary
                            .used_this_symbol_ids
                            .contains(&symbol_id)
                        || frame.summary_template.dynamic_call_stmts.contains(&stmt_id)
                        || symbol_id == BUILTIN_THIS_SYMBOL_ID;
                    if !eligible {
                        continue;
                    }
                    let name = frame
                        .space
                        .symbol(used_index)
                        .map(|s| s.name.clone())
                        .unwrap_or_default();
                    let entries =
                        self.generate_external_symbol_states(frame, stmt_id, symbol_id, &name);
                    frame
                        .summary_template
                        .used_external_symbols
                        .insert(symbol_id, entries);
                }
            }

            let mut old_key_states = current_states.clone();
            if old_key_states.is_empty() {
                let frame = stack.top().expect("top frame");
                if let Some(entries) = frame.summary_template.key_dynamic_content.get(&symbol_id) {
                    old_key_states.extend(entries.iter().map(|e| e.raw_index));
                }
                if old_key_states.is_empty() {
                    if let Some(entries) =
                        frame.summary_template.used_external_symbols.get(&symbol_id)
                    {
                        old_key_states.extend(entries.iter().map(|e| e.raw_index));
                    }
                }
            }
            let resolved =
                self.collect_external_symbol_states(stack, stmt_id, symbol_id, &old_key_states);
            if resolved.is_empty() {
                continue;
            }
            let frame = stack.top_mut().expect("top frame");
            let changed = frame
                .space
                .symbol(used_index)
                .map(|s| s.states != resolved)
                .unwrap_or(false);
            if changed {
                change_flag = true;
                if let Some(symbol) = frame.space.symbol_mut(used_index) {
                    symbol.states = resolved.clone();
                }
            }
            in_states.insert(symbol_id, resolved);
        }
        change_flag
    }

    fn compute_states(&mut self, stack: &mut ComputeFrameStack, stmt: &Stmt) -> StmtResultFlag {
        let stmt_id = stmt.stmt_id;
        {
            let frame = stack.top().expect("top frame");
            if !frame.symbol_graph.has_stmt(stmt_id) {
                return StmtResultFlag::default();
            }
        }

        // snapshot for change detection and rollback
        let (old_defined_symbol_states, old_status_defined, old_in_state_bits, old_ceiling, old_implicit_def, old_implicit_use) = {
            let frame = stack.top().expect("top frame");
            let status = frame.statuses.get(&stmt_id).cloned().unwrap_or_default();
            let old_symbol_states = status
                .defined_symbol
                .and_then(|i| frame.space.symbol(i))
                .map(|s| s.states.clone())
                .unwrap_or_default();
            (
                old_symbol_states,
                status.defined_states.clone(),
                status.in_state_bits.clone(),
                frame.space.len(),
                status.implicitly_defined_symbols.clone(),
                status.implicitly_used_symbols.clone(),
            )
        };

        {
            let frame = stack.top_mut().expect("top frame");
            let in_bits = Self::collect_in_state_bits(frame, stmt);
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.in_state_bits = in_bits;
                status.defined_states = FxHashSet::default();
            }
        }

        let in_symbols = {
            let frame = stack.top_mut().expect("top frame");
            self.generate_in_symbols(frame, stmt_id)
        };
        let mut in_states = {
            let frame = stack.top_mut().expect("top frame");
            self.group_used_states(frame, stmt_id, &in_symbols)
        };
        let continue_flag =
            self.complete_in_states_and_check_continue_flag(stack, stmt, &mut in_states);
        if !continue_flag {
            trace!(stmt_id, "skip recomputation");
            let frame = stack.top_mut().expect("top frame");
            let in_changed = frame
                .statuses
                .get(&stmt_id)
                .map(|s| s.in_state_bits != old_in_state_bits)
                .unwrap_or(false);
            if in_changed {
                self.update_out_states(
                    stack.top_mut().expect("top frame"),
                    stmt_id,
                    old_ceiling,
                    Some(old_status_defined.clone()),
                );
            }
            let frame = stack.top_mut().expect("top frame");
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.defined_states = old_status_defined;
                status.implicitly_defined_symbols = old_implicit_def;
                status.implicitly_used_symbols = old_implicit_use;
            }
            if let Some(symbol_index) = frame.statuses.get(&stmt_id).and_then(|s| s.defined_symbol)
            {
                if let Some(symbol) = frame.space.symbol_mut(symbol_index) {
                    symbol.states = old_defined_symbol_states;
                }
            }
            return StmtResultFlag::default();
        }

        // clear the defined symbol before the transfer recomputes it
        {
            let frame = stack.top_mut().expect("top frame");
            if let Some(symbol_index) = frame.statuses.get(&stmt_id).and_then(|s| s.defined_symbol)
            {
                if let Some(symbol) = frame.space.symbol_mut(symbol_index) {
                    symbol.states = FxHashSet::default();
                }
            }
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.implicitly_defined_symbols = Vec::new();
            }
        }

        let stack_methods: FxHashSet<MethodId> =
            stack.frames().iter().map(|f| f.method_id).collect();
        let resolver = Resolver::new(self.db);
        let mut flag = {
            let frame = stack.top_mut().expect("top frame");
            let mut stmt_state = StmtStateAnalysis {
                resolver: &resolver,
                ids: self.ids,
                store: self.store,
                config: self.config,
                phase: self.phase,
                analyzed_methods: &self.analyzed_methods,
                stack_methods: &stack_methods,
            };
            stmt_state.compute_stmt_state(frame, stmt, &in_states)
        };

        // rewrite results to their newest versions, then publish out bits
        {
            let frame = stack.top_mut().expect("top frame");
            let available = frame
                .statuses
                .get(&stmt_id)
                .map(|s| frame.state_bits.explain(&s.in_state_bits))
                .unwrap_or_default();
            let defined_symbols: Vec<usize> = frame
                .statuses
                .get(&stmt_id)
                .map(|s| s.all_defined_symbols())
                .unwrap_or_default();
            for symbol_index in defined_symbols {
                let Some(states) = frame.space.symbol(symbol_index).map(|s| s.states.clone())
                else {
                    continue;
                };
                let adjusted = resolver.collect_newest_states_by_indexes(
                    frame,
                    &states,
                    &available,
                    Some(old_ceiling),
                );
                if let Some(symbol) = frame.space.symbol_mut(symbol_index) {
                    symbol.states = adjusted;
                }
            }
            let defined_states = frame
                .statuses
                .get(&stmt_id)
                .map(|s| s.defined_states.clone())
                .unwrap_or_default();
            let adjusted = resolver.collect_newest_states_by_indexes(
                frame,
                &defined_states,
                &available,
                Some(old_ceiling),
            );
            if let Some(status) = frame.statuses.get_mut(&stmt_id) {
                status.defined_states = adjusted;
            }
        }
        let new_out = self.update_out_states(
            stack.top_mut().expect("top frame"),
            stmt_id,
            old_ceiling,
            None,
        );

        let frame = stack.top_mut().expect("top frame");
        let new_defined_symbol_states = frame
            .statuses
            .get(&stmt_id)
            .and_then(|s| s.defined_symbol)
            .and_then(|i| frame.space.symbol(i))
            .map(|s| s.states.clone())
            .unwrap_or_default();
        if !new_out.is_empty() || new_defined_symbol_states != old_defined_symbol_states {
            flag.states_changed = true;
        }
        let status = frame.statuses.get(&stmt_id).cloned().unwrap_or_default();
        if status.implicitly_defined_symbols != old_implicit_def {
            flag.def_changed = true;
        }
        if status.implicitly_used_symbols != old_implicit_use {
            flag.use_changed = true;
        }
        if flag.states_changed {
            let dependents = frame.symbol_graph.dependent_stmts(stmt_id);
            frame.symbol_changed_stmts.extend(dependents);
        }
        flag
    }

    fn update_method_def_use_summary(&mut self, frame: &mut ComputeFrame, stmt_id: StmtId) {
        let Some(status) = frame.statuses.get(&stmt_id) else {
            return;
        };
        let implicit: Vec<usize> = status.implicitly_defined_symbols.clone();
        for index in implicit {
            let Some(symbol) = frame.space.symbol(index) else {
                continue;
            };
            let symbol_id = symbol.symbol_id;
            if symbol_id >= 0 && !frame.all_local_symbol_ids.contains(&symbol_id) {
                frame
                    .def_use_summary
                    .defined_external_symbol_ids
                    .insert(symbol_id);
            }
        }
    }

    // ── the statement loop ───────────────────────────────────────────

    /// Run the per-statement fixpoint on the top frame until the worklist
    /// drains or a callee interrupts.
    fn analyze_stmts(&mut self, stack: &mut ComputeFrameStack) -> Option<InterruptionData> {
        loop {
            let Some(stmt_id) = stack.top().and_then(|f| f.current_stmt_id()) else {
                return None;
            };
            let stmt = {
                let frame = stack.top_mut().expect("top frame");
                if stmt_id <= 0 || !frame.stmt_counters.contains_key(&stmt_id) {
                    frame.worklist.pop();
                    continue;
                }
                frame.stmts.get(&stmt_id).cloned()
            };
            let Some(stmt) = stmt else {
                stack.top_mut().expect("top frame").worklist.pop();
                continue;
            };

            {
                let frame = stack.top_mut().expect("top frame");
                let round = frame.stmt_counters.get(&stmt_id).copied().unwrap_or(0);
                let cap = frame
                    .loop_total_rounds
                    .get(&stmt_id)
                    .copied()
                    .unwrap_or(self.config.max_stmt_rounds);
                if round < cap.min(self.config.max_stmt_rounds) {
                    let successors = frame.cfg.successors(stmt_id);
                    frame.worklist.add_all(successors);
                    if frame.loop_total_rounds.contains_key(&stmt_id) {
                        frame.symbol_changed_stmts.insert(stmt_id);
                    }
                }
            }

            let resuming = {
                let frame = stack.top_mut().expect("top frame");
                let was = frame.interruption_flag;
                frame.interruption_flag = false;
                was
            };
            if !resuming {
                let frame = stack.top_mut().expect("top frame");
                self.analyze_reaching_symbols(frame, &stmt);
            }

            let flag = self.compute_states(stack, &stmt);
            {
                let frame = stack.top_mut().expect("top frame");
                frame.symbol_changed_stmts.remove(&stmt_id);
            }
            if let Some(data) = flag.interruption {
                return Some(data);
            }

            if flag.def_changed || flag.use_changed {
                let frame = stack.top_mut().expect("top frame");
                self.rerun_analyze_reaching_symbols(frame, stmt_id, &flag);
                self.update_method_def_use_summary(frame, stmt_id);
            }

            let frame = stack.top_mut().expect("top frame");
            *frame.stmt_counters.entry(stmt_id).or_insert(FIRST_ROUND) += 1;
            frame.worklist.pop();
        }
    }

    // ── summary generation ───────────────────────────────────────────

    /// Back-resolve the final live states of every parameter, external,
    /// `this` and return symbol at the CFG exits, fuse same-identity
    /// duplicates, and extract a compact standalone space.
    fn generate_summary(
        &mut self,
        frame: &mut ComputeFrame,
    ) -> (MethodSummaryTemplate, SymbolStateSpace) {
        let resolver = Resolver::new(self.db);
        let mut template = std::mem::replace(
            &mut frame.summary_template,
            MethodSummaryTemplate::new(frame.method_id),
        );
        template.method_id = frame.method_id;

        let mut basic_target_ids: FxHashSet<SymbolId> = FxHashSet::default();
        basic_target_ids.extend(frame.def_use_summary.parameter_symbol_ids.iter().copied());
        basic_target_ids.extend(frame.def_use_summary.defined_this_symbol_ids.iter().copied());
        basic_target_ids.extend(
            frame
                .def_use_summary
                .defined_external_symbol_ids
                .iter()
                .copied(),
        );

        let mut all_indexes: FxHashSet<usize> = FxHashSet::default();
        for exit_stmt in frame.cfg.exit_nodes() {
            let Some(status) = frame.statuses.get(&exit_stmt) else {
                continue;
            };
            let available_symbols = frame.symbol_bits.explain(&status.out_symbol_bits);
            let available_states = frame.state_bits.explain(&status.out_state_bits);

            // return value states, straight off the return statement
            let mut returned_states: FxHashSet<usize> = FxHashSet::default();
            if let Some(stmt) = frame.stmts.get(&exit_stmt) {
                if stmt.is_return() {
                    if let Some(&used_index) = status.used_symbols.first() {
                        match frame.space.get(used_index) {
                            Some(SpaceItem::Symbol(symbol)) => {
                                returned_states.extend(symbol.states.iter().copied());
                            }
                            Some(SpaceItem::State(_)) => {
                                returned_states.insert(used_index);
                            }
                            None => {}
                        }
                    }
                }
            }

            // final states of the target symbols
            let mut per_symbol: FxHashMap<SymbolId, FxHashSet<usize>> = FxHashMap::default();
            for def in &available_symbols {
                if def.is_external() || !basic_target_ids.contains(&def.symbol_id) {
                    continue;
                }
                if let Some(symbol) = frame.space.symbol(def.index) {
                    per_symbol
                        .entry(def.symbol_id)
                        .or_default()
                        .extend(symbol.states.iter().copied());
                }
            }
            for &symbol_id in &frame.def_use_summary.defined_external_symbol_ids {
                if let Some(&index) = frame.external_symbol_to_initial_state_index.get(&symbol_id)
                {
                    per_symbol.entry(symbol_id).or_default().insert(index);
                }
            }

            let mut memo = FxHashMap::default();
            let mut latest_per_symbol: FxHashMap<SymbolId, FxHashSet<usize>> =
                FxHashMap::default();
            for (symbol_id, old_states) in per_symbol {
                let latest = resolver.retrieve_latest_states(
                    frame,
                    exit_stmt,
                    &old_states,
                    &available_states,
                    &mut memo,
                );
                let mut fused_set = FxHashSet::default();
                for (_, same_identity) in group_states_by_id(frame, &latest) {
                    if same_identity.len() > 1 {
                        if let Some(fused) = fuse_states(frame, exit_stmt, &same_identity) {
                            fused_set.insert(fused);
                            continue;
                        }
                    }
                    fused_set.extend(same_identity);
                }
                latest_per_symbol.insert(symbol_id, fused_set);
            }

            for (&symbol_id, states) in &latest_per_symbol {
                let record = if frame.def_use_summary.parameter_symbol_ids.contains(&symbol_id) {
                    &mut template.parameter_symbols
                } else if frame
                    .def_use_summary
                    .defined_this_symbol_ids
                    .contains(&symbol_id)
                {
                    &mut template.this_symbols
                } else {
                    &mut template.defined_external_symbols
                };
                for &index in states {
                    MethodSummaryTemplate::add_entry(
                        record,
                        symbol_id,
                        IndexMapInSummary::raw(index),
                    );
                    all_indexes.insert(index);
                }
            }

            let latest_returns = resolver.retrieve_latest_states(
                frame,
                exit_stmt,
                &returned_states,
                &available_states,
                &mut memo,
            );
            for index in latest_returns {
                MethodSummaryTemplate::add_entry(
                    &mut template.return_symbols,
                    RETURN_SYMBOL_ID,
                    IndexMapInSummary::raw(index),
                );
                all_indexes.insert(index);
            }
        }

        template.external_symbol_to_state = frame.external_symbol_to_initial_state_index.clone();
        all_indexes.extend(template.all_raw_indexes());

        let extracted = frame.space.extract(&all_indexes);
        template.adjust_ids(&extracted.old_to_new);
        (template, extracted.space)
    }

    fn save_summary_phase_artifacts(&mut self, frame: &ComputeFrame) {
        let mut symbol_to_define: FxHashMap<SymbolId, FxHashSet<StmtId>> = FxHashMap::default();
        for (symbol_id, defs) in &frame.symbol_to_define {
            let stmts: FxHashSet<StmtId> = defs
                .iter()
                .filter(|d| !d.is_external())
                .map(|d| d.stmt_id)
                .collect();
            if !stmts.is_empty() {
                symbol_to_define.insert(*symbol_id, stmts);
            }
        }
        self.store.save_summary_phase(
            frame.method_id,
            SummaryPhaseArtifacts {
                statuses: frame.statuses.clone(),
                space: frame.space.clone(),
                symbol_to_define,
                state_to_define: frame.state_to_define.clone(),
                def_use_summary: frame.def_use_summary.clone(),
            },
        );
    }

    // ── frame-stack loops ────────────────────────────────────────────

    /// Summary phase: analyze one method, pushing frames for not-yet
    /// summarized direct callees (memoized, never re-pushed for a method
    /// already on the stack).
    pub fn analyze_method(&mut self, method_id: MethodId) -> Result<()> {
        if self.analyzed_methods.contains(&method_id) {
            return Ok(());
        }
        debug!(method_id, "summary-phase analysis");
        let mut stack = ComputeFrameStack::new();
        stack.push(ComputeFrame::new(method_id, -1, -1));

        while !stack.is_empty() {
            let needs_init = !stack.top().expect("top frame").has_been_inited;
            if needs_init {
                let ok = {
                    let frame = stack.top_mut().expect("top frame");
                    self.init_summary_frame(frame)
                };
                if !ok {
                    let frame = stack.pop().expect("top frame");
                    self.analyzed_methods.insert(frame.method_id);
                    continue;
                }
            }

            let interruption = self.analyze_stmts(&mut stack);
            if let Some(data) = interruption {
                let caller_id = {
                    let frame = stack.top_mut().expect("top frame");
                    frame.interruption_flag = true;
                    frame.symbol_changed_stmts.insert(data.call_stmt_id);
                    for &callee_id in &data.callee_ids {
                        let key = (data.caller_id, data.call_stmt_id, callee_id);
                        frame.content_to_be_analyzed.insert(key, true);
                    }
                    frame.method_id
                };
                for &callee_id in &data.callee_ids {
                    if !self.analyzed_methods.contains(&callee_id) && !stack.has_method(callee_id)
                    {
                        stack.push(ComputeFrame::new(callee_id, caller_id, data.call_stmt_id));
                    }
                }
                continue;
            }

            let mut frame = stack.pop().expect("top frame");
            self.analyzed_methods.insert(frame.method_id);
            let (template, compact_space) = self.generate_summary(&mut frame);
            self.save_summary_phase_artifacts(&frame);
            self.store
                .save_summary_template(frame.method_id, template, compact_space);
            debug!(method_id = frame.method_id, "summary saved");
        }
        Ok(())
    }

    /// Global phase: walk the call graph from one entry point with an
    /// explicit frame stack, reusing call-site summaries where computed.
    pub fn analyze_entry_point(&mut self, entry_method_id: MethodId) -> Result<()> {
        debug!(entry_method_id, "global-phase analysis");
        let mut stack = ComputeFrameStack::new();
        let entry_frame = ComputeFrame::new(entry_method_id, -1, -1);
        self.path_manager.add_path(&entry_frame.path);
        stack.push(entry_frame);

        while !stack.is_empty() {
            // schedule one pending, unanalyzed callee if any
            let pending = {
                let frame = stack.top().expect("top frame");
                frame
                    .content_to_be_analyzed
                    .iter()
                    .find(|(_, &scheduled)| !scheduled)
                    .map(|(&key, _)| key)
            };
            if let Some(call_site) = pending {
                let (caller_id, call_stmt_id, callee_id) = call_site;
                let (child_path, argument_space) = {
                    let frame = stack.top_mut().expect("top frame");
                    frame.content_to_be_analyzed.insert(call_site, true);
                    let child_path = frame.path.push_call(call_stmt_id, callee_id);
                    let argument_space = self
                        .store
                        .parameter_mappings(call_site)
                        .map(|mappings| {
                            let arg_indices: FxHashSet<usize> = mappings
                                .iter()
                                .filter(|m| m.arg_index_in_space != usize::MAX)
                                .map(|m| m.arg_index_in_space)
                                .collect();
                            let extracted = frame.space.extract(&arg_indices);
                            let rewritten: Vec<ParameterMapping> = mappings
                                .iter()
                                .map(|m| {
                                    let mut mapping = m.clone();
                                    if mapping.arg_index_in_space != usize::MAX {
                                        mapping.arg_index_in_space =
                                            extracted.map_index(mapping.arg_index_in_space);
                                    }
                                    mapping
                                })
                                .collect();
                            (extracted.space, rewritten)
                        });
                    (child_path, argument_space)
                };
                let mut child = ComputeFrame::new(callee_id, caller_id, call_stmt_id);
                child.path = child_path;
                child.pending_argument_space = argument_space;
                self.path_manager.add_path(&child.path);
                stack.push(child);
                continue;
            }

            let needs_init = !stack.top().expect("top frame").has_been_inited;
            if needs_init {
                let call_site = stack.top().expect("top frame").call_site();
                // call-site memoization: a summary already computed at this
                // exact site is reused without re-analysis
                if let (Some(instance), Some(space)) = (
                    self.store.summary_instance(call_site),
                    self.store.instance_space(call_site),
                ) {
                    let instance = instance.clone();
                    let space = space.clone();
                    stack.pop();
                    if let Some(caller) = stack.top_mut() {
                        caller.summary_collection.insert(call_site, instance);
                        caller.space_collection.insert(call_site, space);
                    }
                    continue;
                }
                if self
                    .store
                    .summary_template(stack.top().expect("top frame").method_id)
                    .is_none()
                {
                    // empty body: nothing to compose
                    stack.pop();
                    continue;
                }
                let ok = {
                    let frame = stack.top_mut().expect("top frame");
                    self.init_global_frame(frame)
                };
                if !ok {
                    stack.pop();
                    continue;
                }
            }

            let interruption = self.analyze_stmts(&mut stack);
            if let Some(data) = interruption {
                let frame = stack.top_mut().expect("top frame");
                frame.interruption_flag = true;
                frame.symbol_changed_stmts.insert(data.call_stmt_id);
                let mut new_callee = false;
                for &callee_id in &data.callee_ids {
                    let key = (data.caller_id, data.call_stmt_id, callee_id);
                    if !frame.content_to_be_analyzed.contains_key(&key) {
                        frame.content_to_be_analyzed.insert(key, false);
                        new_callee = true;
                    }
                }
                if new_callee {
                    continue;
                }
                warn!(
                    method_id = frame.method_id,
                    "interruption without new callees; finalizing frame"
                );
            }

            let mut frame = stack.pop().expect("top frame");
            let call_site = frame.call_site();
            let (template, compact_space) = self.generate_summary(&mut frame);
            let mut instance = std::mem::replace(
                &mut frame.summary_instance,
                MethodSummaryInstance::from_template(call_site, &template),
            );
            instance.summary = template;
            self.store
                .save_summary_instance(call_site, instance.clone(), compact_space.clone());
            if let Some(caller) = stack.top_mut() {
                caller.summary_collection.insert(call_site, instance);
                caller.space_collection.insert(call_site, compact_space);
            }
            debug!(method_id = frame.method_id, "call-site summary saved");
        }
        Ok(())
    }
}
