//! Activation records for procedure analysis.
//!
//! A `ComputeFrame` is everything one method's analysis needs to be paused
//! and resumed: worklist, statuses, bit managers, its own arena, round
//! counters, and the pending-callee bookkeeping. The `ComputeFrameStack`
//! replaces native recursion so nested callee analysis never grows the host
//! call stack.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::features::bitvector::{BitVectorManager, StateDefNode, SymbolDefNode};
use crate::features::call_graph::MethodInternalCallee;
use crate::features::call_path::CallPath;
use crate::features::def_use::StmtStatus;
use crate::features::state_space::SymbolStateSpace;
use crate::features::summary::{
    CallSiteKey, MethodDefUseSummary, MethodSummaryInstance, MethodSummaryTemplate,
    ParameterMapping,
};
use crate::shared::models::{
    ControlFlowGraph, MethodId, StateId, Stmt, StmtId, SymbolId, UnitId,
};

/// Priority worklist of pending statement ids. Priority is the statement's
/// reverse-post-order rank, so forward dataflow drains front to back.
#[derive(Debug, Default)]
pub struct StmtWorkList {
    heap: BinaryHeap<Reverse<(usize, StmtId)>>,
    members: FxHashSet<StmtId>,
    ranks: FxHashMap<StmtId, usize>,
}

impl StmtWorkList {
    pub fn new(ranks: FxHashMap<StmtId, usize>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            members: FxHashSet::default(),
            ranks,
        }
    }

    pub fn add(&mut self, stmt_id: StmtId) {
        if self.members.insert(stmt_id) {
            let rank = self.ranks.get(&stmt_id).copied().unwrap_or(0);
            self.heap.push(Reverse((rank, stmt_id)));
        }
    }

    pub fn add_all(&mut self, stmt_ids: impl IntoIterator<Item = StmtId>) {
        for stmt_id in stmt_ids {
            self.add(stmt_id);
        }
    }

    /// Next statement without removing it; an interruption resumes here.
    pub fn peek(&self) -> Option<StmtId> {
        self.heap.peek().map(|Reverse((_, stmt_id))| *stmt_id)
    }

    pub fn pop(&mut self) -> Option<StmtId> {
        let Reverse((_, stmt_id)) = self.heap.pop()?;
        self.members.remove(&stmt_id);
        Some(stmt_id)
    }

    pub fn contains(&self, stmt_id: StmtId) -> bool {
        self.members.contains(&stmt_id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Def→stmt / stmt→use dependency edges recorded while reaching definitions
/// are computed; tells the driver which statements to revisit when a
/// statement's states change.
#[derive(Debug, Default)]
pub struct SymbolDepGraph {
    defined_by: FxHashMap<StmtId, FxHashSet<SymbolDefNode>>,
    used_at: FxHashMap<SymbolDefNode, FxHashSet<StmtId>>,
    stmts: FxHashSet<StmtId>,
}

impl SymbolDepGraph {
    pub fn add_def_edge(&mut self, stmt_id: StmtId, def: SymbolDefNode) {
        self.defined_by.entry(stmt_id).or_default().insert(def);
        self.stmts.insert(stmt_id);
    }

    pub fn add_use_edge(&mut self, def: SymbolDefNode, stmt_id: StmtId) {
        self.used_at.entry(def).or_default().insert(stmt_id);
        self.stmts.insert(stmt_id);
    }

    pub fn has_stmt(&self, stmt_id: StmtId) -> bool {
        self.stmts.contains(&stmt_id)
    }

    /// Statements consuming any definition this statement produces.
    pub fn dependent_stmts(&self, stmt_id: StmtId) -> FxHashSet<StmtId> {
        let mut result = FxHashSet::default();
        if let Some(defs) = self.defined_by.get(&stmt_id) {
            for def in defs {
                if let Some(users) = self.used_at.get(def) {
                    result.extend(users.iter().copied());
                }
            }
        }
        result
    }
}

/// The suspend payload: a call statement needs these callees summarized
/// before the frame can continue.
#[derive(Debug, Clone)]
pub struct InterruptionData {
    pub caller_id: MethodId,
    pub call_stmt_id: StmtId,
    pub callee_ids: Vec<MethodId>,
}

/// Outcome of one statement's state computation.
#[derive(Debug, Default)]
pub struct StmtResultFlag {
    pub states_changed: bool,
    pub def_changed: bool,
    pub use_changed: bool,
    pub interruption: Option<InterruptionData>,
}

impl StmtResultFlag {
    pub fn interrupted(data: InterruptionData) -> Self {
        Self {
            interruption: Some(data),
            ..Default::default()
        }
    }
}

/// Activation record for one procedure analysis.
pub struct ComputeFrame {
    pub method_id: MethodId,
    pub caller_id: MethodId,
    pub call_stmt_id: StmtId,
    pub unit_id: UnitId,
    pub has_been_inited: bool,

    pub cfg: ControlFlowGraph,
    pub stmts: FxHashMap<StmtId, Stmt>,
    pub worklist: StmtWorkList,
    /// Statements whose inputs changed since they last ran.
    pub symbol_changed_stmts: FxHashSet<StmtId>,
    pub statuses: FxHashMap<StmtId, StmtStatus>,
    pub space: SymbolStateSpace,

    pub all_symbol_defs: FxHashSet<SymbolDefNode>,
    pub all_state_defs: FxHashSet<StateDefNode>,
    pub symbol_to_define: FxHashMap<SymbolId, FxHashSet<SymbolDefNode>>,
    pub state_to_define: FxHashMap<StateId, FxHashSet<StateDefNode>>,
    pub symbol_bits: BitVectorManager<SymbolDefNode>,
    pub state_bits: BitVectorManager<StateDefNode>,
    pub symbol_graph: SymbolDepGraph,

    pub def_use_summary: MethodDefUseSummary,
    pub summary_template: MethodSummaryTemplate,
    pub summary_instance: MethodSummaryInstance,

    /// Per-statement analysis round; the termination guard.
    pub stmt_counters: FxHashMap<StmtId, u32>,
    /// Round caps for statements first reached through a loop back-edge.
    pub loop_total_rounds: FxHashMap<StmtId, u32>,

    pub callee_info: FxHashMap<StmtId, MethodInternalCallee>,
    pub all_local_symbol_ids: FxHashSet<SymbolId>,

    /// Parameter bindings for this frame's call site, rewritten so the
    /// argument indices point into this frame's own arena.
    pub bound_parameters: Vec<ParameterMapping>,

    /// Argument states extracted from the caller, waiting to be appended
    /// into this frame's arena once it initializes.
    pub pending_argument_space: Option<(SymbolStateSpace, Vec<ParameterMapping>)>,

    /// ANYTHING placeholder bookkeeping for external symbols.
    pub initial_state_to_external_symbol: FxHashMap<StateId, SymbolId>,
    pub external_symbol_to_initial_state_index: FxHashMap<SymbolId, usize>,

    pub interruption_flag: bool,
    /// (caller, call stmt, callee) → already pushed? Each triple is only
    /// ever scheduled once per frame.
    pub content_to_be_analyzed: FxHashMap<CallSiteKey, bool>,

    /// Concrete call chain that reached this frame (interprocedural phase).
    pub path: CallPath,

    /// Callee results collected while this frame was suspended.
    pub summary_collection: FxHashMap<CallSiteKey, MethodSummaryInstance>,
    pub space_collection: FxHashMap<CallSiteKey, SymbolStateSpace>,
}

impl ComputeFrame {
    pub fn new(method_id: MethodId, caller_id: MethodId, call_stmt_id: StmtId) -> Self {
        Self {
            method_id,
            caller_id,
            call_stmt_id,
            unit_id: -1,
            has_been_inited: false,
            cfg: ControlFlowGraph::new(method_id),
            stmts: FxHashMap::default(),
            worklist: StmtWorkList::default(),
            symbol_changed_stmts: FxHashSet::default(),
            statuses: FxHashMap::default(),
            space: SymbolStateSpace::new(),
            all_symbol_defs: FxHashSet::default(),
            all_state_defs: FxHashSet::default(),
            symbol_to_define: FxHashMap::default(),
            state_to_define: FxHashMap::default(),
            symbol_bits: BitVectorManager::new(),
            state_bits: BitVectorManager::new(),
            symbol_graph: SymbolDepGraph::default(),
            def_use_summary: MethodDefUseSummary::new(method_id),
            summary_template: MethodSummaryTemplate::new(method_id),
            summary_instance: MethodSummaryInstance::from_template(
                (caller_id, call_stmt_id, method_id),
                &MethodSummaryTemplate::new(method_id),
            ),
            stmt_counters: FxHashMap::default(),
            loop_total_rounds: FxHashMap::default(),
            callee_info: FxHashMap::default(),
            all_local_symbol_ids: FxHashSet::default(),
            bound_parameters: Vec::new(),
            pending_argument_space: None,
            initial_state_to_external_symbol: FxHashMap::default(),
            external_symbol_to_initial_state_index: FxHashMap::default(),
            interruption_flag: false,
            content_to_be_analyzed: FxHashMap::default(),
            path: CallPath::root(method_id),
            summary_collection: FxHashMap::default(),
            space_collection: FxHashMap::default(),
        }
    }

    pub fn call_site(&self) -> CallSiteKey {
        (self.caller_id, self.call_stmt_id, self.method_id)
    }

    /// The statement the frame is currently parked on.
    pub fn current_stmt_id(&self) -> Option<StmtId> {
        self.worklist.peek()
    }
}

/// Explicit, growable stack of compute frames.
#[derive(Default)]
pub struct ComputeFrameStack {
    frames: Vec<ComputeFrame>,
}

impl ComputeFrameStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ComputeFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ComputeFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&ComputeFrame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ComputeFrame> {
        self.frames.last_mut()
    }

    pub fn get(&self, index: usize) -> Option<&ComputeFrame> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn has_method(&self, method_id: MethodId) -> bool {
        self.frames.iter().any(|f| f.method_id == method_id)
    }

    /// Split into (frame at `index`, top frame). Used when resolution reads
    /// or extends an enclosing frame while appending into the top one.
    /// Panics if `index` is the top.
    pub fn split_frame_and_top(
        &mut self,
        index: usize,
    ) -> (&mut ComputeFrame, &mut ComputeFrame) {
        let top = self.frames.len() - 1;
        assert!(index < top, "index must be below the top frame");
        let (lower, upper) = self.frames.split_at_mut(index + 1);
        (&mut lower[index], upper.last_mut().expect("non-empty top"))
    }

    pub fn frames(&self) -> &[ComputeFrame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [ComputeFrame] {
        &mut self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worklist_orders_by_rank() {
        let mut ranks = FxHashMap::default();
        ranks.insert(30, 2);
        ranks.insert(10, 0);
        ranks.insert(20, 1);
        let mut worklist = StmtWorkList::new(ranks);
        worklist.add(30);
        worklist.add(10);
        worklist.add(20);

        assert_eq!(worklist.pop(), Some(10));
        assert_eq!(worklist.pop(), Some(20));
        assert_eq!(worklist.pop(), Some(30));
        assert_eq!(worklist.pop(), None);
    }

    #[test]
    fn test_worklist_dedups_members() {
        let mut worklist = StmtWorkList::default();
        worklist.add(5);
        worklist.add(5);
        assert_eq!(worklist.len(), 1);
        assert_eq!(worklist.peek(), Some(5));
        // peek does not remove
        assert_eq!(worklist.len(), 1);
    }

    #[test]
    fn test_stack_split_frame_and_top() {
        let mut stack = ComputeFrameStack::new();
        stack.push(ComputeFrame::new(1, -1, -1));
        stack.push(ComputeFrame::new(2, 1, 10));
        let (below, top) = stack.split_frame_and_top(0);
        assert_eq!(below.method_id, 1);
        assert_eq!(top.method_id, 2);
    }

    #[test]
    fn test_stack_has_method() {
        let mut stack = ComputeFrameStack::new();
        stack.push(ComputeFrame::new(1, -1, -1));
        assert!(stack.has_method(1));
        assert!(!stack.has_method(2));
        stack.pop();
        assert!(!stack.has_method(1));
    }

    #[test]
    fn test_symbol_dep_graph_dependents() {
        let mut graph = SymbolDepGraph::default();
        let def = SymbolDefNode::new(0, 7, 10);
        graph.add_def_edge(10, def);
        graph.add_use_edge(def, 20);
        graph.add_use_edge(def, 30);
        let dependents = graph.dependent_stmts(10);
        assert!(dependents.contains(&20) && dependents.contains(&30));
        assert!(graph.has_stmt(10));
    }
}
