//! Statement-level def/use analysis.
//!
//! First pass over a method: materializes a Symbol or State for every
//! operand, resolves each symbol's declaring entity, fills the per-statement
//! def/use sets, classifies callees, and registers call-graph edges. Runs
//! once per method before any state analysis.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::status::StmtStatus;
use crate::config::{IdAllocator, BUILTIN_THIS_SYMBOL_ID};
use crate::errors::{Result, ValueflowError};
use crate::features::bitvector::StateDefNode;
use crate::features::call_graph::{CallGraph, CalleeKind, MethodInternalCallee};
use crate::features::loader::{DefUseArtifacts, ProgramDb};
use crate::features::resolver::resolve_symbol_source_with_scope;
use crate::features::state_space::{State, StateValue, Symbol};
use crate::shared::models::{
    ConstValue, MethodId, Operand, Stmt, StmtId, StmtKind, SymbolId, UnitId,
};

/// Name of the implicit receiver in the IR.
pub const THIS_NAME: &str = "this";

/// Compiler temporaries are prefixed by the front ends and stay local.
pub const TMP_VARIABLE_PREFIX: char = '%';

enum DeclClass {
    NotADecl,
    Decl,
    ParameterDecl,
}

/// Per-method def/use builder.
pub struct DefUseAnalysis<'a> {
    db: &'a dyn ProgramDb,
    ids: &'a mut IdAllocator,
    /// (unit, name) → synthetic id for names with no reachable declaration;
    /// shared across methods so identity comparisons stay well-defined.
    external_symbol_ids: &'a mut FxHashMap<(UnitId, String), SymbolId>,
    call_graph: &'a mut CallGraph,

    method_id: MethodId,
    unit_id: UnitId,
    out: DefUseArtifacts,
    tmp_variable_to_define: FxHashMap<String, StmtId>,
    stmt_defined_states: FxHashSet<usize>,
}

impl<'a> DefUseAnalysis<'a> {
    pub fn new(
        db: &'a dyn ProgramDb,
        ids: &'a mut IdAllocator,
        external_symbol_ids: &'a mut FxHashMap<(UnitId, String), SymbolId>,
        call_graph: &'a mut CallGraph,
        method_id: MethodId,
    ) -> Result<Self> {
        let unit_id = db
            .method_unit(method_id)
            .ok_or_else(|| ValueflowError::missing(format!("unit of method {method_id}")))?;
        let mut out = DefUseArtifacts::default();
        out.def_use_summary.method_id = method_id;
        Ok(Self {
            db,
            ids,
            external_symbol_ids,
            call_graph,
            method_id,
            unit_id,
            out,
            tmp_variable_to_define: FxHashMap::default(),
            stmt_defined_states: FxHashSet::default(),
        })
    }

    /// Analyze every statement of the method and return the artifacts.
    pub fn run(mut self) -> Result<DefUseArtifacts> {
        let ir = self
            .db
            .method_ir(self.method_id)
            .ok_or_else(|| ValueflowError::missing(format!("ir of method {}", self.method_id)))?
            .clone();
        debug!(method_id = self.method_id, "def/use analysis");
        for stmt in ir.all_stmts() {
            self.analyze_stmt(stmt);
        }
        Ok(self.out)
    }

    // ── space helpers ────────────────────────────────────────────────

    fn create_symbol(&mut self, stmt_id: StmtId, name: &str) -> usize {
        self.out.space.add_symbol(Symbol::new(stmt_id, name))
    }

    fn create_const_state(&mut self, stmt_id: StmtId, value: ConstValue) -> usize {
        let state = State::new(stmt_id, self.ids.state_id()).with_value(StateValue::Const(value));
        let state_id = state.state_id;
        let index = self.out.space.add_state(state);
        self.out
            .state_to_define
            .entry(state_id)
            .or_default()
            .insert(StateDefNode::new(index, state_id, stmt_id));
        self.stmt_defined_states.insert(index);
        index
    }

    fn create_operand(&mut self, stmt_id: StmtId, operand: &Operand) -> usize {
        match operand {
            Operand::Var(name) => self.create_symbol(stmt_id, name),
            Operand::Const(value) => self.create_const_state(stmt_id, value.clone()),
        }
    }

    fn create_operands(&mut self, stmt_id: StmtId, operands: &[&Operand]) -> Vec<usize> {
        operands
            .iter()
            .map(|op| self.create_operand(stmt_id, op))
            .collect()
    }

    // ── symbol-id resolution ─────────────────────────────────────────

    fn synthetic_id_for(&mut self, name: &str) -> SymbolId {
        let key = (self.unit_id, name.to_string());
        if let Some(id) = self.external_symbol_ids.get(&key) {
            return *id;
        }
        let id = self.ids.synthetic_symbol_id();
        self.external_symbol_ids.insert(key, id);
        id
    }

    /// Resolve the defined symbol's declaring entity and record def facts.
    fn sync_defined_symbol(&mut self, stmt: &Stmt, status: &StmtStatus, decl: &DeclClass) {
        let Some(defined_index) = status.defined_symbol else {
            return;
        };
        let Some(symbol) = self.out.space.symbol(defined_index) else {
            return;
        };
        let name = symbol.name.clone();
        let stmt_id = stmt.stmt_id;

        let symbol_id = if name.starts_with(TMP_VARIABLE_PREFIX) {
            let id = *self
                .tmp_variable_to_define
                .entry(name.clone())
                .or_insert(stmt_id);
            self.out.def_use_summary.local_symbol_ids.insert(id);
            id
        } else if matches!(decl, DeclClass::Decl | DeclClass::ParameterDecl) {
            stmt_id
        } else if name == THIS_NAME {
            self.out
                .def_use_summary
                .defined_this_symbol_ids
                .insert(BUILTIN_THIS_SYMBOL_ID);
            BUILTIN_THIS_SYMBOL_ID
        } else {
            // an assignment target declared at this very statement is still a
            // method local, not an unresolved name
            match resolve_symbol_source_with_scope(self.db, self.unit_id, stmt, &name, false) {
                Some((info, scope)) if info.is_resolved() => {
                    if scope == self.method_id {
                        self.out.def_use_summary.local_symbol_ids.insert(info.symbol_id);
                    }
                    info.symbol_id
                }
                _ => self.synthetic_id_for(&name),
            }
        };

        if let Some(symbol) = self.out.space.symbol_mut(defined_index) {
            symbol.symbol_id = symbol_id;
            symbol.source_unit_id = self.unit_id;
        }
        self.out
            .symbol_to_define
            .entry(symbol_id)
            .or_default()
            .insert(stmt_id);

        if matches!(decl, DeclClass::ParameterDecl) {
            self.out
                .def_use_summary
                .parameter_symbol_ids
                .insert(symbol_id);
            self.out.def_use_summary.local_symbol_ids.insert(symbol_id);
        } else if matches!(decl, DeclClass::Decl) {
            self.out.def_use_summary.local_symbol_ids.insert(symbol_id);
        } else if symbol_id >= 0 && !self.out.def_use_summary.is_local(symbol_id) {
            self.out
                .def_use_summary
                .defined_external_symbol_ids
                .insert(symbol_id);
        }
    }

    fn sync_used_symbols(&mut self, stmt: &Stmt, status: &StmtStatus) {
        for used_index in status.used_symbols.clone() {
            let Some(symbol) = self.out.space.symbol(used_index) else {
                continue;
            };
            let name = symbol.name.clone();
            let stmt_id = stmt.stmt_id;

            let symbol_id = if name == THIS_NAME {
                self.out
                    .def_use_summary
                    .used_this_symbol_ids
                    .insert(BUILTIN_THIS_SYMBOL_ID);
                BUILTIN_THIS_SYMBOL_ID
            } else if name.starts_with(TMP_VARIABLE_PREFIX) {
                self.tmp_variable_to_define.get(&name).copied().unwrap_or(-1)
            } else {
                match resolve_symbol_source_with_scope(self.db, self.unit_id, stmt, &name, false) {
                    Some((info, scope)) if info.is_resolved() => {
                        if scope == self.method_id {
                            self.out.def_use_summary.local_symbol_ids.insert(info.symbol_id);
                        }
                        info.symbol_id
                    }
                    _ => self.synthetic_id_for(&name),
                }
            };

            if let Some(symbol) = self.out.space.symbol_mut(used_index) {
                symbol.symbol_id = symbol_id;
                symbol.source_unit_id = self.unit_id;
            }
            if symbol_id >= 0 {
                self.out
                    .symbol_to_use
                    .entry(symbol_id)
                    .or_default()
                    .insert(stmt_id);
                if !self.out.def_use_summary.is_local(symbol_id)
                    && symbol_id != BUILTIN_THIS_SYMBOL_ID
                {
                    self.out
                        .def_use_summary
                        .used_external_symbol_ids
                        .insert(symbol_id);
                }
            }
        }
    }

    fn finish_status(&mut self, stmt: &Stmt, mut status: StmtStatus, decl: DeclClass) {
        status.defined_states = std::mem::take(&mut self.stmt_defined_states);
        self.sync_defined_symbol(stmt, &status, &decl);
        self.sync_used_symbols(stmt, &status);
        self.out.statuses.insert(stmt.stmt_id, status);
    }

    fn empty_status(&mut self, stmt: &Stmt) {
        self.out
            .statuses
            .insert(stmt.stmt_id, StmtStatus::new(stmt.stmt_id));
    }

    // ── per-kind handlers ────────────────────────────────────────────

    fn analyze_stmt(&mut self, stmt: &Stmt) {
        self.stmt_defined_states.clear();
        let stmt_id = stmt.stmt_id;
        match &stmt.kind {
            StmtKind::Assign {
                target,
                operand,
                operand2,
                ..
            } => {
                let mut used = vec![self.create_operand(stmt_id, operand)];
                if let Some(op2) = operand2 {
                    used.push(self.create_operand(stmt_id, op2));
                }
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::Call {
                target,
                name,
                positional_args,
                named_args,
                packed_positional_arg,
                packed_named_arg,
            } => {
                let mut used = vec![self.create_symbol(stmt_id, name)];
                for arg in positional_args {
                    used.push(self.create_operand(stmt_id, arg));
                }
                for (_, arg) in named_args {
                    used.push(self.create_operand(stmt_id, arg));
                }
                if let Some(packed) = packed_positional_arg {
                    used.push(self.create_symbol(stmt_id, packed));
                }
                if let Some(packed) = packed_named_arg {
                    used.push(self.create_symbol(stmt_id, packed));
                }
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
                self.classify_callee(stmt_id);
            }

            StmtKind::Return { value } | StmtKind::Yield { value } | StmtKind::Throw { value } => {
                let used = match value {
                    Some(op) => vec![self.create_operand(stmt_id, op)],
                    None => Vec::new(),
                };
                let status = StmtStatus::new(stmt_id).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
                if stmt.is_return() {
                    self.record_return_symbol(stmt_id);
                }
            }

            StmtKind::If { condition }
            | StmtKind::While { condition }
            | StmtKind::DoWhile { condition }
            | StmtKind::For { condition }
            | StmtKind::Switch { condition }
            | StmtKind::Case { condition } => {
                let used = vec![self.create_operand(stmt_id, condition)];
                let status = StmtStatus::new(stmt_id).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::ForIn { target, receiver } => {
                let used = vec![self.create_operand(stmt_id, receiver)];
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::VariableDecl { name, data_type } => {
                let defined = self
                    .out
                    .space
                    .add_symbol(Symbol::new(stmt_id, name).with_data_type(data_type.clone()));
                let status = StmtStatus::new(stmt_id).with_defined(defined);
                self.finish_status(stmt, status, DeclClass::Decl);
            }

            StmtKind::ParameterDecl {
                name,
                data_type,
                default_value,
                ..
            } => {
                let defined = self
                    .out
                    .space
                    .add_symbol(Symbol::new(stmt_id, name).with_data_type(data_type.clone()));
                let used = match default_value {
                    Some(op) => vec![self.create_operand(stmt_id, op)],
                    None => Vec::new(),
                };
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::ParameterDecl);
            }

            StmtKind::MethodDecl { name } | StmtKind::ClassDecl { name } => {
                let defined = self.create_symbol(stmt_id, name);
                let status = StmtStatus::new(stmt_id).with_defined(defined);
                self.finish_status(stmt, status, DeclClass::Decl);
            }

            StmtKind::Import { name, alias } | StmtKind::FromImport { name, alias, .. } => {
                let local_name = alias.as_deref().unwrap_or(name);
                let defined = self.create_symbol(stmt_id, local_name);
                let status = StmtStatus::new(stmt_id).with_defined(defined);
                self.finish_status(stmt, status, DeclClass::Decl);
            }

            StmtKind::Export { name } => {
                let used = vec![self.create_symbol(stmt_id, name)];
                let status = StmtStatus::new(stmt_id).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::NewObject { target, class_name } => {
                let used = match class_name {
                    Some(name) => vec![self.create_symbol(stmt_id, name)],
                    None => Vec::new(),
                };
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::NewArray { target } | StmtKind::NewRecord { target } => {
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::FieldRead {
                target,
                receiver,
                field,
            } => {
                let used = vec![self.create_symbol(stmt_id, receiver)];
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id)
                    .with_defined(defined)
                    .with_used(used)
                    .with_field(field.clone());
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::FieldWrite {
                receiver,
                field,
                source,
            } => {
                let used = vec![
                    self.create_symbol(stmt_id, receiver),
                    self.create_operand(stmt_id, source),
                ];
                // the receiver is redefined with the written field
                let defined = self.create_symbol(stmt_id, receiver);
                let status = StmtStatus::new(stmt_id)
                    .with_defined(defined)
                    .with_used(used)
                    .with_field(field.clone());
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::ArrayRead {
                target,
                receiver,
                index,
            } => {
                let used = vec![
                    self.create_symbol(stmt_id, receiver),
                    self.create_operand(stmt_id, index),
                ];
                let defined = self.create_symbol(stmt_id, target);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::ArrayWrite {
                receiver,
                index,
                source,
            } => {
                let used = vec![
                    self.create_symbol(stmt_id, receiver),
                    self.create_operand(stmt_id, index),
                    self.create_operand(stmt_id, source),
                ];
                let defined = self.create_symbol(stmt_id, receiver);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::ArrayAppend { receiver, source } => {
                let used = vec![
                    self.create_symbol(stmt_id, receiver),
                    self.create_operand(stmt_id, source),
                ];
                let defined = self.create_symbol(stmt_id, receiver);
                let status = StmtStatus::new(stmt_id).with_defined(defined).with_used(used);
                self.finish_status(stmt, status, DeclClass::NotADecl);
            }

            StmtKind::Catch { exception } => {
                match exception {
                    Some(name) => {
                        let defined = self.create_symbol(stmt_id, name);
                        let status = StmtStatus::new(stmt_id).with_defined(defined);
                        self.finish_status(stmt, status, DeclClass::Decl);
                    }
                    None => self.empty_status(stmt),
                }
            }

            StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Goto
            | StmtKind::Block
            | StmtKind::Try
            | StmtKind::Nop => self.empty_status(stmt),
        }
    }

    fn record_return_symbol(&mut self, stmt_id: StmtId) {
        let Some(status) = self.out.statuses.get(&stmt_id) else {
            return;
        };
        let Some(&used_index) = status.used_symbols.first() else {
            return;
        };
        if let Some(symbol) = self.out.space.symbol(used_index) {
            self.out
                .def_use_summary
                .return_symbol_ids
                .insert(symbol.symbol_id);
        }
    }

    /// Classify the call name once its id is synced, and record the edge.
    fn classify_callee(&mut self, stmt_id: StmtId) {
        let Some(status) = self.out.statuses.get(&stmt_id) else {
            return;
        };
        let Some(&name_index) = status.used_symbols.first() else {
            return;
        };
        let Some(name_symbol) = self.out.space.symbol(name_index) else {
            return;
        };
        let symbol_id = name_symbol.symbol_id;

        let callee = if symbol_id < 0 {
            self.call_graph.add_error_edge(self.method_id, stmt_id);
            MethodInternalCallee {
                method_id: self.method_id,
                kind: CalleeKind::Error,
                stmt_id,
                callee_symbol_id: symbol_id,
                callee_symbol_index: name_index,
            }
        } else if self.db.is_method_decl(symbol_id) || self.db.is_class_decl(symbol_id) {
            self.call_graph.add_edge(self.method_id, symbol_id, stmt_id);
            MethodInternalCallee {
                method_id: self.method_id,
                kind: CalleeKind::Direct,
                stmt_id,
                callee_symbol_id: symbol_id,
                callee_symbol_index: name_index,
            }
        } else {
            self.call_graph.add_dynamic_edge(self.method_id, stmt_id);
            MethodInternalCallee {
                method_id: self.method_id,
                kind: CalleeKind::Dynamic,
                stmt_id,
                callee_symbol_id: symbol_id,
                callee_symbol_index: name_index,
            }
        };
        self.out.callees.push(callee);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DYNAMIC_METHOD_ID, ERROR_METHOD_ID};
    use crate::features::loader::{MemoryProgramDb, ProgramBuilder};

    fn run_def_use(
        db: &MemoryProgramDb,
        method_id: MethodId,
    ) -> (DefUseArtifacts, CallGraph, FxHashMap<(UnitId, String), SymbolId>) {
        let mut ids = IdAllocator::default();
        let mut external_ids = FxHashMap::default();
        let mut call_graph = CallGraph::new();
        let analysis =
            DefUseAnalysis::new(db, &mut ids, &mut external_ids, &mut call_graph, method_id)
                .unwrap();
        let artifacts = analysis.run().unwrap();
        (artifacts, call_graph, external_ids)
    }

    #[test]
    fn test_first_write_targets_are_locals() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &["p"]);
        let first_write = builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::var("p"),
            operand2: None,
        });
        let second_write = builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::int(2),
            operand2: None,
        });
        builder.stmt(StmtKind::Return {
            value: Some(Operand::var("a")),
        });
        builder.end_method();
        let db = builder.build();

        let (artifacts, _, _) = run_def_use(&db, f);
        let summary = &artifacts.def_use_summary;
        assert!(summary.local_symbol_ids.contains(&first_write));
        assert!(summary.defined_external_symbol_ids.is_empty());
        assert!(summary.used_external_symbol_ids.is_empty());
        // both writes define the same identity
        assert_eq!(
            artifacts.symbol_to_define[&first_write],
            [first_write, second_write].into_iter().collect()
        );
        assert!(summary.return_symbol_ids.contains(&first_write));
    }

    #[test]
    fn test_known_callee_is_direct() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let helper = builder.begin_method(unit, "helper", &[]);
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let f = builder.begin_method(unit, "f", &[]);
        let call = builder.stmt(StmtKind::Call {
            target: "r".into(),
            name: "helper".into(),
            positional_args: vec![],
            named_args: vec![],
            packed_positional_arg: None,
            packed_named_arg: None,
        });
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let (artifacts, call_graph, _) = run_def_use(&db, f);
        assert_eq!(artifacts.callees.len(), 1);
        assert_eq!(artifacts.callees[0].kind, CalleeKind::Direct);
        assert_eq!(artifacts.callees[0].callee_symbol_id, helper);
        assert!(call_graph.has_call_site(f, helper, call));
        // the callee name reads an out-of-method declaration
        assert!(artifacts
            .def_use_summary
            .used_external_symbol_ids
            .contains(&helper));
    }

    #[test]
    fn test_unknown_callee_goes_to_dynamic_sink() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &[]);
        builder.stmt(StmtKind::Call {
            target: "r".into(),
            name: "mystery".into(),
            positional_args: vec![],
            named_args: vec![],
            packed_positional_arg: None,
            packed_named_arg: None,
        });
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let (artifacts, call_graph, external_ids) = run_def_use(&db, f);
        assert_eq!(artifacts.callees[0].kind, CalleeKind::Dynamic);
        assert!(call_graph.has_edge(f, DYNAMIC_METHOD_ID));
        assert!(!call_graph.has_edge(f, ERROR_METHOD_ID));
        // the unresolved name got a stable synthetic id
        let synthetic = external_ids[&(unit, "mystery".to_string())];
        assert!(synthetic > 0);
        assert_eq!(artifacts.callees[0].callee_symbol_id, synthetic);
    }

    #[test]
    fn test_synthetic_ids_are_stable_per_name() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &[]);
        builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::var("ghost"),
            operand2: None,
        });
        builder.stmt(StmtKind::Assign {
            target: "b".into(),
            operator: None,
            operand: Operand::var("ghost"),
            operand2: None,
        });
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let (artifacts, _, external_ids) = run_def_use(&db, f);
        let synthetic = external_ids[&(unit, "ghost".to_string())];
        assert!(synthetic > 0);
        // both reads share the one id, recorded as a used external
        assert!(artifacts
            .def_use_summary
            .used_external_symbol_ids
            .contains(&synthetic));
        assert_eq!(artifacts.symbol_to_use[&synthetic].len(), 2);
    }

    #[test]
    fn test_this_maps_to_builtin_receiver_id() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &[]);
        builder.stmt(StmtKind::FieldWrite {
            receiver: THIS_NAME.into(),
            field: "x".into(),
            source: Operand::int(1),
        });
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let (artifacts, _, _) = run_def_use(&db, f);
        let summary = &artifacts.def_use_summary;
        assert!(summary
            .defined_this_symbol_ids
            .contains(&BUILTIN_THIS_SYMBOL_ID));
        assert!(summary
            .used_this_symbol_ids
            .contains(&BUILTIN_THIS_SYMBOL_ID));
    }
}
