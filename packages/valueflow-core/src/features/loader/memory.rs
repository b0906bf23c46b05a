//! In-memory program database and its builder.
//!
//! The stand-in for the out-of-scope front ends and storage layer: tests and
//! embedders describe a program as IR statements, and the builder derives
//! the per-unit scope tables and per-method control-flow graphs the engine
//! consumes.

use rustc_hash::{FxHashMap, FxHashSet};

use super::ports::{MethodIr, ProgramDb};
use crate::features::summary::ParameterInfo;
use crate::shared::models::{
    ControlFlowGraph, ControlFlowKind, MethodId, Operand, SourceSymbolInfo, Stmt, StmtId,
    StmtKind, SymbolId, UnitId, UnitSymbolDeclSummary, GLOBAL_SCOPE_ID,
};

#[derive(Debug, Clone)]
struct MethodRecord {
    unit_id: UnitId,
    name: String,
    ir: MethodIr,
    cfg: ControlFlowGraph,
    parameters: Vec<ParameterInfo>,
}

/// In-memory implementation of [`ProgramDb`].
#[derive(Debug, Default)]
pub struct MemoryProgramDb {
    units: Vec<UnitId>,
    unit_names: FxHashMap<UnitId, String>,
    methods: FxHashMap<MethodId, MethodRecord>,
    method_order: Vec<MethodId>,
    decl_summaries: FxHashMap<UnitId, UnitSymbolDeclSummary>,
    imports: FxHashMap<(UnitId, String), SourceSymbolInfo>,
    import_stmts: FxHashSet<StmtId>,
    class_decls: FxHashSet<StmtId>,
    entry_points: Vec<MethodId>,
}

impl ProgramDb for MemoryProgramDb {
    fn units(&self) -> Vec<UnitId> {
        self.units.clone()
    }

    fn methods(&self) -> Vec<MethodId> {
        self.method_order.clone()
    }

    fn method_unit(&self, method_id: MethodId) -> Option<UnitId> {
        self.methods.get(&method_id).map(|m| m.unit_id)
    }

    fn method_name(&self, method_id: MethodId) -> Option<&str> {
        self.methods.get(&method_id).map(|m| m.name.as_str())
    }

    fn method_ir(&self, method_id: MethodId) -> Option<&MethodIr> {
        self.methods.get(&method_id).map(|m| &m.ir)
    }

    fn method_cfg(&self, method_id: MethodId) -> Option<&ControlFlowGraph> {
        self.methods.get(&method_id).map(|m| &m.cfg)
    }

    fn method_parameters(&self, method_id: MethodId) -> Vec<ParameterInfo> {
        self.methods
            .get(&method_id)
            .map(|m| m.parameters.clone())
            .unwrap_or_default()
    }

    fn unit_symbol_decl_summary(&self, unit_id: UnitId) -> Option<&UnitSymbolDeclSummary> {
        self.decl_summaries.get(&unit_id)
    }

    fn resolve_import(&self, unit_id: UnitId, name: &str) -> Option<SourceSymbolInfo> {
        self.imports.get(&(unit_id, name.to_string())).copied()
    }

    fn is_import_stmt(&self, stmt_id: StmtId) -> bool {
        self.import_stmts.contains(&stmt_id)
    }

    fn is_method_decl(&self, id: SymbolId) -> bool {
        self.methods.contains_key(&id)
    }

    fn is_class_decl(&self, id: SymbolId) -> bool {
        self.class_decls.contains(&id)
    }

    fn is_unit_id(&self, id: SymbolId) -> bool {
        self.unit_names.contains_key(&id)
    }

    fn is_parameter_decl_of(&self, symbol_id: SymbolId, method_id: MethodId) -> bool {
        self.methods
            .get(&method_id)
            .map(|m| m.parameters.iter().any(|p| p.symbol_id == symbol_id))
            .unwrap_or(false)
    }

    fn entry_points(&self) -> Vec<MethodId> {
        self.entry_points.clone()
    }
}

/// Open control construct inside a method being built.
enum ControlCtx {
    If {
        header: StmtId,
        then_exits: Option<Vec<(StmtId, ControlFlowKind)>>,
    },
    Loop {
        header: StmtId,
    },
}

/// Method under construction.
struct MethodCtx {
    method_id: MethodId,
    unit_id: UnitId,
    name: String,
    parameter_decls: Vec<Stmt>,
    body: Vec<Stmt>,
    parameters: Vec<ParameterInfo>,
    cfg: ControlFlowGraph,
    /// Dangling exits waiting for the next statement.
    pending: Vec<(StmtId, ControlFlowKind)>,
    control: Vec<ControlCtx>,
}

/// Builds a [`MemoryProgramDb`] statement by statement, deriving scope
/// tables and CFGs along the way.
pub struct ProgramBuilder {
    db: MemoryProgramDb,
    next_id: i64,
    current: Option<MethodCtx>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self {
            db: MemoryProgramDb::default(),
            next_id: 1,
            current: None,
        }
    }

    fn fresh_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_unit(&mut self, name: impl Into<String>) -> UnitId {
        let unit_id = self.fresh_id();
        self.db.units.push(unit_id);
        self.db.unit_names.insert(unit_id, name.into());
        let mut summary = UnitSymbolDeclSummary::new(unit_id);
        summary.add_visible_scope(GLOBAL_SCOPE_ID, GLOBAL_SCOPE_ID);
        self.db.decl_summaries.insert(unit_id, summary);
        unit_id
    }

    /// Declare a class in the unit's global scope.
    pub fn add_class(&mut self, unit_id: UnitId, name: &str) -> StmtId {
        let class_id = self.fresh_id();
        self.db.class_decls.insert(class_id);
        if let Some(summary) = self.db.decl_summaries.get_mut(&unit_id) {
            summary.add_declaration(GLOBAL_SCOPE_ID, name, class_id);
        }
        class_id
    }

    /// Import `source_name` from `source_unit` as `name` into `unit_id`.
    /// The imported name must already be declared in the source unit.
    pub fn add_import(
        &mut self,
        unit_id: UnitId,
        name: &str,
        source_unit: UnitId,
        source_name: &str,
    ) -> StmtId {
        let import_stmt_id = self.fresh_id();
        self.db.import_stmts.insert(import_stmt_id);
        if let Some(summary) = self.db.decl_summaries.get_mut(&unit_id) {
            summary.add_declaration(GLOBAL_SCOPE_ID, name, import_stmt_id);
        }
        let target = self
            .db
            .decl_summaries
            .get(&source_unit)
            .and_then(|s| s.scope_id_to_symbol_info.get(&GLOBAL_SCOPE_ID))
            .and_then(|scope| scope.get(source_name))
            .copied();
        if let Some(decl) = target {
            self.db
                .imports
                .insert((unit_id, name.to_string()), SourceSymbolInfo::new(source_unit, decl));
        }
        import_stmt_id
    }

    /// Start a method in `unit_id`'s global scope; parameters are declared
    /// in the method's own scope.
    pub fn begin_method(&mut self, unit_id: UnitId, name: &str, params: &[&str]) -> MethodId {
        assert!(self.current.is_none(), "finish the previous method first");
        let method_id = self.fresh_id();

        let summary = self
            .db
            .decl_summaries
            .get_mut(&unit_id)
            .expect("unknown unit");
        summary.add_declaration(GLOBAL_SCOPE_ID, name, method_id);
        summary.add_visible_scope(method_id, method_id);
        summary.add_visible_scope(method_id, GLOBAL_SCOPE_ID);

        self.current = Some(MethodCtx {
            method_id,
            unit_id,
            name: name.to_string(),
            parameter_decls: Vec::new(),
            body: Vec::new(),
            parameters: Vec::new(),
            cfg: ControlFlowGraph::new(method_id),
            pending: Vec::new(),
            control: Vec::new(),
        });

        for (position, param) in params.iter().enumerate() {
            self.add_parameter(position, param, None);
        }
        method_id
    }

    fn add_parameter(&mut self, position: usize, name: &str, default_value: Option<Operand>) {
        let stmt_id = self.fresh_id();
        let ctx = self.current.as_mut().expect("no open method");
        let stmt = Stmt::new(
            stmt_id,
            ctx.method_id,
            StmtKind::ParameterDecl {
                name: name.to_string(),
                data_type: String::new(),
                default_value: default_value.clone(),
                packed_positional: false,
                packed_named: false,
            },
        );
        ctx.cfg.add_node(stmt_id);
        for (src, kind) in ctx.pending.drain(..) {
            ctx.cfg.add_edge(src, stmt_id, kind);
        }
        ctx.pending.push((stmt_id, ControlFlowKind::Normal));
        ctx.parameter_decls.push(stmt);
        ctx.parameters.push(ParameterInfo {
            method_id: ctx.method_id,
            position,
            name: name.to_string(),
            symbol_id: stmt_id,
            packed_positional: false,
            packed_named: false,
            has_default: default_value.is_some(),
        });
        let method_id = ctx.method_id;
        let unit_id = ctx.unit_id;
        if let Some(summary) = self.db.decl_summaries.get_mut(&unit_id) {
            summary.add_declaration(method_id, name, stmt_id);
        }
    }

    /// Append one body statement; wires it after every dangling exit.
    pub fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let stmt_id = self.fresh_id();
        let ctx = self.current.as_mut().expect("no open method");
        let method_id = ctx.method_id;
        let unit_id = ctx.unit_id;

        // targets bind as method locals on first write (front-end policy)
        let declared: Option<String> = match &kind {
            StmtKind::Assign { target, .. }
            | StmtKind::Call { target, .. }
            | StmtKind::NewObject { target, .. }
            | StmtKind::NewArray { target }
            | StmtKind::NewRecord { target }
            | StmtKind::FieldRead { target, .. }
            | StmtKind::ArrayRead { target, .. }
            | StmtKind::ForIn { target, .. } => Some(target.clone()),
            StmtKind::VariableDecl { name, .. } => Some(name.clone()),
            _ => None,
        };

        ctx.cfg.add_node(stmt_id);
        for (src, edge_kind) in ctx.pending.drain(..) {
            ctx.cfg.add_edge(src, stmt_id, edge_kind);
        }
        let is_terminator = matches!(kind, StmtKind::Return { .. } | StmtKind::Throw { .. });
        if !is_terminator {
            ctx.pending.push((stmt_id, ControlFlowKind::Normal));
        }
        ctx.body.push(Stmt::new(stmt_id, method_id, kind));

        if let Some(name) = declared {
            if !name.starts_with('%') {
                if let Some(summary) = self.db.decl_summaries.get_mut(&unit_id) {
                    let already = summary
                        .scope_id_to_symbol_info
                        .get(&method_id)
                        .map(|scope| scope.contains_key(&name))
                        .unwrap_or(false);
                    if !already {
                        summary.add_declaration(method_id, &name, stmt_id);
                    }
                }
            }
        }
        stmt_id
    }

    /// `if cond { ... }` — call `else_branch`/`end_if` to close.
    pub fn begin_if(&mut self, condition: Operand) -> StmtId {
        let header = self.stmt(StmtKind::If { condition });
        let ctx = self.current.as_mut().unwrap();
        ctx.pending.clear();
        ctx.pending.push((header, ControlFlowKind::TrueBranch));
        ctx.control.push(ControlCtx::If {
            header,
            then_exits: None,
        });
        header
    }

    pub fn else_branch(&mut self) {
        let ctx = self.current.as_mut().expect("no open method");
        let exits = std::mem::take(&mut ctx.pending);
        match ctx.control.last_mut() {
            Some(ControlCtx::If { header, then_exits }) => {
                *then_exits = Some(exits);
                let header = *header;
                ctx.pending.push((header, ControlFlowKind::FalseBranch));
            }
            _ => panic!("else outside if"),
        }
    }

    pub fn end_if(&mut self) {
        let ctx = self.current.as_mut().expect("no open method");
        match ctx.control.pop() {
            Some(ControlCtx::If { header, then_exits }) => match then_exits {
                Some(mut exits) => {
                    exits.append(&mut ctx.pending);
                    ctx.pending = exits;
                }
                None => {
                    ctx.pending.push((header, ControlFlowKind::FalseBranch));
                }
            },
            _ => panic!("end_if outside if"),
        }
    }

    /// `while cond { ... }` — close with `end_loop`.
    pub fn begin_while(&mut self, condition: Operand) -> StmtId {
        let header = self.stmt(StmtKind::While { condition });
        let ctx = self.current.as_mut().unwrap();
        ctx.pending.clear();
        ctx.pending.push((header, ControlFlowKind::TrueBranch));
        ctx.control.push(ControlCtx::Loop { header });
        header
    }

    pub fn end_loop(&mut self) {
        let ctx = self.current.as_mut().expect("no open method");
        match ctx.control.pop() {
            Some(ControlCtx::Loop { header }) => {
                for (src, _) in ctx.pending.drain(..) {
                    ctx.cfg.add_edge(src, header, ControlFlowKind::LoopBack);
                }
                ctx.pending.push((header, ControlFlowKind::FalseBranch));
            }
            _ => panic!("end_loop outside loop"),
        }
    }

    /// Finish the open method and return its id.
    pub fn end_method(&mut self) -> MethodId {
        let ctx = self.current.take().expect("no open method");
        assert!(ctx.control.is_empty(), "unclosed control construct");
        let method_id = ctx.method_id;
        self.db.methods.insert(
            method_id,
            MethodRecord {
                unit_id: ctx.unit_id,
                name: ctx.name,
                ir: MethodIr {
                    parameter_decls: ctx.parameter_decls,
                    body: ctx.body,
                },
                cfg: ctx.cfg,
                parameters: ctx.parameters,
            },
        );
        self.db.method_order.push(method_id);
        method_id
    }

    pub fn add_entry_point(&mut self, method_id: MethodId) {
        self.db.entry_points.push(method_id);
    }

    pub fn build(self) -> MemoryProgramDb {
        assert!(self.current.is_none(), "finish the open method first");
        self.db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_wires_sequential_cfg() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        builder.begin_method(unit, "f", &["p"]);
        let first = builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::int(1),
            operand2: None,
        });
        let second = builder.stmt(StmtKind::Return {
            value: Some(Operand::var("a")),
        });
        let f = builder.end_method();
        let db = builder.build();

        let cfg = db.method_cfg(f).unwrap();
        assert_eq!(cfg.edge_kind(first, second), Some(ControlFlowKind::Normal));
        // parameter decl flows into the body
        assert_eq!(cfg.exit_nodes(), vec![second]);
    }

    #[test]
    fn test_builder_wires_loop_back_edge() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        builder.begin_method(unit, "f", &[]);
        let header = builder.begin_while(Operand::var("c"));
        let body = builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::int(1),
            operand2: None,
        });
        builder.end_loop();
        let after = builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let cfg = db.method_cfg(db.methods()[0]).unwrap();
        assert_eq!(cfg.edge_kind(body, header), Some(ControlFlowKind::LoopBack));
        assert_eq!(
            cfg.edge_kind(header, after),
            Some(ControlFlowKind::FalseBranch)
        );
    }

    #[test]
    fn test_scope_tables_record_params_and_locals() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &["p"]);
        builder.stmt(StmtKind::Assign {
            target: "local".into(),
            operator: None,
            operand: Operand::var("p"),
            operand2: None,
        });
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let summary = db.unit_symbol_decl_summary(unit).unwrap();
        assert!(summary.scope_id_to_symbol_info[&f].contains_key("p"));
        assert!(summary.scope_id_to_symbol_info[&f].contains_key("local"));
        assert!(summary.scope_id_to_symbol_info[&GLOBAL_SCOPE_ID].contains_key("f"));
        let param_id = summary.scope_id_to_symbol_info[&f]["p"];
        assert!(db.is_parameter_decl_of(param_id, f));
    }

    #[test]
    fn test_import_resolution() {
        let mut builder = ProgramBuilder::new();
        let lib = builder.add_unit("lib");
        builder.begin_method(lib, "helper", &[]);
        builder.stmt(StmtKind::Return { value: None });
        let helper = builder.end_method();

        let main = builder.add_unit("main");
        let import_stmt = builder.add_import(main, "helper", lib, "helper");
        let db = builder.build();

        assert!(db.is_import_stmt(import_stmt));
        let info = db.resolve_import(main, "helper").unwrap();
        assert_eq!(info.symbol_id, helper);
        assert_eq!(info.source_unit_id, lib);
    }
}
