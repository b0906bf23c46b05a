//! The program-database port.
//!
//! Everything the engine consumes from the front-end/storage collaborators,
//! read-only. Implementations load parse results from wherever they live;
//! the engine never sees past this trait.

use crate::features::summary::ParameterInfo;
use crate::shared::models::{
    ControlFlowGraph, MethodId, SourceSymbolInfo, Stmt, StmtId, SymbolId, UnitId,
    UnitSymbolDeclSummary,
};

/// IR of one method: parameter declarations first, then the body.
#[derive(Debug, Clone, Default)]
pub struct MethodIr {
    pub parameter_decls: Vec<Stmt>,
    pub body: Vec<Stmt>,
}

impl MethodIr {
    pub fn all_stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.parameter_decls.iter().chain(self.body.iter())
    }
}

/// Read-only program database (loader/front-end collaborator).
pub trait ProgramDb {
    fn units(&self) -> Vec<UnitId>;
    fn methods(&self) -> Vec<MethodId>;

    fn method_unit(&self, method_id: MethodId) -> Option<UnitId>;
    fn method_name(&self, method_id: MethodId) -> Option<&str>;
    fn method_ir(&self, method_id: MethodId) -> Option<&MethodIr>;
    fn method_cfg(&self, method_id: MethodId) -> Option<&ControlFlowGraph>;
    fn method_parameters(&self, method_id: MethodId) -> Vec<ParameterInfo>;

    fn unit_symbol_decl_summary(&self, unit_id: UnitId) -> Option<&UnitSymbolDeclSummary>;

    /// Follow the unit's import/export graph to the real declaration of
    /// `name` imported into `unit_id`.
    fn resolve_import(&self, unit_id: UnitId, name: &str) -> Option<SourceSymbolInfo>;

    fn is_import_stmt(&self, stmt_id: StmtId) -> bool;
    fn is_method_decl(&self, id: SymbolId) -> bool;
    fn is_class_decl(&self, id: SymbolId) -> bool;
    fn is_unit_id(&self, id: SymbolId) -> bool;
    fn is_parameter_decl_of(&self, symbol_id: SymbolId, method_id: MethodId) -> bool;

    /// Methods the interprocedural phase starts from.
    fn entry_points(&self) -> Vec<MethodId>;
}
