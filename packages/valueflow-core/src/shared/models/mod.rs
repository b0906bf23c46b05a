//! Shared models

pub mod cfg;
pub mod scope;
pub mod stmt;

pub use cfg::{ControlFlowGraph, ControlFlowKind};
pub use scope::{ImportBinding, SourceSymbolInfo, UnitSymbolDeclSummary};
pub use stmt::{
    ConstValue, MethodId, Operand, ScopeId, StateId, Stmt, StmtId, StmtKind, SymbolId, UnitId,
    GLOBAL_SCOPE_ID,
};
