//! Per-unit scope and declaration summaries.
//!
//! Produced by the front-end collaborator; consumed read-only by the
//! resolver when mapping a name at a program point to its declaring entity.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::stmt::{ScopeId, StmtId, SymbolId, UnitId};

/// Declaration tables of one unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitSymbolDeclSummary {
    pub unit_id: UnitId,

    /// name → scopes that declare it
    pub symbol_name_to_scope_ids: FxHashMap<String, FxHashSet<ScopeId>>,

    /// scope → name → declaring statement
    pub scope_id_to_symbol_info: FxHashMap<ScopeId, FxHashMap<String, StmtId>>,

    /// scope → scopes visible from it (itself plus enclosing chain)
    pub scope_id_to_available_scope_ids: FxHashMap<ScopeId, FxHashSet<ScopeId>>,
}

impl UnitSymbolDeclSummary {
    pub fn new(unit_id: UnitId) -> Self {
        Self {
            unit_id,
            ..Default::default()
        }
    }

    /// Record one declaration of `name` in `scope` at `decl_stmt_id`.
    pub fn add_declaration(&mut self, scope: ScopeId, name: &str, decl_stmt_id: StmtId) {
        self.symbol_name_to_scope_ids
            .entry(name.to_string())
            .or_default()
            .insert(scope);
        self.scope_id_to_symbol_info
            .entry(scope)
            .or_default()
            .insert(name.to_string(), decl_stmt_id);
    }

    /// Record that `scope` can see `visible` (including itself).
    pub fn add_visible_scope(&mut self, scope: ScopeId, visible: ScopeId) {
        self.scope_id_to_available_scope_ids
            .entry(scope)
            .or_default()
            .insert(visible);
    }
}

/// Where a name actually comes from: unit + declaring statement. A negative
/// `symbol_id` means the name stayed unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSymbolInfo {
    pub source_unit_id: UnitId,
    pub symbol_id: SymbolId,
}

impl SourceSymbolInfo {
    pub fn new(source_unit_id: UnitId, symbol_id: SymbolId) -> Self {
        Self {
            source_unit_id,
            symbol_id,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.symbol_id >= 0
    }
}

/// One resolved import edge: `name` in `unit_id` refers to `source_symbol_id`
/// declared in `source_unit_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBinding {
    pub unit_id: UnitId,
    pub name: String,
    pub import_stmt_id: StmtId,
    pub source_unit_id: UnitId,
    pub source_symbol_id: SymbolId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_lookup_tables() {
        let mut summary = UnitSymbolDeclSummary::new(1);
        summary.add_declaration(0, "f", 10);
        summary.add_declaration(10, "x", 12);
        summary.add_visible_scope(10, 10);
        summary.add_visible_scope(10, 0);

        assert!(summary.symbol_name_to_scope_ids["x"].contains(&10));
        assert_eq!(summary.scope_id_to_symbol_info[&10]["x"], 12);
        assert!(summary.scope_id_to_available_scope_ids[&10].contains(&0));
    }
}
