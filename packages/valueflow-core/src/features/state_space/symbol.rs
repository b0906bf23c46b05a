//! Named references.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::shared::models::{StmtId, SymbolId, UnitId};

/// A named reference at a program point.
///
/// Symbols never hold values directly; `states` is the set of arena indices
/// the name may currently denote. Identity is `symbol_id` (the declaring
/// statement, or a synthesized id for cross-unit/global names).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub stmt_id: StmtId,
    pub name: String,
    pub default_data_type: String,
    pub states: FxHashSet<usize>,
    pub symbol_id: SymbolId,
    pub source_unit_id: UnitId,
}

impl Symbol {
    pub fn new(stmt_id: StmtId, name: impl Into<String>) -> Self {
        Self {
            stmt_id,
            name: name.into(),
            default_data_type: String::new(),
            states: FxHashSet::default(),
            symbol_id: -1,
            source_unit_id: -1,
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.default_data_type = data_type.into();
        self
    }

    /// Deep copy with a new creation site; the identity stays.
    pub fn copy_at(&self, stmt_id: StmtId) -> Self {
        Self {
            stmt_id,
            ..self.clone()
        }
    }
}
