//! Per-statement def/use record.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::features::bitvector::BitSet;
use crate::shared::models::StmtId;

/// Definition/use facts and reaching-definition vectors of one statement.
/// Indices point into the owning frame's arena.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StmtStatus {
    pub stmt_id: StmtId,

    /// The explicitly defined symbol, if any.
    pub defined_symbol: Option<usize>,
    pub used_symbols: Vec<usize>,
    /// Aliasing side effects discovered during state analysis.
    pub implicitly_defined_symbols: Vec<usize>,
    pub implicitly_used_symbols: Vec<usize>,

    pub in_symbol_bits: BitSet,
    pub out_symbol_bits: BitSet,

    /// States this statement (re)defined, per round.
    pub defined_states: FxHashSet<usize>,
    pub in_state_bits: BitSet,
    pub out_state_bits: BitSet,

    /// For field access statements: the accessed key.
    pub field_name: String,
}

impl StmtStatus {
    pub fn new(stmt_id: StmtId) -> Self {
        Self {
            stmt_id,
            ..Default::default()
        }
    }

    pub fn with_defined(mut self, index: usize) -> Self {
        self.defined_symbol = Some(index);
        self
    }

    pub fn with_used(mut self, used: Vec<usize>) -> Self {
        self.used_symbols = used;
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field_name = field.into();
        self
    }

    /// Explicit plus implicit definitions, explicit first.
    pub fn all_defined_symbols(&self) -> Vec<usize> {
        let mut result = Vec::with_capacity(1 + self.implicitly_defined_symbols.len());
        if let Some(index) = self.defined_symbol {
            result.push(index);
        }
        result.extend(self.implicitly_defined_symbols.iter().copied());
        result
    }

    pub fn all_used_symbols(&self) -> Vec<usize> {
        let mut result = self.used_symbols.clone();
        result.extend(self.implicitly_used_symbols.iter().copied());
        result
    }
}
