//! Def/use-level method summary.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::shared::models::{MethodId, SymbolId};

/// Which symbol ids a method declares, touches and returns, as discovered by
/// the def/use pass. Input to summary generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodDefUseSummary {
    pub method_id: MethodId,
    pub parameter_symbol_ids: FxHashSet<SymbolId>,
    pub local_symbol_ids: FxHashSet<SymbolId>,
    pub defined_external_symbol_ids: FxHashSet<SymbolId>,
    pub used_external_symbol_ids: FxHashSet<SymbolId>,
    pub return_symbol_ids: FxHashSet<SymbolId>,
    pub defined_this_symbol_ids: FxHashSet<SymbolId>,
    pub used_this_symbol_ids: FxHashSet<SymbolId>,
}

impl MethodDefUseSummary {
    pub fn new(method_id: MethodId) -> Self {
        Self {
            method_id,
            ..Default::default()
        }
    }

    pub fn is_local(&self, symbol_id: SymbolId) -> bool {
        self.local_symbol_ids.contains(&symbol_id)
            || self.parameter_symbol_ids.contains(&symbol_id)
    }
}
