//! Summary templates and call-site instances.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::shared::models::{MethodId, StmtId, SymbolId};

/// (caller, call statement, callee) — the key under which call-site-specific
/// artifacts persist.
pub type CallSiteKey = (MethodId, StmtId, MethodId);

/// A summary entry: the state's index in the arena the summary was generated
/// from (`raw_index`) and its index after relocation into a compact space
/// (`new_index`, `None` until `adjust_ids` ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexMapInSummary {
    pub raw_index: usize,
    pub new_index: Option<usize>,
    /// Set when the entry stands for a parameter's default value.
    pub default_value_symbol_id: Option<SymbolId>,
}

impl IndexMapInSummary {
    pub fn raw(raw_index: usize) -> Self {
        Self {
            raw_index,
            new_index: None,
            default_value_symbol_id: None,
        }
    }
}

/// Call-site-independent effect summary of one method.
///
/// Each map goes from a symbol id to the (raw, relocated) state-index pairs
/// the symbol may end at when the method exits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodSummaryTemplate {
    pub method_id: MethodId,
    pub parameter_symbols: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    pub defined_external_symbols: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    pub used_external_symbols: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    pub return_symbols: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    /// Symbols whose states must be re-resolved at every apply site.
    pub key_dynamic_content: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    pub this_symbols: FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
    /// Call statements whose callee set could not be statically fixed.
    pub dynamic_call_stmts: FxHashSet<StmtId>,
    /// external symbol id → arena index of its initial placeholder state.
    pub external_symbol_to_state: FxHashMap<SymbolId, usize>,
}

impl MethodSummaryTemplate {
    pub fn new(method_id: MethodId) -> Self {
        Self {
            method_id,
            ..Default::default()
        }
    }

    fn records_mut(
        &mut self,
    ) -> [&mut FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>; 6] {
        [
            &mut self.parameter_symbols,
            &mut self.defined_external_symbols,
            &mut self.used_external_symbols,
            &mut self.return_symbols,
            &mut self.key_dynamic_content,
            &mut self.this_symbols,
        ]
    }

    /// Fill in `new_index` for every entry from an extraction's old→new map.
    pub fn adjust_ids(&mut self, old_to_new: &FxHashMap<usize, usize>) {
        for record in self.records_mut() {
            for entries in record.values_mut() {
                let adjusted: FxHashSet<IndexMapInSummary> = entries
                    .iter()
                    .map(|entry| IndexMapInSummary {
                        raw_index: entry.raw_index,
                        new_index: old_to_new.get(&entry.raw_index).copied(),
                        default_value_symbol_id: entry.default_value_symbol_id,
                    })
                    .collect();
                *entries = adjusted;
            }
        }
    }

    /// All raw indices referenced anywhere in the summary.
    pub fn all_raw_indexes(&self) -> FxHashSet<usize> {
        let mut result = FxHashSet::default();
        for record in [
            &self.parameter_symbols,
            &self.defined_external_symbols,
            &self.used_external_symbols,
            &self.return_symbols,
            &self.key_dynamic_content,
            &self.this_symbols,
        ] {
            for entries in record.values() {
                result.extend(entries.iter().map(|e| e.raw_index));
            }
        }
        result
    }

    pub fn add_entry(
        record: &mut FxHashMap<SymbolId, FxHashSet<IndexMapInSummary>>,
        symbol_id: SymbolId,
        entry: IndexMapInSummary,
    ) {
        record.entry(symbol_id).or_default().insert(entry);
    }
}

/// Call-site-specific summary: the template re-evaluated with the caller's
/// actual arguments and enclosing-frame context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSummaryInstance {
    pub call_site: CallSiteKey,
    pub summary: MethodSummaryTemplate,
    /// placeholder-state index → resolved state indices, recorded when an
    /// ANYTHING state was re-resolved against the frame stack.
    pub resolved_placeholders: FxHashMap<usize, FxHashSet<usize>>,
}

impl MethodSummaryInstance {
    pub fn from_template(call_site: CallSiteKey, template: &MethodSummaryTemplate) -> Self {
        Self {
            call_site,
            summary: template.clone(),
            resolved_placeholders: FxHashMap::default(),
        }
    }

    pub fn caller_id(&self) -> MethodId {
        self.call_site.0
    }

    pub fn call_stmt_id(&self) -> StmtId {
        self.call_site.1
    }

    pub fn method_id(&self) -> MethodId {
        self.call_site.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_ids_maps_raw_to_new() {
        let mut template = MethodSummaryTemplate::new(1);
        MethodSummaryTemplate::add_entry(
            &mut template.parameter_symbols,
            7,
            IndexMapInSummary::raw(3),
        );
        MethodSummaryTemplate::add_entry(
            &mut template.return_symbols,
            -3,
            IndexMapInSummary::raw(5),
        );

        let mut old_to_new = FxHashMap::default();
        old_to_new.insert(3usize, 0usize);
        old_to_new.insert(5usize, 1usize);
        template.adjust_ids(&old_to_new);

        let entry = template.parameter_symbols[&7].iter().next().unwrap();
        assert_eq!(entry.new_index, Some(0));
        let ret = template.return_symbols[&-3].iter().next().unwrap();
        assert_eq!(ret.new_index, Some(1));
    }

    #[test]
    fn test_all_raw_indexes_spans_every_record() {
        let mut template = MethodSummaryTemplate::new(1);
        MethodSummaryTemplate::add_entry(
            &mut template.this_symbols,
            -9,
            IndexMapInSummary::raw(2),
        );
        MethodSummaryTemplate::add_entry(
            &mut template.used_external_symbols,
            12,
            IndexMapInSummary::raw(9),
        );
        let raw = template.all_raw_indexes();
        assert!(raw.contains(&2) && raw.contains(&9));
    }
}
