//! Persisted analysis artifacts.
//!
//! Everything the phases emit, keyed by stable integer ids (`method_id`, or
//! the (caller, call stmt, callee) triple for call-site-specific data) so a
//! later phase or an external consumer can reload and splice without
//! re-analysis. In-memory here; a durable backend is a collaborator concern.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{Result, ValueflowError};
use crate::features::bitvector::StateDefNode;
use crate::features::call_graph::{CallGraph, MethodInternalCallee};
use crate::features::call_path::CallPath;
use crate::features::def_use::StmtStatus;
use crate::features::state_space::SymbolStateSpace;
use crate::features::summary::{
    CallSiteKey, MethodDefUseSummary, MethodSummaryInstance, MethodSummaryTemplate,
    ParameterMapping,
};
use crate::shared::models::{MethodId, StateId, StmtId, SymbolId};

/// Per-method output of the def/use pass.
#[derive(Debug, Clone, Default)]
pub struct DefUseArtifacts {
    pub statuses: FxHashMap<StmtId, StmtStatus>,
    pub space: SymbolStateSpace,
    pub symbol_to_define: FxHashMap<SymbolId, FxHashSet<StmtId>>,
    pub symbol_to_use: FxHashMap<SymbolId, FxHashSet<StmtId>>,
    pub state_to_define: FxHashMap<StateId, FxHashSet<StateDefNode>>,
    pub def_use_summary: MethodDefUseSummary,
    pub callees: Vec<MethodInternalCallee>,
}

/// Per-method output of the intraprocedural summary phase.
#[derive(Debug, Clone, Default)]
pub struct SummaryPhaseArtifacts {
    pub statuses: FxHashMap<StmtId, StmtStatus>,
    pub space: SymbolStateSpace,
    pub symbol_to_define: FxHashMap<SymbolId, FxHashSet<StmtId>>,
    pub state_to_define: FxHashMap<StateId, FxHashSet<StateDefNode>>,
    pub def_use_summary: MethodDefUseSummary,
}

/// Everything the engine persists across phases.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    def_use: FxHashMap<MethodId, DefUseArtifacts>,

    summary_templates: FxHashMap<MethodId, MethodSummaryTemplate>,
    /// Compact, relocatable space backing each template.
    template_spaces: FxHashMap<MethodId, SymbolStateSpace>,
    summary_phase: FxHashMap<MethodId, SummaryPhaseArtifacts>,

    summary_instances: FxHashMap<CallSiteKey, MethodSummaryInstance>,
    instance_spaces: FxHashMap<CallSiteKey, SymbolStateSpace>,
    parameter_mappings: FxHashMap<CallSiteKey, Vec<ParameterMapping>>,

    pub call_graph: CallGraph,
    pub call_paths: Vec<CallPath>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── def/use phase ────────────────────────────────────────────────

    pub fn save_def_use(&mut self, method_id: MethodId, artifacts: DefUseArtifacts) {
        self.def_use.insert(method_id, artifacts);
    }

    pub fn def_use(&self, method_id: MethodId) -> Result<&DefUseArtifacts> {
        self.def_use
            .get(&method_id)
            .ok_or_else(|| ValueflowError::missing(format!("def/use of method {method_id}")))
    }

    pub fn has_def_use(&self, method_id: MethodId) -> bool {
        self.def_use.contains_key(&method_id)
    }

    // ── summary phase ────────────────────────────────────────────────

    pub fn save_summary_template(
        &mut self,
        method_id: MethodId,
        template: MethodSummaryTemplate,
        compact_space: SymbolStateSpace,
    ) {
        self.summary_templates.insert(method_id, template);
        self.template_spaces.insert(method_id, compact_space);
    }

    pub fn summary_template(&self, method_id: MethodId) -> Option<&MethodSummaryTemplate> {
        self.summary_templates.get(&method_id)
    }

    pub fn template_space(&self, method_id: MethodId) -> Option<&SymbolStateSpace> {
        self.template_spaces.get(&method_id)
    }

    pub fn has_summary_template(&self, method_id: MethodId) -> bool {
        self.summary_templates.contains_key(&method_id)
    }

    pub fn save_summary_phase(&mut self, method_id: MethodId, artifacts: SummaryPhaseArtifacts) {
        self.summary_phase.insert(method_id, artifacts);
    }

    pub fn summary_phase(&self, method_id: MethodId) -> Result<&SummaryPhaseArtifacts> {
        self.summary_phase.get(&method_id).ok_or_else(|| {
            ValueflowError::missing(format!("summary-phase artifacts of method {method_id}"))
        })
    }

    // ── interprocedural phase ────────────────────────────────────────

    pub fn save_summary_instance(
        &mut self,
        call_site: CallSiteKey,
        instance: MethodSummaryInstance,
        compact_space: SymbolStateSpace,
    ) {
        self.summary_instances.insert(call_site, instance);
        self.instance_spaces.insert(call_site, compact_space);
    }

    pub fn summary_instance(&self, call_site: CallSiteKey) -> Option<&MethodSummaryInstance> {
        self.summary_instances.get(&call_site)
    }

    pub fn instance_space(&self, call_site: CallSiteKey) -> Option<&SymbolStateSpace> {
        self.instance_spaces.get(&call_site)
    }

    pub fn save_parameter_mappings(
        &mut self,
        call_site: CallSiteKey,
        mappings: Vec<ParameterMapping>,
    ) {
        self.parameter_mappings.insert(call_site, mappings);
    }

    pub fn parameter_mappings(&self, call_site: CallSiteKey) -> Option<&[ParameterMapping]> {
        self.parameter_mappings.get(&call_site).map(|v| v.as_slice())
    }

    pub fn summary_instances(&self) -> impl Iterator<Item = (&CallSiteKey, &MethodSummaryInstance)> {
        self.summary_instances.iter()
    }
}
