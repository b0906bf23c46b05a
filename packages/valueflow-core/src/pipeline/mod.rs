//! Whole-program orchestration.
//!
//! Three stages: per-method def/use analysis, the intraprocedural summary
//! phase over methods grouped by callee shape (leaves first), and the
//! interprocedural phase from the entry points.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::config::{AnalysisConfig, IdAllocator};
use crate::errors::Result;
use crate::features::call_graph::CalleeKind;
use crate::features::def_use::DefUseAnalysis;
use crate::features::engine::{AnalysisDriver, Phase};
use crate::features::loader::{ArtifactStore, DefUseArtifacts, ProgramDb};
use crate::shared::models::{MethodId, SymbolId, UnitId};

/// Methods bucketed by the shape of their callee sets; summaries are
/// generated leaves-first so callers find their callees done.
#[derive(Debug, Default)]
pub struct GroupedMethods {
    pub no_callees: Vec<MethodId>,
    pub only_direct_callees: Vec<MethodId>,
    pub mixed_callees: Vec<MethodId>,
    pub only_dynamic_callees: Vec<MethodId>,
    pub containing_error_callees: Vec<MethodId>,
}

impl GroupedMethods {
    pub fn analysis_order(&self) -> Vec<MethodId> {
        let mut order = Vec::new();
        order.extend(&self.no_callees);
        order.extend(&self.only_direct_callees);
        order.extend(&self.mixed_callees);
        order.extend(&self.only_dynamic_callees);
        order.extend(&self.containing_error_callees);
        order
    }
}

/// One analysis run over a program.
pub struct AnalysisSession<'a> {
    db: &'a dyn ProgramDb,
    pub config: AnalysisConfig,
    pub ids: IdAllocator,
    pub store: ArtifactStore,
    external_symbol_ids: FxHashMap<(UnitId, String), SymbolId>,
}

impl<'a> AnalysisSession<'a> {
    pub fn new(db: &'a dyn ProgramDb) -> Self {
        let config = AnalysisConfig::default();
        let ids = IdAllocator::new(config.start_state_id);
        Self {
            db,
            config,
            ids,
            store: ArtifactStore::new(),
            external_symbol_ids: FxHashMap::default(),
        }
    }

    pub fn with_config(db: &'a dyn ProgramDb, config: AnalysisConfig) -> Self {
        let ids = IdAllocator::new(config.start_state_id);
        Self {
            db,
            config,
            ids,
            store: ArtifactStore::new(),
            external_symbol_ids: FxHashMap::default(),
        }
    }

    /// Stage 1: per-method def/use facts, initial spaces, basic call graph.
    pub fn run_def_use(&mut self) -> Result<()> {
        info!("def/use analysis");
        for method_id in self.db.methods() {
            let analysis = DefUseAnalysis::new(
                self.db,
                &mut self.ids,
                &mut self.external_symbol_ids,
                &mut self.store.call_graph,
                method_id,
            )?;
            let artifacts = analysis.run()?;
            self.store.save_def_use(method_id, artifacts);
        }
        Ok(())
    }

    /// Group methods by callee shape from the def/use callee records.
    pub fn group_methods(&self) -> GroupedMethods {
        let mut grouped = GroupedMethods::default();
        for method_id in self.db.methods() {
            let callees: &[_] = self
                .store
                .def_use(method_id)
                .map(|a| a.callees.as_slice())
                .unwrap_or(&[]);
            let direct = callees.iter().filter(|c| c.kind == CalleeKind::Direct).count();
            let dynamic = callees.iter().filter(|c| c.kind == CalleeKind::Dynamic).count();
            let error = callees.iter().filter(|c| c.kind == CalleeKind::Error).count();
            if error > 0 {
                grouped.containing_error_callees.push(method_id);
            } else if callees.is_empty() {
                grouped.no_callees.push(method_id);
            } else if dynamic == 0 {
                grouped.only_direct_callees.push(method_id);
            } else if direct == 0 {
                grouped.only_dynamic_callees.push(method_id);
            } else {
                grouped.mixed_callees.push(method_id);
            }
        }
        grouped
    }

    /// Stage 2: intraprocedural summary templates, leaves first.
    pub fn run_summary_phase(&mut self) -> Result<()> {
        info!("summary-template phase");
        let order = self.group_methods().analysis_order();
        let mut driver = AnalysisDriver::new(
            self.db,
            &mut self.store,
            &mut self.ids,
            &self.config,
            Phase::SummaryGeneration,
        );
        for method_id in order {
            driver.analyze_method(method_id)?;
        }
        Ok(())
    }

    /// Stage 3: interprocedural composition from the entry points.
    pub fn run_global_phase(&mut self) -> Result<()> {
        info!("global composition phase");
        let mut driver = AnalysisDriver::new(
            self.db,
            &mut self.store,
            &mut self.ids,
            &self.config,
            Phase::GlobalAnalysis,
        );
        for entry in driver.db.entry_points() {
            driver.analyze_entry_point(entry)?;
        }
        let paths = driver.path_manager.paths().to_vec();
        self.store.call_paths = paths;
        Ok(())
    }

    /// The whole pipeline.
    pub fn run(&mut self) -> Result<()> {
        self.run_def_use()?;
        self.run_summary_phase()?;
        self.run_global_phase()?;
        debug!(
            paths = self.store.call_paths.len(),
            edges = self.store.call_graph.edges().len(),
            "analysis complete"
        );
        Ok(())
    }

    /// Convenience for queries: the ids of every method with a template.
    pub fn summarized_methods(&self) -> FxHashSet<MethodId> {
        self.db
            .methods()
            .into_iter()
            .filter(|m| self.store.has_summary_template(*m))
            .collect()
    }

    pub fn def_use_of(&self, method_id: MethodId) -> Result<&DefUseArtifacts> {
        self.store.def_use(method_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::loader::ProgramBuilder;
    use crate::shared::models::{Operand, StmtKind};

    fn call_stmt(name: &str) -> StmtKind {
        StmtKind::Call {
            target: "r".into(),
            name: name.into(),
            positional_args: vec![],
            named_args: vec![],
            packed_positional_arg: None,
            packed_named_arg: None,
        }
    }

    #[test]
    fn test_group_methods_orders_leaves_first() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");

        let leaf = builder.begin_method(unit, "leaf", &[]);
        builder.stmt(StmtKind::Return {
            value: Some(Operand::int(1)),
        });
        builder.end_method();

        let direct = builder.begin_method(unit, "direct", &[]);
        builder.stmt(call_stmt("leaf"));
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();

        let dynamic = builder.begin_method(unit, "dynamic", &[]);
        builder.stmt(call_stmt("mystery"));
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();

        let mixed = builder.begin_method(unit, "mixed", &[]);
        builder.stmt(call_stmt("leaf"));
        builder.stmt(call_stmt("mystery"));
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();

        let db = builder.build();
        let mut session = AnalysisSession::new(&db);
        session.run_def_use().unwrap();

        let grouped = session.group_methods();
        assert_eq!(grouped.no_callees, vec![leaf]);
        assert_eq!(grouped.only_direct_callees, vec![direct]);
        assert_eq!(grouped.only_dynamic_callees, vec![dynamic]);
        assert_eq!(grouped.mixed_callees, vec![mixed]);

        let order = grouped.analysis_order();
        let pos = |m| order.iter().position(|x| *x == m).unwrap();
        assert!(pos(leaf) < pos(direct));
        assert!(pos(direct) < pos(mixed));
    }
}
