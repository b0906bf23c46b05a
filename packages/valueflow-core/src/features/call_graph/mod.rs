//! Whole-program call graph.
//!
//! Multi-edge directed graph: an edge is (caller, callee, call statement).
//! Callees that cannot be resolved statically go to the synthetic DYNAMIC or
//! ERROR sink nodes instead of failing the analysis.

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::config::{DYNAMIC_METHOD_ID, ERROR_METHOD_ID};
use crate::shared::models::{MethodId, StmtId, SymbolId};

/// Classification of a call statement's callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalleeKind {
    /// Resolved to a method or class declaration.
    Direct,
    /// Resolvable only at runtime.
    Dynamic,
    /// Not resolvable at all.
    Error,
}

/// One callee record of a method, as found by the def/use pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodInternalCallee {
    pub method_id: MethodId,
    pub kind: CalleeKind,
    pub stmt_id: StmtId,
    pub callee_symbol_id: SymbolId,
    /// Arena index of the callee-name symbol in the method's def/use space.
    pub callee_symbol_index: usize,
}

/// Directed call graph with per-edge call-site sets.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraphMap<MethodId, ()>,
    call_sites: FxHashMap<(MethodId, MethodId), FxHashSet<StmtId>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `caller --stmt--> callee`. Negative callers are rejected;
    /// negative callees are exactly the sink nodes.
    pub fn add_edge(&mut self, caller: MethodId, callee: MethodId, call_stmt_id: StmtId) {
        if caller < 0 {
            return;
        }
        self.graph.add_edge(caller, callee, ());
        self.call_sites
            .entry((caller, callee))
            .or_default()
            .insert(call_stmt_id);
    }

    pub fn add_dynamic_edge(&mut self, caller: MethodId, call_stmt_id: StmtId) {
        self.add_edge(caller, DYNAMIC_METHOD_ID, call_stmt_id);
    }

    pub fn add_error_edge(&mut self, caller: MethodId, call_stmt_id: StmtId) {
        self.add_edge(caller, ERROR_METHOD_ID, call_stmt_id);
    }

    pub fn has_edge(&self, caller: MethodId, callee: MethodId) -> bool {
        self.graph.contains_edge(caller, callee)
    }

    pub fn has_call_site(&self, caller: MethodId, callee: MethodId, call_stmt_id: StmtId) -> bool {
        self.call_sites
            .get(&(caller, callee))
            .map(|sites| sites.contains(&call_stmt_id))
            .unwrap_or(false)
    }

    pub fn callees_of(&self, caller: MethodId) -> Vec<MethodId> {
        self.graph
            .neighbors_directed(caller, Direction::Outgoing)
            .collect()
    }

    pub fn callers_of(&self, callee: MethodId) -> Vec<MethodId> {
        self.graph
            .neighbors_directed(callee, Direction::Incoming)
            .collect()
    }

    /// All (caller, callee, call stmt) triples.
    pub fn edges(&self) -> Vec<(MethodId, MethodId, StmtId)> {
        let mut result = Vec::new();
        for ((caller, callee), sites) in &self.call_sites {
            for stmt in sites {
                result.push((*caller, *callee, *stmt));
            }
        }
        result.sort_unstable();
        result
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_edges_keep_distinct_call_sites() {
        let mut graph = CallGraph::new();
        graph.add_edge(1, 2, 10);
        graph.add_edge(1, 2, 11);
        assert!(graph.has_call_site(1, 2, 10));
        assert!(graph.has_call_site(1, 2, 11));
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_sink_nodes() {
        let mut graph = CallGraph::new();
        graph.add_dynamic_edge(1, 10);
        graph.add_error_edge(1, 11);
        assert!(graph.has_edge(1, DYNAMIC_METHOD_ID));
        assert!(graph.has_edge(1, ERROR_METHOD_ID));
    }

    #[test]
    fn test_negative_caller_rejected() {
        let mut graph = CallGraph::new();
        graph.add_edge(-5, 2, 10);
        assert_eq!(graph.node_count(), 0);
    }
}
