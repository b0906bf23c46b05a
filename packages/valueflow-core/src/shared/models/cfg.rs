//! Per-method control-flow graph.
//!
//! Nodes are statement ids; edges carry the control-flow kind. Loop bodies
//! reach their header through `LoopBack` edges, which the reaching-definition
//! pass filters by round.

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::DfsPostOrder;
use petgraph::Direction;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::stmt::{MethodId, StmtId};

/// Kind of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlFlowKind {
    Normal,
    TrueBranch,
    FalseBranch,
    LoopBack,
    Exception,
}

/// Control-flow graph of one method.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub method_id: MethodId,
    graph: DiGraphMap<StmtId, ControlFlowKind>,
}

impl ControlFlowGraph {
    pub fn new(method_id: MethodId) -> Self {
        Self {
            method_id,
            graph: DiGraphMap::new(),
        }
    }

    pub fn add_node(&mut self, stmt_id: StmtId) {
        if stmt_id >= 0 {
            self.graph.add_node(stmt_id);
        }
    }

    pub fn add_edge(&mut self, src: StmtId, dst: StmtId, kind: ControlFlowKind) {
        if src < 0 || dst < 0 {
            return;
        }
        if src == dst && kind != ControlFlowKind::LoopBack {
            return;
        }
        self.graph.add_edge(src, dst, kind);
    }

    pub fn contains(&self, stmt_id: StmtId) -> bool {
        self.graph.contains_node(stmt_id)
    }

    pub fn predecessors(&self, stmt_id: StmtId) -> Vec<StmtId> {
        self.graph
            .neighbors_directed(stmt_id, Direction::Incoming)
            .collect()
    }

    pub fn successors(&self, stmt_id: StmtId) -> Vec<StmtId> {
        self.graph
            .neighbors_directed(stmt_id, Direction::Outgoing)
            .collect()
    }

    pub fn edge_kind(&self, src: StmtId, dst: StmtId) -> Option<ControlFlowKind> {
        self.graph.edge_weight(src, dst).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn nodes(&self) -> Vec<StmtId> {
        self.graph.nodes().collect()
    }

    /// Statements with no incoming edges (method entry).
    pub fn entry_nodes(&self) -> Vec<StmtId> {
        let mut nodes: Vec<StmtId> = self
            .graph
            .nodes()
            .filter(|n| {
                self.graph
                    .neighbors_directed(*n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Statements with no outgoing edges (method exit).
    pub fn exit_nodes(&self) -> Vec<StmtId> {
        let mut nodes: Vec<StmtId> = self
            .graph
            .nodes()
            .filter(|n| {
                self.graph
                    .neighbors_directed(*n, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect();
        nodes.sort_unstable();
        nodes
    }

    /// Reverse post-order ranks from the entry node. Worklists pop the
    /// lowest rank first so forward dataflow converges quickly.
    pub fn reverse_postorder_ranks(&self) -> FxHashMap<StmtId, usize> {
        let mut ranks = FxHashMap::default();
        let entries = self.entry_nodes();
        let Some(&entry) = entries.first() else {
            return ranks;
        };

        let mut postorder = Vec::with_capacity(self.graph.node_count());
        let mut dfs = DfsPostOrder::new(&self.graph, entry);
        while let Some(node) = dfs.next(&self.graph) {
            postorder.push(node);
        }
        for (rank, node) in postorder.into_iter().rev().enumerate() {
            ranks.insert(node, rank);
        }
        ranks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::new(1);
        cfg.add_edge(10, 11, ControlFlowKind::TrueBranch);
        cfg.add_edge(10, 12, ControlFlowKind::FalseBranch);
        cfg.add_edge(11, 13, ControlFlowKind::Normal);
        cfg.add_edge(12, 13, ControlFlowKind::Normal);
        cfg
    }

    #[test]
    fn test_entry_and_exit_nodes() {
        let cfg = diamond();
        assert_eq!(cfg.entry_nodes(), vec![10]);
        assert_eq!(cfg.exit_nodes(), vec![13]);
    }

    #[test]
    fn test_reverse_postorder_puts_entry_first() {
        let cfg = diamond();
        let ranks = cfg.reverse_postorder_ranks();
        assert_eq!(ranks[&10], 0);
        assert!(ranks[&13] > ranks[&11]);
        assert!(ranks[&13] > ranks[&12]);
    }

    #[test]
    fn test_negative_ids_are_rejected() {
        let mut cfg = ControlFlowGraph::new(1);
        cfg.add_edge(-1, 5, ControlFlowKind::Normal);
        assert_eq!(cfg.node_count(), 0);
    }
}
