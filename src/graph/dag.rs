//! The derivation DAG: named grid derivations with explicit declared
//! dependencies. Replaces an implicit "stage N reads a variable stage N-5
//! defined" ordering with a structure the engine can sort and validate.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;

use super::node::{Derivation, DerivationNode, NodeId, Op, Stage};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("a derivation named '{0}' already exists")]
    DuplicateName(String),
    #[error("derivation '{name}' references a node that is not in this graph")]
    UnknownParent { name: String },
    #[error("derivation '{name}': {op:?} takes {expected} parents, got {actual}")]
    ArityMismatch {
        name: String,
        op: Op,
        expected: usize,
        actual: usize,
    },
    #[error("derivation graph contains a cycle through '{0}'")]
    Cycle(String),
}

/// A directed acyclic graph of named derivation steps.
///
/// Edges run from parent (upstream grid) to child (consumer), so a
/// topological sort yields a valid evaluation order. Operand order, which
/// matters for subtraction and division, lives in each node's `parents`
/// list; the edges exist for the graph algorithms.
#[derive(Debug, Clone, Default)]
pub struct DerivationGraph {
    graph: DiGraph<DerivationNode, ()>,
    by_name: HashMap<String, NodeId>,
}

impl DerivationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw input raster, read from the `Params.inputs` entry
    /// named `input`.
    pub fn source(
        &mut self,
        name: &str,
        stage: Stage,
        input: &'static str,
    ) -> Result<NodeId, GraphError> {
        self.insert(DerivationNode {
            name: name.to_string(),
            stage,
            derivation: Derivation::Source { input },
            parents: Vec::new(),
            persist: false,
        })
    }

    /// Registers a derived grid combining `parents` through `op`.
    pub fn derived(
        &mut self,
        name: &str,
        stage: Stage,
        op: Op,
        parents: &[NodeId],
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        match op.arity() {
            Some(expected) if parents.len() != expected => {
                return Err(GraphError::ArityMismatch {
                    name: name.to_string(),
                    op,
                    expected,
                    actual: parents.len(),
                })
            }
            None if parents.len() < 2 => {
                return Err(GraphError::ArityMismatch {
                    name: name.to_string(),
                    op,
                    expected: 2,
                    actual: parents.len(),
                })
            }
            _ => {}
        }
        self.insert(DerivationNode {
            name: name.to_string(),
            stage,
            derivation: Derivation::Derived { op },
            parents: parents.to_vec(),
            persist,
        })
    }

    // Convenience constructors used by the model definition.

    pub fn sum(
        &mut self,
        name: &str,
        stage: Stage,
        parents: &[NodeId],
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::Sum, parents, persist)
    }

    pub fn diff(
        &mut self,
        name: &str,
        stage: Stage,
        parents: &[NodeId],
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::Diff, parents, persist)
    }

    pub fn mul(
        &mut self,
        name: &str,
        stage: Stage,
        a: NodeId,
        b: NodeId,
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::Mul, &[a, b], persist)
    }

    pub fn div(
        &mut self,
        name: &str,
        stage: Stage,
        num: NodeId,
        den: NodeId,
        default: f64,
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::Div { default }, &[num, den], persist)
    }

    pub fn clamp(
        &mut self,
        name: &str,
        stage: Stage,
        ratio: NodeId,
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::ClampFraction, &[ratio], persist)
    }

    pub fn deposition_floor(
        &mut self,
        name: &str,
        stage: Stage,
        dep: NodeId,
        emission: NodeId,
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::DepositionFloor, &[dep, emission], persist)
    }

    pub fn one_minus(
        &mut self,
        name: &str,
        stage: Stage,
        fraction: NodeId,
        persist: bool,
    ) -> Result<NodeId, GraphError> {
        self.derived(name, stage, Op::OneMinus, &[fraction], persist)
    }

    fn insert(&mut self, node: DerivationNode) -> Result<NodeId, GraphError> {
        if self.by_name.contains_key(&node.name) {
            return Err(GraphError::DuplicateName(node.name));
        }
        for &parent in &node.parents {
            if parent.index() >= self.graph.node_count() {
                return Err(GraphError::UnknownParent { name: node.name });
            }
        }

        let name = node.name.clone();
        let parents = node.parents.clone();
        let id = self.graph.add_node(node);
        for parent in parents {
            self.graph.add_edge(parent, id, ());
        }
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// An evaluation order where every parent precedes its consumers.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        toposort(&self.graph, None)
            .map_err(|cycle| GraphError::Cycle(self.node(cycle.node_id()).name.clone()))
    }

    pub fn node(&self, id: NodeId) -> &DerivationNode {
        &self.graph[id]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices()
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Names of all grids flagged for persistence, in insertion order.
    pub fn persisted_names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&id| self.graph[id].persist)
            .map(|id| self.graph[id].name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toposort_respects_diamond_dependency() {
        // Shape: a -> b, a -> c, (b, c) -> d.
        let mut g = DerivationGraph::new();
        let a = g.source("a", Stage::LandUseFractions, "a").unwrap();
        let b = g.clamp("b", Stage::LandUseFractions, a, false).unwrap();
        let c = g.one_minus("c", Stage::LandUseFractions, a, false).unwrap();
        let d = g.sum("d", Stage::LandUseFractions, &[b, c], false).unwrap();

        let order = g.topological_order().expect("sort failed");
        let pos = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut g = DerivationGraph::new();
        g.source("a_tot", Stage::LandUseFractions, "gridcell_area").unwrap();
        let err = g
            .source("a_tot", Stage::LandUseFractions, "gridcell_area")
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateName("a_tot".into()));
    }

    #[test]
    fn test_arity_is_validated() {
        let mut g = DerivationGraph::new();
        let a = g.source("a", Stage::NutrientInputs, "a").unwrap();

        let err = g.sum("s", Stage::NutrientInputs, &[a], false).unwrap_err();
        assert!(matches!(err, GraphError::ArityMismatch { .. }), "got {err}");

        let err = g
            .derived("m", Stage::NutrientInputs, Op::Mul, &[a], false)
            .unwrap_err();
        assert!(matches!(err, GraphError::ArityMismatch { .. }), "got {err}");
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let mut g = DerivationGraph::new();
        let a = g.source("x", Stage::NutrientInputs, "x").unwrap();
        // A NodeId beyond this graph's node range is unknown to it.
        let err = g
            .clamp("y", Stage::NutrientInputs, NodeId::new(a.index() + 5), false)
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownParent { .. }), "got {err}");
    }
}
