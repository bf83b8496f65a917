//! Stack dependency graph using `petgraph`.
//!
//! Builds a directed acyclic graph from stack dependencies and resolves
//! the order in which stacks must be deployed.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use splitstack_common::error::{Result, StackError};

/// A dependency graph of stacks.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: petgraph::Graph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stack node, returning the existing node if the name is known.
    pub fn add_stack(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        let _ = self.nodes.insert(name.to_string(), idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The edge points from `dependency` to `dependent` so that a
    /// topological sort yields dependencies first.
    ///
    /// # Errors
    ///
    /// Returns `StackError::NotFound` if either stack was never added.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> Result<()> {
        let from = self.index(dependency)?;
        let to = self.index(dependent)?;
        if !self.graph.contains_edge(from, to) {
            let _ = self.graph.add_edge(from, to, ());
        }
        Ok(())
    }

    /// Returns stack names in deployment order.
    ///
    /// # Errors
    ///
    /// Returns `StackError::Config` if the graph contains a cycle.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .iter()
                .filter_map(|&idx| self.graph.node_weight(idx).cloned())
                .collect()),
            Err(cycle) => {
                let name = self
                    .graph
                    .node_weight(cycle.node_id())
                    .map_or("?", String::as_str);
                Err(StackError::Config {
                    message: format!("cyclic dependency between stacks involving {name}"),
                })
            }
        }
    }

    fn index(&self, name: &str) -> Result<NodeIndex> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| StackError::NotFound {
                kind: "stack",
                id: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).expect(name)
    }

    #[test]
    fn empty_graph_resolves_to_empty() {
        let graph = DependencyGraph::new();
        assert!(graph.resolve_order().expect("resolve").is_empty());
    }

    #[test]
    fn adding_a_stack_twice_reuses_the_node() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_stack("VpcStack");
        let b = graph.add_stack("VpcStack");
        assert_eq!(a, b);
        assert_eq!(graph.resolve_order().expect("resolve"), vec!["VpcStack"]);
    }

    #[test]
    fn compute_deploys_after_network_and_registry() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_stack("EcsStack");
        let _ = graph.add_stack("EcrStack");
        let _ = graph.add_stack("VpcStack");
        graph.add_dependency("EcsStack", "VpcStack").expect("edge");
        graph.add_dependency("EcsStack", "EcrStack").expect("edge");

        let order = graph.resolve_order().expect("resolve");
        assert_eq!(order.len(), 3);
        assert!(position(&order, "VpcStack") < position(&order, "EcsStack"));
        assert!(position(&order, "EcrStack") < position(&order, "EcsStack"));
    }

    #[test]
    fn diamond_dependency() {
        let mut graph = DependencyGraph::new();
        for name in ["a", "b", "c", "d"] {
            let _ = graph.add_stack(name);
        }
        graph.add_dependency("a", "b").expect("edge");
        graph.add_dependency("a", "c").expect("edge");
        graph.add_dependency("b", "d").expect("edge");
        graph.add_dependency("c", "d").expect("edge");

        let order = graph.resolve_order().expect("resolve");
        assert!(position(&order, "d") < position(&order, "b"));
        assert!(position(&order, "d") < position(&order, "c"));
        assert!(position(&order, "b") < position(&order, "a"));
        assert!(position(&order, "c") < position(&order, "a"));
    }

    #[test]
    fn cycle_detection() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_stack("a");
        let _ = graph.add_stack("b");
        graph.add_dependency("a", "b").expect("edge");
        graph.add_dependency("b", "a").expect("edge");

        let msg = graph.resolve_order().unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn unknown_stack_in_edge_is_rejected() {
        let mut graph = DependencyGraph::new();
        let _ = graph.add_stack("a");
        let err = graph.add_dependency("a", "ghost").unwrap_err();
        assert!(err.to_string().contains("ghost"), "got: {err}");
    }
}
