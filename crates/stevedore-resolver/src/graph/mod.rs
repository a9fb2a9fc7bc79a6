//! Dependency graph over package fingerprints.
//!
//! Nodes are fingerprints, edges are resolved relations (mandatory or
//! optional). The graph is built once by the relation builder and treated as
//! read-only for the rest of the resolution.

use std::collections::{BTreeSet, HashMap, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use stevedore_core::{SolverError, SolverResult};

/// Edge payload: whether the relation is optional
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelEdge {
    pub optional: bool,
}

/// Directed graph of resolved dependency relations
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, RelEdge>,
    /// fingerprint -> node index for fast lookups
    nodes: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package node; adding an existing fingerprint returns the
    /// existing node
    pub fn add_package(&mut self, fingerprint: &str) -> NodeIndex {
        if let Some(existing) = self.nodes.get(fingerprint) {
            return *existing;
        }
        let index = self.graph.add_node(fingerprint.to_string());
        self.nodes.insert(fingerprint.to_string(), index);
        index
    }

    /// Add a resolved relation edge. Both endpoints must already be nodes.
    pub fn add_relation(&mut self, source: &str, target: &str, optional: bool) -> SolverResult<()> {
        let source_index = *self.nodes.get(source).ok_or_else(|| SolverError::InvalidRequest {
            reason: format!("relation source '{source}' is not in the graph"),
        })?;
        let target_index = *self.nodes.get(target).ok_or_else(|| SolverError::InvalidRequest {
            reason: format!("relation target '{target}' is not in the graph"),
        })?;

        self.graph.add_edge(source_index, target_index, RelEdge { optional });
        Ok(())
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.nodes.contains_key(fingerprint)
    }

    /// Dependencies of a package, in edge insertion order
    pub fn dependencies(&self, fingerprint: &str, include_optional: bool) -> Vec<String> {
        let Some(&index) = self.nodes.get(fingerprint) else {
            return Vec::new();
        };
        // petgraph walks outgoing edges newest-first
        let mut deps: Vec<String> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .filter(|edge| include_optional || !edge.weight().optional)
            .filter_map(|edge| self.graph.node_weight(edge.target()).cloned())
            .collect();
        deps.reverse();
        deps
    }

    /// Mandatory dependencies only
    pub fn mandatory_dependencies(&self, fingerprint: &str) -> Vec<String> {
        self.dependencies(fingerprint, false)
    }

    /// Optional dependencies only
    pub fn optional_dependencies(&self, fingerprint: &str) -> Vec<String> {
        let Some(&index) = self.nodes.get(fingerprint) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .filter(|edge| edge.weight().optional)
            .filter_map(|edge| self.graph.node_weight(edge.target()).cloned())
            .collect();
        deps.reverse();
        deps
    }

    /// Packages depending on `fingerprint` (reverse edges), deterministic
    /// order
    pub fn dependents(&self, fingerprint: &str) -> BTreeSet<String> {
        self.incoming(fingerprint, true)
    }

    /// Packages with a mandatory relation onto `fingerprint`
    pub fn mandatory_dependents(&self, fingerprint: &str) -> BTreeSet<String> {
        self.incoming(fingerprint, false)
    }

    fn incoming(&self, fingerprint: &str, include_optional: bool) -> BTreeSet<String> {
        let Some(&index) = self.nodes.get(fingerprint) else {
            return BTreeSet::new();
        };
        self.graph
            .edges_directed(index, Direction::Incoming)
            .filter(|edge| include_optional || !edge.weight().optional)
            .filter_map(|edge| self.graph.node_weight(edge.source()).cloned())
            .collect()
    }

    /// Whether the relation from `source` to `target` is optional.
    /// A parallel mandatory edge wins over an optional one.
    pub fn relation_optional(&self, source: &str, target: &str) -> Option<bool> {
        let (&source_index, &target_index) = (self.nodes.get(source)?, self.nodes.get(target)?);
        self.graph
            .edges_connecting(source_index, target_index)
            .map(|edge| edge.weight().optional)
            .reduce(|a, b| a && b)
    }

    /// Dependency closure (mandatory and optional) of a set of roots
    pub fn reachable_from<'a>(&self, roots: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut frontier: VecDeque<String> = roots
            .into_iter()
            .filter(|fp| self.contains(fp))
            .cloned()
            .collect();

        while let Some(fingerprint) = frontier.pop_front() {
            if !seen.insert(fingerprint.clone()) {
                continue;
            }
            for dep in self.dependencies(&fingerprint, true) {
                if !seen.contains(&dep) {
                    frontier.push_back(dep);
                }
            }
        }
        seen
    }

    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relation_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All fingerprints in the graph, sorted
    pub fn fingerprints(&self) -> Vec<String> {
        let mut all: Vec<String> = self.nodes.keys().cloned().collect();
        all.sort();
        all
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Reachability never leaves the graph and always contains the roots
        #[test]
        fn reachability_is_well_bounded(
            package_count in 1usize..12,
            edges in prop::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            let mut graph = DependencyGraph::new();
            let fingerprints: Vec<String> =
                (0..package_count).map(|i| format!("pkg{i}")).collect();
            for fp in &fingerprints {
                graph.add_package(fp);
            }
            for (from, to) in edges {
                if from < package_count && to < package_count && from != to {
                    graph
                        .add_relation(&fingerprints[from], &fingerprints[to], to % 3 == 0)
                        .unwrap();
                }
            }

            let closure = graph.reachable_from(&[fingerprints[0].clone()]);
            prop_assert!(closure.contains(&fingerprints[0]));
            prop_assert!(closure.len() <= package_count);
            for fp in &closure {
                prop_assert!(graph.contains(fp));
            }
        }
    }
}
