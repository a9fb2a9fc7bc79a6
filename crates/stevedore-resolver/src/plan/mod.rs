//! Transaction planner: orders resolved state changes into an executable
//! plan.
//!
//! Installs run dependency-first, uninstalls dependent-first, both with
//! lexicographic fingerprint tie-breaks so a fixed resolution always yields
//! a byte-identical plan. A group of co-installed packages that mandatorily
//! require each other has no internal order requirement — the transaction is
//! atomic, the mutual requirement holds the moment it commits — so the group
//! is emitted in lexicographic order. A cycle that runs through an
//! *optional* relation has no such anchor and is a structural defect in the
//! dependency data.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stevedore_core::{Pkg, PkgIndex, PkgState, SolverError, SolverResult};

use crate::graph::DependencyGraph;
use crate::state::Resolution;

/// Ordered install/uninstall sequences derived from one resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionPlan {
    /// Fingerprints to install, dependencies before dependents
    pub install: Vec<String>,
    /// Fingerprints to uninstall, dependents before dependencies
    pub uninstall: Vec<String>,
}

impl TransactionPlan {
    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.uninstall.is_empty()
    }

    /// Serialize the plan; fingerprints round-trip verbatim
    pub fn to_json(&self) -> SolverResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(encoded: &str) -> SolverResult<Self> {
        Ok(serde_json::from_str(encoded)?)
    }
}

/// Executes a plan against a cluster. The resolver core only produces plans;
/// implementations of this live with the cluster-facing caller.
#[async_trait]
pub trait Applier: Send + Sync {
    async fn install(&self, pkg: &Pkg) -> SolverResult<()>;
    async fn uninstall(&self, pkg: &Pkg) -> SolverResult<()>;
}

/// Which way a change set is ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderDirection {
    /// Prerequisites are dependencies (install them first)
    DependenciesFirst,
    /// Prerequisites are dependents (remove them first)
    DependentsFirst,
}

/// Turns resolutions into ordered transaction plans
pub struct TransactionPlanner<'a> {
    index: &'a PkgIndex,
    graph: &'a DependencyGraph,
}

impl<'a> TransactionPlanner<'a> {
    pub fn new(index: &'a PkgIndex, graph: &'a DependencyGraph) -> Self {
        Self { index, graph }
    }

    /// Split the resolution into change sets and order each one
    pub fn plan(&self, resolution: &Resolution) -> SolverResult<TransactionPlan> {
        let mut install_set = BTreeSet::new();
        let mut uninstall_set = BTreeSet::new();

        for (fingerprint, final_state) in resolution.states() {
            let current = self
                .index
                .current_state(fingerprint)
                .unwrap_or(PkgState::Unknown);
            match final_state {
                PkgState::Present if current != PkgState::Present => {
                    install_set.insert(fingerprint.clone());
                }
                PkgState::Absent if current == PkgState::Present => {
                    uninstall_set.insert(fingerprint.clone());
                }
                _ => {}
            }
        }

        let install = self.order(&install_set, OrderDirection::DependenciesFirst)?;
        let uninstall = self.order(&uninstall_set, OrderDirection::DependentsFirst)?;
        debug!(
            installs = install.len(),
            uninstalls = uninstall.len(),
            "transaction planned"
        );

        Ok(TransactionPlan { install, uninstall })
    }

    /// Topologically order one change set.
    ///
    /// Kahn's algorithm over the strongly-connected-component condensation
    /// of the induced subgraph, with a lexicographic ready queue. Mandatory
    /// mutual-requirement groups collapse into one component and come out in
    /// lexicographic order; a component held together by an optional edge is
    /// a `PlanCycle`.
    fn order(&self, set: &BTreeSet<String>, direction: OrderDirection) -> SolverResult<Vec<String>> {
        if set.is_empty() {
            return Ok(Vec::new());
        }

        // Induced subgraph: edge prerequisite -> dependent, weight = optional
        let mut subgraph: DiGraph<String, bool> = DiGraph::new();
        let mut node_of: BTreeMap<&str, NodeIndex> = BTreeMap::new();
        for member in set {
            node_of.insert(member, subgraph.add_node(member.clone()));
        }
        for member in set {
            let prerequisites: Vec<(String, bool)> = match direction {
                OrderDirection::DependenciesFirst => self
                    .graph
                    .dependencies(member, true)
                    .into_iter()
                    .filter(|dep| set.contains(dep))
                    .map(|dep| {
                        let optional = self.graph.relation_optional(member, &dep).unwrap_or(false);
                        (dep, optional)
                    })
                    .collect(),
                OrderDirection::DependentsFirst => self
                    .graph
                    .dependents(member)
                    .into_iter()
                    .filter(|dep| set.contains(dep))
                    .map(|dep| {
                        let optional = self.graph.relation_optional(&dep, member).unwrap_or(false);
                        (dep, optional)
                    })
                    .collect(),
            };
            for (prerequisite, optional) in prerequisites {
                subgraph.add_edge(node_of[prerequisite.as_str()], node_of[member.as_str()], optional);
            }
        }

        // Components, each with lexicographically sorted members
        let components = tarjan_scc(&subgraph);
        let mut component_of = vec![0usize; subgraph.node_count()];
        let mut members_of: Vec<Vec<String>> = Vec::with_capacity(components.len());
        for (component, nodes) in components.iter().enumerate() {
            let mut members: Vec<String> = nodes
                .iter()
                .filter_map(|&n| subgraph.node_weight(n).cloned())
                .collect();
            members.sort();
            for &node in nodes {
                component_of[node.index()] = component;
            }
            members_of.push(members);
        }

        // A cycle is only orderable when the transaction itself anchors it,
        // which optional relations do not allow
        for edge in subgraph.edge_references() {
            let (source, target) = (edge.source().index(), edge.target().index());
            if component_of[source] == component_of[target] && *edge.weight() {
                return Err(SolverError::PlanCycle {
                    members: members_of[component_of[source]].clone(),
                });
            }
        }

        // Kahn over the condensation, smallest member fingerprint first
        let mut indegree = vec![0usize; members_of.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); members_of.len()];
        for edge in subgraph.edge_references() {
            let from = component_of[edge.source().index()];
            let to = component_of[edge.target().index()];
            if from != to {
                successors[from].push(to);
                indegree[to] += 1;
            }
        }

        let mut ready: BTreeSet<(String, usize)> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(component, _)| (members_of[component][0].clone(), component))
            .collect();

        let mut ordered = Vec::with_capacity(set.len());
        while let Some((_, component)) = ready.pop_first() {
            ordered.extend(members_of[component].iter().cloned());
            for &next in &successors[component] {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    ready.insert((members_of[next][0].clone(), next));
                }
            }
        }

        Ok(ordered)
    }
}
