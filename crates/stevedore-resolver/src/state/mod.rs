//! State resolver: constraint propagation over the dependency graph.
//!
//! Given root requests (`fingerprint -> Present | Absent`), propagates the
//! implications across mandatory and optional relations until a fixed point,
//! and fixes a final state for every package reachable from the roots. Any
//! infeasibility aborts the whole resolution before a plan exists; no partial
//! state escapes.
//!
//! Propagation rules:
//! - a package kept/made Present requires all its mandatory dependencies
//!   Present; an optional dependency is kept Present only when it already
//!   effectively is (never force-installed)
//! - a package made Absent must not strand a Present mandatory dependent
//!   unless that dependent is itself requested Absent; removal is never
//!   cascaded automatically
//!
//! Each fingerprint is expanded at most once, so propagation terminates on
//! cyclic graphs; a consistent revisit is harmless, a contradictory one is a
//! conflict.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::trace;

use stevedore_core::{PkgIndex, PkgState, SolverError, SolverResult};

use crate::graph::DependencyGraph;

/// Outcome of successful propagation: a final state for every reachable
/// package
#[derive(Debug, Clone)]
pub struct Resolution {
    /// fingerprint -> final state over the reachable closure of the roots
    states: BTreeMap<String, PkgState>,
    /// fingerprint -> state propagation actually assigned (subset of
    /// `states`)
    assigned: BTreeMap<String, PkgState>,
    /// the caller's root requests
    requested: BTreeMap<String, PkgState>,
}

impl Resolution {
    /// Final state of one package, if it was reachable
    pub fn final_state(&self, fingerprint: &str) -> Option<PkgState> {
        self.states.get(fingerprint).copied()
    }

    /// Final states over the whole reachable closure
    pub fn states(&self) -> &BTreeMap<String, PkgState> {
        &self.states
    }

    /// States propagation assigned (packages merely touched keep their
    /// current state and are not in here)
    pub fn assigned(&self) -> &BTreeMap<String, PkgState> {
        &self.assigned
    }

    pub fn requested(&self) -> &BTreeMap<String, PkgState> {
        &self.requested
    }
}

/// The constraint engine
pub struct StateResolver<'a> {
    index: &'a PkgIndex,
    graph: &'a DependencyGraph,
}

impl<'a> StateResolver<'a> {
    pub fn new(index: &'a PkgIndex, graph: &'a DependencyGraph) -> Self {
        Self { index, graph }
    }

    /// Propagate the requested states to a fixed point.
    ///
    /// Requests are an ordered list; requesting the same fingerprint twice
    /// with different states is a `StateConflict`. On success the decided
    /// states are written back to the index as desired states.
    pub fn resolve(&self, requests: &[(String, PkgState)]) -> SolverResult<Resolution> {
        let requested = self.validate(requests)?;

        // Pre-assign every request, then expand Present requests first
        // (lexicographic within each group): an install colliding with a
        // removal is reported from the installer's side, deterministically.
        let mut assigned: BTreeMap<String, PkgState> = requested.clone();
        let mut expanded: BTreeSet<String> = BTreeSet::new();
        let mut worklist: VecDeque<(String, PkgState)> = VecDeque::new();
        for wanted in [PkgState::Present, PkgState::Absent] {
            for (fingerprint, state) in &requested {
                if *state == wanted {
                    worklist.push_back((fingerprint.clone(), *state));
                }
            }
        }

        while let Some((fingerprint, state)) = worklist.pop_front() {
            match assigned.get(&fingerprint) {
                Some(existing) if *existing != state => {
                    return Err(SolverError::StateConflict {
                        fingerprint,
                        wanted: state,
                        existing: *existing,
                    });
                }
                Some(_) => {}
                None => {
                    assigned.insert(fingerprint.clone(), state);
                }
            }
            if !expanded.insert(fingerprint.clone()) {
                // Consistent revisit (e.g. a dependency cycle): nothing new
                continue;
            }
            trace!(package = %fingerprint, ?state, "propagating");

            match state {
                PkgState::Present => {
                    self.require_dependencies(&fingerprint, &assigned, &mut worklist)?
                }
                PkgState::Absent => self.check_dependents(&fingerprint, &assigned, &requested)?,
                // Unknown is rejected at validation and never enqueued
                PkgState::Unknown => {}
            }
        }

        // Every reachable package gets a final state; untouched ones keep
        // their current state. Packages outside the closure are not listed.
        let roots: Vec<String> = requested.keys().cloned().collect();
        let mut states = BTreeMap::new();
        for fingerprint in self.graph.reachable_from(roots.iter()) {
            let state = assigned.get(&fingerprint).copied().or_else(|| {
                self.index.current_state(&fingerprint)
            });
            if let Some(state) = state {
                states.insert(fingerprint, state);
            }
        }

        // Resolution succeeded: record the decisions on the descriptors
        for (fingerprint, state) in &assigned {
            self.index.set_desired_state(fingerprint, *state);
        }

        Ok(Resolution {
            states,
            assigned,
            requested,
        })
    }

    /// Check requests and collapse them into a map; contradictions are
    /// conflicts, duplicates are idempotent
    fn validate(&self, requests: &[(String, PkgState)]) -> SolverResult<BTreeMap<String, PkgState>> {
        let mut requested = BTreeMap::new();
        for (fingerprint, state) in requests {
            if *state == PkgState::Unknown {
                return Err(SolverError::InvalidRequest {
                    reason: format!("cannot request state Unknown for '{fingerprint}'"),
                });
            }
            if !self.graph.contains(fingerprint) {
                return Err(SolverError::InvalidRequest {
                    reason: format!("requested package '{fingerprint}' is not in the universe"),
                });
            }
            match requested.insert(fingerprint.clone(), *state) {
                Some(previous) if previous != *state => {
                    return Err(SolverError::StateConflict {
                        fingerprint: fingerprint.clone(),
                        wanted: *state,
                        existing: previous,
                    });
                }
                _ => {}
            }
        }
        Ok(requested)
    }

    /// Present package: mandatory dependencies must be Present, optional
    /// ones are kept only if they already effectively are
    fn require_dependencies(
        &self,
        fingerprint: &str,
        assigned: &BTreeMap<String, PkgState>,
        worklist: &mut VecDeque<(String, PkgState)>,
    ) -> SolverResult<()> {
        for dependency in self.graph.mandatory_dependencies(fingerprint) {
            match assigned.get(&dependency) {
                Some(PkgState::Absent) => {
                    return Err(SolverError::UnsatisfiableDependency {
                        for_package: fingerprint.to_string(),
                        depends_on: dependency,
                    });
                }
                Some(_) => {
                    // Already Present: make sure it still expands once
                    worklist.push_back((dependency, PkgState::Present));
                }
                None => worklist.push_back((dependency, PkgState::Present)),
            }
        }

        for dependency in self.graph.optional_dependencies(fingerprint) {
            let effectively_present = match assigned.get(&dependency) {
                Some(state) => state.is_present(),
                None => self.index.current_state(&dependency) == Some(PkgState::Present),
            };
            if effectively_present {
                worklist.push_back((dependency, PkgState::Present));
            }
            // Absent or Unknown optionals stay untouched: use if present,
            // do not force install
        }
        Ok(())
    }

    /// Absent package: a Present mandatory dependent blocks the removal
    /// unless it is itself requested Absent
    fn check_dependents(
        &self,
        fingerprint: &str,
        assigned: &BTreeMap<String, PkgState>,
        requested: &BTreeMap<String, PkgState>,
    ) -> SolverResult<()> {
        for dependent in self.graph.mandatory_dependents(fingerprint) {
            let effectively_present = match assigned.get(&dependent) {
                Some(state) => state.is_present(),
                None => self.index.current_state(&dependent) == Some(PkgState::Present),
            };
            let also_removed = requested.get(&dependent) == Some(&PkgState::Absent);
            if effectively_present && !also_removed {
                return Err(SolverError::DependentStillRequires {
                    removed: fingerprint.to_string(),
                    blocked_by: dependent,
                });
            }
        }
        Ok(())
    }
}
