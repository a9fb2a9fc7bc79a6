//! The fingerprint index: lookup table for one resolution universe.
//!
//! The index is the sole owner of every package descriptor. Relations never
//! hold descriptor references; everything goes through fingerprint lookups
//! here. Inserts are serialized internally so the relation builder can fan
//! out repository fetches concurrently.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{SolverError, SolverResult};
use crate::types::{Pkg, PkgRel, PkgState};

/// Which satisfying version a range resolves to.
///
/// Pinned per run at solver construction, never switched mid-resolution.
/// Pre-release versions follow semver-crate matching: a pre-release satisfies
/// a range only when the range itself names a pre-release of the same
/// version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionPolicy {
    /// Pick the highest satisfying version (the default)
    #[default]
    Highest,
    /// Pick the lowest satisfying version
    Lowest,
}

/// Fingerprint index over package descriptors.
///
/// Maps fingerprints to descriptors and base fingerprints to families, so
/// version ranges can be resolved against everything known in this universe.
#[derive(Debug, Default)]
pub struct PkgIndex {
    /// fingerprint -> descriptor; unique ownership of the universe
    by_fingerprint: DashMap<String, Pkg>,
    /// base fingerprint -> member fingerprints
    families: DashMap<String, Vec<String>>,
}

impl PkgIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor.
    ///
    /// Re-inserting an identical descriptor is a no-op (at most it fills in a
    /// payload the stored copy was missing). An equal fingerprint with
    /// *different* chart content means the hash or the repository is lying;
    /// that violates the index's core invariant and is fatal.
    pub fn insert(&self, pkg: Pkg) -> SolverResult<()> {
        let fingerprint = pkg.fingerprint();
        let base = pkg.base_fingerprint();

        match self.by_fingerprint.entry(fingerprint.clone()) {
            Entry::Occupied(mut occupied) => {
                let mismatch = match (occupied.get().chart(), pkg.chart()) {
                    (Some(existing), Some(incoming)) => existing.data != incoming.data,
                    _ => false,
                };
                if mismatch {
                    return Err(SolverError::DuplicateFingerprint { fingerprint });
                }
                if occupied.get().chart().is_none() {
                    if let Some(incoming) = pkg.chart() {
                        occupied.get_mut().set_chart(Arc::clone(incoming));
                    }
                }
                Ok(())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(pkg);
                self.families.entry(base).or_default().push(fingerprint);
                Ok(())
            }
        }
    }

    /// Look up one concrete descriptor by fingerprint
    pub fn lookup_exact(&self, fingerprint: &str) -> Option<Pkg> {
        self.by_fingerprint.get(fingerprint).map(|p| p.clone())
    }

    /// All descriptors of a family, ordered by version ascending
    pub fn lookup_family(&self, base_fingerprint: &str) -> Vec<Pkg> {
        let Some(members) = self.families.get(base_fingerprint) else {
            return Vec::new();
        };
        let mut pkgs: Vec<Pkg> = members
            .iter()
            .filter_map(|fp| self.lookup_exact(fp))
            .collect();
        pkgs.sort_by(|a, b| {
            a.version()
                .cmp(b.version())
                .then_with(|| a.fingerprint().cmp(&b.fingerprint()))
        });
        pkgs
    }

    /// Resolve a version range against a family under the given policy
    pub fn resolve_range(
        &self,
        base_fingerprint: &str,
        range: &semver::VersionReq,
        policy: VersionPolicy,
    ) -> SolverResult<Pkg> {
        let family = self.lookup_family(base_fingerprint);
        if family.is_empty() {
            return Err(SolverError::UnknownFamily {
                base_fingerprint: base_fingerprint.to_string(),
            });
        }

        let mut satisfying = family.iter().filter(|p| range.matches(p.version()));
        let picked = match policy {
            VersionPolicy::Highest => satisfying.last(),
            VersionPolicy::Lowest => satisfying.next(),
        };

        picked.cloned().ok_or_else(|| SolverError::NoSatisfyingVersion {
            base_fingerprint: base_fingerprint.to_string(),
            range: range.to_string(),
            available: family
                .iter()
                .map(|p| p.version().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.by_fingerprint.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }

    /// All known fingerprints, sorted
    pub fn fingerprints(&self) -> Vec<String> {
        let mut all: Vec<String> = self.by_fingerprint.iter().map(|e| e.key().clone()).collect();
        all.sort();
        all
    }

    /// Current state of a package, if it is known to the index
    pub fn current_state(&self, fingerprint: &str) -> Option<PkgState> {
        self.by_fingerprint.get(fingerprint).map(|p| p.current_state)
    }

    /// Record the state a resolution decided on. Returns false for an
    /// unknown fingerprint.
    pub fn set_desired_state(&self, fingerprint: &str, state: PkgState) -> bool {
        match self.by_fingerprint.get_mut(fingerprint) {
            Some(mut pkg) => {
                pkg.desired_state = state;
                true
            }
            None => false,
        }
    }

    /// Record an observed state change (after the plan was applied)
    pub fn set_current_state(&self, fingerprint: &str, state: PkgState) -> bool {
        match self.by_fingerprint.get_mut(fingerprint) {
            Some(mut pkg) => {
                pkg.current_state = state;
                true
            }
            None => false,
        }
    }

    /// Write relations built for a package back onto its descriptor
    pub fn append_relations(
        &self,
        fingerprint: &str,
        depends_rel: Vec<PkgRel>,
        depends_optional_rel: Vec<PkgRel>,
    ) -> bool {
        match self.by_fingerprint.get_mut(fingerprint) {
            Some(mut pkg) => {
                pkg.depends_rel.extend(depends_rel);
                pkg.depends_optional_rel.extend(depends_optional_rel);
                true
            }
            None => false,
        }
    }
}
