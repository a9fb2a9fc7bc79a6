//! Relation builder: expands the package universe from the roots.
//!
//! Walks a frontier of fingerprints, turning each package's declared chart
//! dependencies into `PkgRel` relations and resolved graph edges. Missing
//! dependency packages are pulled in through the repository collaborator —
//! the lookups for one package fan out concurrently since they are
//! independent I/O — and merged into the fingerprint index before the state
//! resolver ever runs.
//!
//! Namespace of a dependency: the declaration's override if present, else
//! the dependency chart's own default namespace, else the dependent's
//! namespace.

use std::collections::{BTreeSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::debug;

use stevedore_core::{
    base_fingerprint_of, Chart, ChartHasher, DependencyDecl, Pkg, PkgIndex, PkgRel, PkgState,
    SolverError, SolverResult, VersionPolicy,
};
use stevedore_registry::ChartRepository;

use crate::graph::DependencyGraph;

/// Options controlling universe expansion
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Upper bound on each repository call; expiry aborts the resolution.
    /// `None` trusts the repository's own timeouts.
    pub fetch_timeout: Option<Duration>,
    /// Range resolution policy, fixed for the whole run
    pub version_policy: VersionPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Some(Duration::from_secs(30)),
            version_policy: VersionPolicy::Highest,
        }
    }
}

/// Expands declared dependencies into resolved relations and a dependency
/// graph
pub struct RelationBuilder<'a, R> {
    index: &'a PkgIndex,
    repository: Arc<R>,
    hasher: Arc<dyn ChartHasher>,
    options: BuildOptions,
}

impl<'a, R: ChartRepository + 'static> RelationBuilder<'a, R> {
    pub fn new(
        index: &'a PkgIndex,
        repository: Arc<R>,
        hasher: Arc<dyn ChartHasher>,
        options: BuildOptions,
    ) -> Self {
        Self {
            index,
            repository,
            hasher,
            options,
        }
    }

    /// Build the dependency graph for everything reachable from `roots`.
    ///
    /// The visited set is keyed by fingerprint, so expansion terminates even
    /// when the repository serves cyclic dependency data.
    pub async fn expand(&self, roots: &[String]) -> SolverResult<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        let mut frontier: VecDeque<String> = VecDeque::new();

        for root in roots {
            if !self.index.contains(root) {
                return Err(SolverError::InvalidRequest {
                    reason: format!("root '{root}' is not in the index"),
                });
            }
            frontier.push_back(root.clone());
        }

        while let Some(fingerprint) = frontier.pop_front() {
            if !visited.insert(fingerprint.clone()) {
                continue;
            }
            let pkg = self
                .index
                .lookup_exact(&fingerprint)
                .ok_or_else(|| SolverError::InvalidRequest {
                    reason: format!("package '{fingerprint}' vanished from the index"),
                })?;

            graph.add_package(&fingerprint);
            debug!(package = %fingerprint, "expanding relations");

            let (mandatory, optional) = if pkg.has_relations() {
                (pkg.depends_rel.clone(), pkg.depends_optional_rel.clone())
            } else {
                let (mandatory, optional) = self.build_relations(&pkg).await?;
                self.index
                    .append_relations(&fingerprint, mandatory.clone(), optional.clone());
                (mandatory, optional)
            };

            let tagged = mandatory
                .iter()
                .map(|rel| (rel, false))
                .chain(optional.iter().map(|rel| (rel, true)));
            for (rel, is_optional) in tagged {
                let target = self.index.resolve_range(
                    &rel.base_fingerprint,
                    &rel.semver_range,
                    self.options.version_policy,
                )?;
                let target_fingerprint = target.fingerprint();

                graph.add_package(&target_fingerprint);
                graph.add_relation(&fingerprint, &target_fingerprint, is_optional)?;
                if !visited.contains(&target_fingerprint) {
                    frontier.push_back(target_fingerprint);
                }
            }
        }

        Ok(graph)
    }

    /// Resolve one package's declared dependencies into relations, fetching
    /// the declared charts concurrently and inserting them into the index.
    async fn build_relations(&self, pkg: &Pkg) -> SolverResult<(Vec<PkgRel>, Vec<PkgRel>)> {
        let Some(chart) = pkg.chart() else {
            // Chartless package (mock or externally described): nothing declared
            return Ok((Vec::new(), Vec::new()));
        };
        let declarations = chart.manifest.dependencies.clone();
        if declarations.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut join_set = JoinSet::new();
        for (position, decl) in declarations.into_iter().enumerate() {
            let repository = Arc::clone(&self.repository);
            let timeout = self.options.fetch_timeout;
            join_set.spawn(async move {
                let outcome = fetch_declared(repository.as_ref(), &decl, timeout).await;
                (position, decl, outcome)
            });
        }

        let mut fetched: Vec<(usize, DependencyDecl, Chart)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (position, decl, outcome) = joined.map_err(|e| SolverError::Aborted {
                reason: format!("dependency fetch task failed: {e}"),
            })?;
            fetched.push((position, decl, outcome?));
        }
        // Relation order must follow declaration order, not completion order
        fetched.sort_by_key(|(position, _, _)| *position);

        let mut mandatory = Vec::new();
        let mut optional = Vec::new();
        for (_, decl, dep_chart) in fetched {
            let namespace = decl
                .namespace
                .clone()
                .or_else(|| dep_chart.manifest.namespace.clone())
                .unwrap_or_else(|| pkg.namespace().to_string());

            let rel = PkgRel::new(
                base_fingerprint_of(&dep_chart.manifest.name, &namespace),
                decl.range.clone(),
            );
            let dep_pkg = Pkg::new(
                dep_chart.manifest.name.clone(),
                dep_chart.manifest.version.clone(),
                namespace,
                PkgState::Unknown,
                PkgState::Unknown,
                Some(Arc::new(dep_chart)),
                self.hasher.as_ref(),
            );
            self.index.insert(dep_pkg)?;

            if decl.optional {
                optional.push(rel);
            } else {
                mandatory.push(rel);
            }
        }
        Ok((mandatory, optional))
    }
}

/// Locate and load one declared dependency, each step bounded by the fetch
/// timeout
async fn fetch_declared<R: ChartRepository + ?Sized>(
    repository: &R,
    decl: &DependencyDecl,
    timeout: Option<Duration>,
) -> SolverResult<Chart> {
    let archive = bounded(timeout, &decl.name, "locate", repository.locate(&decl.name, &decl.range)).await?;
    bounded(timeout, &decl.name, "load", repository.load(&archive)).await
}

async fn bounded<T>(
    limit: Option<Duration>,
    name: &str,
    operation: &str,
    fut: impl Future<Output = SolverResult<T>>,
) -> SolverResult<T> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(SolverError::Aborted {
                reason: format!("{operation} of '{name}' timed out after {limit:?}"),
            }),
        },
        None => fut.await,
    }
}
