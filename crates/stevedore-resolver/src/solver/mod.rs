//! Top-level solver facade.
//!
//! One `resolve` call runs the whole sequence — expand the universe,
//! propagate states, plan the transaction — atomically over one fingerprint
//! index snapshot. The graph the universe expands over covers the requested
//! roots plus everything currently installed, so removals are checked
//! against real dependents; state decisions stay local to the requested
//! closure.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use stevedore_core::{
    Blake3Hasher, Chart, ChartHasher, Pkg, PkgIndex, PkgState, SolverResult, VersionPolicy,
};
use stevedore_registry::ChartRepository;

use crate::builder::{BuildOptions, RelationBuilder};
use crate::plan::{TransactionPlan, TransactionPlanner};
use crate::state::{Resolution, StateResolver};

/// Namespace used when a chart declares none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Options fixed for the lifetime of a solver
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Which satisfying version ranges resolve to
    pub version_policy: VersionPolicy,
    /// Upper bound on each repository call; expiry aborts the resolution
    pub fetch_timeout: Option<Duration>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            version_policy: VersionPolicy::Highest,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Everything one resolution produced
#[derive(Debug)]
pub struct ResolutionOutcome {
    pub resolution: Resolution,
    pub plan: TransactionPlan,
}

/// Ties the index, repository, and engine stages together
pub struct Solver<R> {
    index: PkgIndex,
    repository: Arc<R>,
    hasher: Arc<dyn ChartHasher>,
    options: SolverOptions,
}

impl<R: ChartRepository + 'static> Solver<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_options(repository, SolverOptions::default())
    }

    pub fn with_options(repository: Arc<R>, options: SolverOptions) -> Self {
        Self {
            index: PkgIndex::new(),
            repository,
            hasher: Arc::new(Blake3Hasher),
            options,
        }
    }

    /// Swap the content hasher (a pure function of the payload bytes)
    pub fn with_hasher(mut self, hasher: Arc<dyn ChartHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn index(&self) -> &PkgIndex {
        &self.index
    }

    /// Register a package descriptor in the universe
    pub fn add_package(&self, pkg: Pkg) -> SolverResult<()> {
        self.index.insert(pkg)
    }

    /// Register a chart as a package, in its declared namespace (or the
    /// default), and return its fingerprint
    pub fn add_chart(&self, chart: Chart, current_state: PkgState) -> SolverResult<String> {
        let namespace = chart
            .manifest
            .namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let pkg = Pkg::new(
            chart.manifest.name.clone(),
            chart.manifest.version.clone(),
            namespace,
            current_state,
            PkgState::Unknown,
            Some(Arc::new(chart)),
            self.hasher.as_ref(),
        );
        let fingerprint = pkg.fingerprint();
        self.index.insert(pkg)?;
        Ok(fingerprint)
    }

    /// Resolve the requested state changes into a transaction plan.
    ///
    /// Build, propagation, and planning run to completion or fail as a unit;
    /// on failure no desired state or partial plan is visible anywhere.
    pub async fn resolve(
        &self,
        requests: &[(String, PkgState)],
    ) -> SolverResult<ResolutionOutcome> {
        let mut roots: Vec<String> = requests.iter().map(|(fp, _)| fp.clone()).collect();
        // Installed packages join the universe so removals see their real
        // dependents
        for fingerprint in self.index.fingerprints() {
            if self.index.current_state(&fingerprint) == Some(PkgState::Present)
                && !roots.contains(&fingerprint)
            {
                roots.push(fingerprint);
            }
        }

        let builder = RelationBuilder::new(
            &self.index,
            Arc::clone(&self.repository),
            Arc::clone(&self.hasher),
            BuildOptions {
                fetch_timeout: self.options.fetch_timeout,
                version_policy: self.options.version_policy,
            },
        );
        let graph = builder.expand(&roots).await?;

        let resolution = StateResolver::new(&self.index, &graph).resolve(requests)?;
        let plan = TransactionPlanner::new(&self.index, &graph).plan(&resolution)?;

        info!(
            universe = graph.package_count(),
            installs = plan.install.len(),
            uninstalls = plan.uninstall.len(),
            "resolution complete"
        );
        Ok(ResolutionOutcome { resolution, plan })
    }

    /// Record a fully applied plan's outcome as the new current states
    pub fn mark_applied(&self, plan: &TransactionPlan) {
        for fingerprint in &plan.install {
            self.index.set_current_state(fingerprint, PkgState::Present);
        }
        for fingerprint in &plan.uninstall {
            self.index.set_current_state(fingerprint, PkgState::Absent);
        }
    }
}
