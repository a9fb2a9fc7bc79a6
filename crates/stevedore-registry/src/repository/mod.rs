//! The repository collaborator contract and the in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use semver::{Version, VersionReq};

use stevedore_core::{Chart, SolverError, SolverResult};

/// Handle to a located chart archive, produced by `locate` and redeemed by
/// `load`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    /// Chart name the archive was located under
    pub name: String,
    /// Concrete version the range resolved to
    pub version: Version,
    /// Repository-specific location (URL for HTTP, store key in memory)
    pub location: String,
}

/// A source of chart packages.
///
/// `locate` answers "which concrete archive satisfies this name and range",
/// `load` fetches and parses it. Implementations pick the highest satisfying
/// version. Both calls are bounded by the caller's timeout; neither is
/// retried by the resolver core.
#[async_trait]
pub trait ChartRepository: Send + Sync {
    /// Find the archive for the highest version of `name` satisfying `range`
    async fn locate(&self, name: &str, range: &VersionReq) -> SolverResult<ArchiveRef>;

    /// Fetch and parse a located archive into a chart
    async fn load(&self, archive: &ArchiveRef) -> SolverResult<Chart>;
}

/// In-process chart repository backed by a version-indexed store.
///
/// Used by tests and offline runs; published charts are served back
/// verbatim.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    charts: DashMap<String, Vec<Arc<Chart>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a chart available under its manifest name
    pub fn publish(&self, chart: Chart) {
        self.charts
            .entry(chart.manifest.name.clone())
            .or_default()
            .push(Arc::new(chart));
    }

    pub fn chart_count(&self) -> usize {
        self.charts.iter().map(|e| e.value().len()).sum()
    }
}

#[async_trait]
impl ChartRepository for MemoryRepository {
    async fn locate(&self, name: &str, range: &VersionReq) -> SolverResult<ArchiveRef> {
        let Some(versions) = self.charts.get(name) else {
            return Err(SolverError::DependencyLocate {
                name: name.to_string(),
                range: range.to_string(),
            });
        };

        versions
            .iter()
            .filter(|c| range.matches(&c.manifest.version))
            .max_by(|a, b| a.manifest.version.cmp(&b.manifest.version))
            .map(|c| ArchiveRef {
                name: name.to_string(),
                version: c.manifest.version.clone(),
                location: format!("memory://{}/{}", name, c.manifest.version),
            })
            .ok_or_else(|| SolverError::DependencyLocate {
                name: name.to_string(),
                range: range.to_string(),
            })
    }

    async fn load(&self, archive: &ArchiveRef) -> SolverResult<Chart> {
        self.charts
            .get(&archive.name)
            .and_then(|versions| {
                versions
                    .iter()
                    .find(|c| c.manifest.version == archive.version)
                    .map(|c| Chart::clone(c))
            })
            .ok_or_else(|| SolverError::DependencyLoad {
                archive: archive.location.clone(),
                reason: "archive vanished from the store".to_string(),
            })
    }
}
