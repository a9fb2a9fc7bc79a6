//! HTTP registry client with connection pooling and retry logic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, ClientBuilder, StatusCode};
use semver::{Version, VersionReq};
use tracing::warn;
use url::Url;

use stevedore_core::{Chart, ChartManifest, DependencyDecl, SolverError, SolverResult};

use crate::api::{ChartEntry, FamilyDocument};
use crate::repository::{ArchiveRef, ChartRepository};

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// HTTP-backed chart repository.
///
/// Serves `locate`/`load` from a registry that publishes one JSON index
/// document per chart family (see `api`). Family documents are cached for
/// the lifetime of the client; transport failures are retried with bounded
/// exponential backoff, definitive answers (missing family, bad archive) are
/// not.
#[derive(Debug)]
pub struct HttpRepository {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Registry root, e.g. `https://charts.example.com/`
    base_url: Url,
    retry_config: RetryConfig,
    /// family name -> cached index document
    cache: DashMap<String, Arc<FamilyDocument>>,
}

impl HttpRepository {
    /// Create a client with the default retry configuration
    pub fn new(base_url: &str) -> SolverResult<Self> {
        Self::with_retry(base_url, RetryConfig::default())
    }

    /// Create a client with a custom retry configuration
    pub fn with_retry(base_url: &str, retry_config: RetryConfig) -> SolverResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SolverError::network(format!("invalid registry url '{base_url}'"), e))?;

        let client = ClientBuilder::new()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent("stevedore/0.1.0")
            .build()
            .map_err(|e| SolverError::network("failed to create HTTP client".to_string(), e))?;

        Ok(Self {
            client,
            base_url,
            retry_config,
            cache: DashMap::new(),
        })
    }

    /// Index document URL for one family
    fn family_url(&self, name: &str) -> SolverResult<Url> {
        self.base_url
            .join(&format!("charts/{name}/index.json"))
            .map_err(|e| SolverError::network(format!("invalid chart name '{name}'"), e))
    }

    /// Fetch a family's index document, consulting the cache first.
    /// `Ok(None)` means the registry definitively does not know the family.
    async fn fetch_family(&self, name: &str) -> SolverResult<Option<Arc<FamilyDocument>>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Some(Arc::clone(&cached)));
        }

        let url = self.family_url(name)?;
        let document = self
            .run_with_retry(|| async {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| SolverError::network(format!("GET {url} failed"), e))?;

                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let response = response
                    .error_for_status()
                    .map_err(|e| SolverError::network(format!("GET {url} failed"), e))?;

                let document: FamilyDocument = response
                    .json()
                    .await
                    .map_err(|e| SolverError::network(format!("bad index document at {url}"), e))?;
                Ok(Some(document))
            })
            .await?;

        Ok(document.map(|doc| {
            let doc = Arc::new(doc);
            self.cache.insert(name.to_string(), Arc::clone(&doc));
            doc
        }))
    }

    /// Execute an operation with exponential backoff retry on transport
    /// errors; definitive failures propagate immediately
    async fn run_with_retry<F, Fut, T>(&self, operation: F) -> SolverResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = SolverResult<T>>,
    {
        let mut delay = self.retry_config.initial_delay;

        for attempt in 0..=self.retry_config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let retryable = matches!(error, SolverError::Network { .. });
                    if !retryable || attempt == self.retry_config.max_retries {
                        return Err(error);
                    }

                    warn!(attempt, %error, "registry request failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay.mul_f64(self.retry_config.multiplier), self.retry_config.max_delay);
                }
            }
        }

        // The loop always returns; retries are bounded by max_retries
        Err(SolverError::Aborted {
            reason: "retry budget exhausted".to_string(),
        })
    }

    /// Pick the highest published version satisfying `range`
    fn best_entry<'doc>(
        document: &'doc FamilyDocument,
        range: &VersionReq,
    ) -> Option<(Version, &'doc ChartEntry)> {
        document
            .versions
            .iter()
            .filter_map(|(raw, entry)| Version::parse(raw).ok().map(|v| (v, entry)))
            .filter(|(version, _)| range.matches(version))
            .max_by(|(a, _), (b, _)| a.cmp(b))
    }

    /// Parse a published entry's declarations into manifest dependencies
    fn parse_dependencies(entry: &ChartEntry) -> SolverResult<Vec<DependencyDecl>> {
        entry
            .dependencies
            .iter()
            .map(|dep| {
                let range = VersionReq::parse(&dep.range).map_err(|e| SolverError::DependencyLoad {
                    archive: entry.archive.clone(),
                    reason: format!("invalid range '{}' for dependency '{}': {e}", dep.range, dep.name),
                })?;
                Ok(DependencyDecl {
                    name: dep.name.clone(),
                    range,
                    optional: dep.optional,
                    namespace: dep.namespace.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChartRepository for HttpRepository {
    async fn locate(&self, name: &str, range: &VersionReq) -> SolverResult<ArchiveRef> {
        let not_found = || SolverError::DependencyLocate {
            name: name.to_string(),
            range: range.to_string(),
        };

        let document = self.fetch_family(name).await?.ok_or_else(not_found)?;
        let (version, entry) = Self::best_entry(&document, range).ok_or_else(not_found)?;

        Ok(ArchiveRef {
            name: name.to_string(),
            version,
            location: entry.archive.clone(),
        })
    }

    async fn load(&self, archive: &ArchiveRef) -> SolverResult<Chart> {
        let document = self
            .fetch_family(&archive.name)
            .await?
            .ok_or_else(|| SolverError::DependencyLoad {
                archive: archive.location.clone(),
                reason: "family vanished from the registry".to_string(),
            })?;

        let entry = document
            .versions
            .get(&archive.version.to_string())
            .ok_or_else(|| SolverError::DependencyLoad {
                archive: archive.location.clone(),
                reason: format!("version {} is not published", archive.version),
            })?;

        let dependencies = Self::parse_dependencies(entry)?;

        let data = self
            .run_with_retry(|| async {
                let response = self
                    .client
                    .get(&entry.archive)
                    .send()
                    .await
                    .map_err(|e| SolverError::network(format!("GET {} failed", entry.archive), e))?
                    .error_for_status()
                    .map_err(|e| SolverError::network(format!("GET {} failed", entry.archive), e))?;

                response
                    .bytes()
                    .await
                    .map_err(|e| SolverError::network(format!("reading {} failed", entry.archive), e))
            })
            .await?;

        Ok(Chart::new(
            ChartManifest {
                name: archive.name.clone(),
                version: archive.version.clone(),
                namespace: entry.namespace.clone(),
                dependencies,
            },
            data.to_vec(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_config_default_is_bounded() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert!(config.initial_delay < config.max_delay);
    }

    #[test]
    fn test_family_url_layout() {
        let repo = HttpRepository::new("https://charts.example.com/").unwrap();
        let url = repo.family_url("web").unwrap();
        assert_eq!(url.as_str(), "https://charts.example.com/charts/web/index.json");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpRepository::new("not a url").is_err());
    }

    #[test]
    fn test_best_entry_picks_highest() {
        let document: FamilyDocument = serde_json::from_str(
            r#"{
                "name": "db",
                "versions": {
                    "1.0.0": { "version": "1.0.0", "archive": "https://x/db-1.tgz", "digest": null, "namespace": null },
                    "2.0.0": { "version": "2.0.0", "archive": "https://x/db-2.tgz", "digest": null, "namespace": null },
                    "3.0.0": { "version": "3.0.0", "archive": "https://x/db-3.tgz", "digest": null, "namespace": null }
                }
            }"#,
        )
        .unwrap();

        let range = VersionReq::parse("<3.0.0").unwrap();
        let (version, entry) = HttpRepository::best_entry(&document, &range).unwrap();
        assert_eq!(version.to_string(), "2.0.0");
        assert_eq!(entry.archive, "https://x/db-2.tgz");
    }

    #[test]
    fn test_parse_dependencies_rejects_bad_range() {
        let entry: ChartEntry = serde_json::from_str(
            r#"{
                "version": "1.0.0",
                "archive": "https://x/web.tgz",
                "digest": null,
                "namespace": null,
                "dependencies": [{ "name": "db", "range": "not-a-range" }]
            }"#,
        )
        .unwrap();

        let err = HttpRepository::parse_dependencies(&entry).unwrap_err();
        assert!(matches!(err, SolverError::DependencyLoad { .. }));
    }
}
