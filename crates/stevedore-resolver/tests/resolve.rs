//! End-to-end resolution scenarios against the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::{Version, VersionReq};

use stevedore_core::{Chart, ChartManifest, DependencyDecl, PkgState, SolverError, SolverResult};
use stevedore_registry::{ArchiveRef, ChartRepository, MemoryRepository};
use stevedore_resolver::{Solver, SolverOptions};

/// Honor RUST_LOG when debugging a scenario
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn chart(name: &str, version: &str, deps: Vec<DependencyDecl>) -> Chart {
    Chart::new(
        ChartManifest {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            namespace: None,
            dependencies: deps,
        },
        format!("{name}-{version}-archive").into_bytes(),
    )
}

fn decl(name: &str, range: &str) -> DependencyDecl {
    DependencyDecl {
        name: name.to_string(),
        range: VersionReq::parse(range).unwrap(),
        optional: false,
        namespace: None,
    }
}

fn optional_decl(name: &str, range: &str) -> DependencyDecl {
    DependencyDecl {
        optional: true,
        ..decl(name, range)
    }
}

fn present(fp: &str) -> (String, PkgState) {
    (fp.to_string(), PkgState::Present)
}

fn absent(fp: &str) -> (String, PkgState) {
    (fp.to_string(), PkgState::Absent)
}

/// web depends on db; only web is registered with the solver, db comes from
/// the repository
fn web_db_repo() -> Arc<MemoryRepository> {
    let repo = Arc::new(MemoryRepository::new());
    repo.publish(chart("db", "2.0.0", Vec::new()));
    repo.publish(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]));
    repo
}

#[tokio::test]
async fn install_orders_dependency_before_dependent() {
    init_tracing();
    let repo = web_db_repo();
    let solver = Solver::new(Arc::clone(&repo));
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Absent)
        .unwrap();

    let outcome = solver.resolve(&[present(&web)]).await.unwrap();

    assert_eq!(outcome.plan.install.len(), 2);
    assert!(outcome.plan.install[0].starts_with("db-2.0.0-"));
    assert_eq!(outcome.plan.install[1], web);
    assert!(outcome.plan.uninstall.is_empty());

    // The dependency was pulled into the universe
    assert_eq!(solver.index().len(), 2);
}

#[tokio::test]
async fn resolution_is_deterministic_across_runs() {
    let repo = web_db_repo();

    let mut encoded_plans = Vec::new();
    for _ in 0..2 {
        let solver = Solver::new(Arc::clone(&repo));
        let web = solver
            .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Absent)
            .unwrap();
        let outcome = solver.resolve(&[present(&web)]).await.unwrap();
        encoded_plans.push(outcome.plan.to_json().unwrap());
    }

    assert_eq!(encoded_plans[0], encoded_plans[1]);
}

#[tokio::test]
async fn removal_is_blocked_by_installed_dependent() {
    let repo = web_db_repo();
    let solver = Solver::new(Arc::clone(&repo));
    let db = solver
        .add_chart(chart("db", "2.0.0", Vec::new()), PkgState::Present)
        .unwrap();
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Present)
        .unwrap();

    let err = solver.resolve(&[absent(&db)]).await.unwrap_err();
    match err {
        SolverError::DependentStillRequires { removed, blocked_by } => {
            assert_eq!(removed, db);
            assert_eq!(blocked_by, web);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn joint_removal_orders_dependent_first() {
    let repo = web_db_repo();
    let solver = Solver::new(Arc::clone(&repo));
    let db = solver
        .add_chart(chart("db", "2.0.0", Vec::new()), PkgState::Present)
        .unwrap();
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Present)
        .unwrap();

    let outcome = solver.resolve(&[absent(&db), absent(&web)]).await.unwrap();

    assert_eq!(outcome.plan.uninstall, vec![web, db]);
    assert!(outcome.plan.install.is_empty());
}

#[tokio::test]
async fn optional_dependency_is_not_force_installed() {
    let repo = Arc::new(MemoryRepository::new());
    repo.publish(chart("cache", "3.0.0", Vec::new()));

    let solver = Solver::new(Arc::clone(&repo));
    let web = solver
        .add_chart(
            chart("web", "1.0.0", vec![optional_decl("cache", "^3")]),
            PkgState::Absent,
        )
        .unwrap();

    let outcome = solver.resolve(&[present(&web)]).await.unwrap();

    assert_eq!(outcome.plan.install, vec![web]);
    // The optional dependency is in the universe but not in the plan
    assert_eq!(solver.index().len(), 2);
}

#[tokio::test]
async fn mandatory_cycle_installs_deterministically() {
    let repo = Arc::new(MemoryRepository::new());
    repo.publish(chart("a", "1.0.0", vec![decl("b", "^1")]));
    repo.publish(chart("b", "1.0.0", vec![decl("a", "^1")]));

    let solver = Solver::new(Arc::clone(&repo));
    let a = solver
        .add_chart(chart("a", "1.0.0", vec![decl("b", "^1")]), PkgState::Absent)
        .unwrap();

    let outcome = solver.resolve(&[present(&a)]).await.unwrap();

    assert_eq!(outcome.plan.install.len(), 2);
    assert!(outcome.plan.install[0].starts_with("a-1.0.0-"));
    assert!(outcome.plan.install[1].starts_with("b-1.0.0-"));
}

#[tokio::test]
async fn missing_dependency_aborts_resolution() {
    let repo = Arc::new(MemoryRepository::new());
    let solver = Solver::new(Arc::clone(&repo));
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("ghost", "^1")]), PkgState::Absent)
        .unwrap();

    let err = solver.resolve(&[present(&web)]).await.unwrap_err();
    assert!(matches!(err, SolverError::DependencyLocate { .. }));
}

#[tokio::test]
async fn applied_plan_resolves_to_nothing() {
    let repo = web_db_repo();
    let solver = Solver::new(Arc::clone(&repo));
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Absent)
        .unwrap();

    let outcome = solver.resolve(&[present(&web)]).await.unwrap();
    solver.mark_applied(&outcome.plan);

    let outcome = solver.resolve(&[present(&web)]).await.unwrap();
    assert!(outcome.plan.is_empty());
}

/// Repository that answers after a delay, to exercise the abort signal
struct SlowRepository {
    inner: MemoryRepository,
    latency: Duration,
}

#[async_trait]
impl ChartRepository for SlowRepository {
    async fn locate(&self, name: &str, range: &VersionReq) -> SolverResult<ArchiveRef> {
        tokio::time::sleep(self.latency).await;
        self.inner.locate(name, range).await
    }

    async fn load(&self, archive: &ArchiveRef) -> SolverResult<Chart> {
        tokio::time::sleep(self.latency).await;
        self.inner.load(archive).await
    }
}

#[tokio::test]
async fn slow_repository_turns_into_an_abort() {
    let inner = MemoryRepository::new();
    inner.publish(chart("db", "2.0.0", Vec::new()));
    let repo = Arc::new(SlowRepository {
        inner,
        latency: Duration::from_millis(250),
    });

    let solver = Solver::with_options(
        repo,
        SolverOptions {
            fetch_timeout: Some(Duration::from_millis(10)),
            ..SolverOptions::default()
        },
    );
    let web = solver
        .add_chart(chart("web", "1.0.0", vec![decl("db", ">=2.0.0")]), PkgState::Absent)
        .unwrap();

    let err = solver.resolve(&[present(&web)]).await.unwrap_err();
    assert!(matches!(err, SolverError::Aborted { .. }));
}
