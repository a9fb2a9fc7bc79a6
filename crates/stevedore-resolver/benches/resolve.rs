//! End-to-end resolution benchmarks over synthetic chart universes.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use semver::{Version, VersionReq};

use stevedore_core::{Chart, ChartManifest, DependencyDecl, PkgState};
use stevedore_registry::MemoryRepository;
use stevedore_resolver::Solver;

fn chart(name: &str, deps: Vec<DependencyDecl>) -> Chart {
    Chart::new(
        ChartManifest {
            name: name.to_string(),
            version: Version::new(1, 0, 0),
            namespace: None,
            dependencies: deps,
        },
        name.as_bytes().to_vec(),
    )
}

fn decl(name: &str) -> DependencyDecl {
    DependencyDecl {
        name: name.to_string(),
        range: VersionReq::parse("^1").unwrap(),
        optional: false,
        namespace: None,
    }
}

/// Repository holding a dependency chain pkg0 -> pkg1 -> ... -> pkgN
fn chain_repo(size: usize) -> Arc<MemoryRepository> {
    let repo = Arc::new(MemoryRepository::new());
    for i in 0..size {
        let deps = if i + 1 < size {
            vec![decl(&format!("pkg{}", i + 1))]
        } else {
            Vec::new()
        };
        repo.publish(chart(&format!("pkg{i}"), deps));
    }
    repo
}

fn bench_resolve_chain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("resolve_chain");

    for size in [10usize, 50, 200] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("packages", size), &size, |b, &size| {
            let repo = chain_repo(size);
            b.iter(|| {
                runtime.block_on(async {
                    let solver = Solver::new(Arc::clone(&repo));
                    let root = solver
                        .add_chart(
                            chart("pkg0", vec![decl("pkg1")]),
                            PkgState::Absent,
                        )
                        .unwrap();
                    let outcome = solver
                        .resolve(&[(root, PkgState::Present)])
                        .await
                        .unwrap();
                    black_box(outcome.plan.install.len())
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolve_chain);
criterion_main!(benches);
