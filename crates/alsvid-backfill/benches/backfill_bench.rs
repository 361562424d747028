//! Benchmarks for the backfill hot paths
//!
//! Run with: cargo bench -p alsvid-backfill

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use alsvid_backfill::{best_fit_fill, locate_window};
use alsvid_core::{
    BackfillQueue, Cluster, Job, JobId, MockResourceManager, Node, PartitionId, PolicyLevel,
    SchedConfig, SchedCtx,
};

fn make_cluster(nodes: u32, procs: u32) -> Cluster {
    let mut cluster = Cluster::new(SchedConfig::default());
    cluster.now = 10_000;
    for i in 0..nodes {
        cluster.add_node(Node::new(format!("n{i}"), procs));
    }
    cluster
}

fn make_queue(cluster: &mut Cluster, jobs: u32) -> Vec<JobId> {
    (0..jobs)
        .map(|i| cluster.add_job(Job::new(format!("j{i}"), 1 + i % 8, 600 + u64::from(i) * 60)))
        .collect()
}

/// Benchmark window discovery over growing node tables
fn bench_locate_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_window");

    for nodes in &[16u32, 64, 256] {
        let cluster = make_cluster(*nodes, 8);
        let template = Job::new("probe", 1, 600);

        group.bench_with_input(BenchmarkId::new("nodes", nodes), nodes, |b, _| {
            b.iter(|| {
                locate_window(
                    black_box(&cluster),
                    PartitionId::GLOBAL,
                    black_box(&template),
                    0,
                    None,
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark a full best-fit pass over a mid-sized queue
fn bench_best_fit_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_fit_pass");

    for jobs in &[8u32, 32, 96] {
        group.bench_with_input(BenchmarkId::new("jobs", jobs), jobs, |b, &jobs| {
            b.iter_batched(
                || {
                    let mut cluster = make_cluster(64, 8);
                    let ids = make_queue(&mut cluster, jobs);
                    let window = locate_window(
                        &cluster,
                        PartitionId::GLOBAL,
                        &Job::new("probe", 1, 600),
                        0,
                        None,
                    )
                    .unwrap();
                    (cluster, BackfillQueue::from_ids(ids), window)
                },
                |(mut cluster, queue, window)| {
                    let mut rm = MockResourceManager::new();
                    let mut ctx = SchedCtx::new(
                        &mut cluster,
                        &mut rm,
                        PartitionId::GLOBAL,
                        PolicyLevel::Hard,
                    );
                    best_fit_fill(&mut ctx, &queue, &window).unwrap()
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_locate_window, bench_best_fit_pass);
criterion_main!(benches);
