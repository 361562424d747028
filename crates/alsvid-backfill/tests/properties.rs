//! Property tests for the engine's scheduling invariants.

use proptest::prelude::*;

use alsvid_backfill::{best_fit_fill, first_fit_fill, greedy_fill, locate_window, FirstFitScratch};
use alsvid_core::{
    BackfillQueue, Cluster, Job, JobId, MockResourceManager, Node, NodeState, PartitionId,
    PolicyLevel, SchedConfig, SchedCtx,
};

fn build_cluster(nodes: u32, procs: u32, sizes: &[u32]) -> (Cluster, Vec<JobId>) {
    let mut cluster = Cluster::new(SchedConfig::default());
    cluster.now = 5_000;
    for i in 0..nodes {
        cluster.add_node(Node::new(format!("n{i}"), procs));
    }
    let ids = sizes
        .iter()
        .enumerate()
        .map(|(i, &tasks)| cluster.add_job(Job::new(format!("j{i}"), tasks, 600)))
        .collect();
    (cluster, ids)
}

proptest! {
    #[test]
    fn best_fit_never_exceeds_window_capacity(
        sizes in prop::collection::vec(1u32..10, 1..12),
        nodes in 1u32..6,
        procs in 1u32..9,
    ) {
        let (mut cluster, ids) = build_cluster(nodes, procs, &sizes);
        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &Job::new("t", 1, 600), 0, None).unwrap();

        let mut rm = MockResourceManager::new();
        let queue = BackfillQueue::from_ids(ids);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = best_fit_fill(&mut ctx, &queue, &window).unwrap();

        prop_assert!(stats.procs_committed <= window.tasks);
        prop_assert_eq!(stats.remaining_procs, window.tasks - stats.procs_committed);
    }

    #[test]
    fn first_fit_never_exceeds_window_capacity(
        sizes in prop::collection::vec(1u32..10, 1..12),
        nodes in 1u32..6,
        procs in 1u32..9,
    ) {
        let (mut cluster, ids) = build_cluster(nodes, procs, &sizes);
        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &Job::new("t", 1, 600), 0, None).unwrap();

        let mut rm = MockResourceManager::new();
        let queue = BackfillQueue::from_ids(ids);
        let mut scratch = FirstFitScratch::new();
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = first_fit_fill(&mut ctx, &queue, &window, &mut scratch).unwrap();

        prop_assert!(stats.procs_committed <= window.tasks);
    }

    #[test]
    fn greedy_restores_every_node_it_did_not_commit(
        sizes in prop::collection::vec(1u32..6, 1..10),
        nodes in 2u32..8,
    ) {
        let (mut cluster, ids) = build_cluster(nodes, 1, &sizes);
        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &Job::new("t", 1, 600), 0, None).unwrap();

        let before: Vec<NodeState> = cluster
            .node_slots()
            .iter()
            .flatten()
            .map(|n| n.state)
            .collect();

        let mut rm = MockResourceManager::new();
        let queue = BackfillQueue::from_ids(ids);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        greedy_fill(&mut ctx, &queue, &window).unwrap();

        // nodes committed to a started job may legitimately change state;
        // every other node must be exactly as it was before the pass
        let mut committed_nodes = std::collections::HashSet::new();
        for &job in &rm.started {
            if let Some(alloc) = rm.allocation(job) {
                for &(index, _) in alloc {
                    committed_nodes.insert(index);
                }
            }
        }

        for (i, node) in cluster.node_slots().iter().flatten().enumerate() {
            if !committed_nodes.contains(&node.index) {
                prop_assert_eq!(node.state, before[i], "node {} changed state", node.index);
            }
        }
    }
}
