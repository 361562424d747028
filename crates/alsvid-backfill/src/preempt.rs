//! Preemption-based backfill.
//!
//! Repeatedly starts the single highest-backfill-priority job among those
//! willing to preempt, shrinking remaining capacity, until no eligible
//! winner remains. Jobs too large for what is left are marked ineligible for
//! the rest of the pass — capacity only shrinks, so they cannot become
//! feasible later.

use tracing::debug;

use alsvid_core::ctx::SchedCtx;
use alsvid_core::job::JobId;
use alsvid_core::queue::BackfillQueue;
use alsvid_core::rm::Selection;

use crate::error::BackfillResult;
use crate::pass::PassStats;
use crate::window::Window;

pub fn preemptive_fill(
    ctx: &mut SchedCtx<'_>,
    queue: &mut BackfillQueue,
    window: &Window,
) -> BackfillResult<PassStats> {
    let mut stats = PassStats::default();
    let mut remaining_procs = window.tasks;
    let mut remaining_nodes = window.nodes;

    debug!(
        partition = %ctx.partition,
        procs = remaining_procs,
        nodes = remaining_nodes,
        "preemptive backfill pass"
    );

    loop {
        // find the highest-priority backfill job that still fits
        let mut best: Option<(usize, JobId, f64, u32, u32)> = None;
        let slots: Vec<(usize, JobId)> = queue.eligible().collect();
        for (slot, jid) in slots {
            let Ok(job) = ctx.cluster.job(jid) else {
                continue;
            };
            if job.billing_failed {
                continue;
            }
            if job.time_locked {
                debug!(job = %job.name, partition = %ctx.partition, "job rejected (time locked)");
                continue;
            }

            let procs = job.procs();
            let nodes = job.min_nodes;
            if procs > remaining_procs || nodes > remaining_nodes {
                // inadequate resources remaining for the rest of the pass
                queue.mark_ineligible(slot);
                continue;
            }

            let score = job.backfill_priority;
            let best_score = best.map_or(0.0, |(_, _, s, _, _)| s);
            if score > best_score {
                best = Some((slot, jid, score, procs, nodes));
            }
        }

        let Some((slot, jid, _score, procs, nodes_needed)) = best else {
            // no feasible job found
            break;
        };

        stats.evaluated += 1;

        let (limits_ok, name) = {
            let job = ctx.cluster.job(jid)?;
            (ctx.check_limits(job), job.name.clone())
        };
        if !limits_ok {
            debug!(job = %name, "job rejected by active policy");
            queue.mark_ineligible(slot);
            continue;
        }

        let selection = {
            let job = ctx.cluster.job(jid)?;
            ctx.select_nodes(job, &window.entries)
        };
        let Some(Selection { nodes, .. }) = selection else {
            debug!(job = %name, "cannot select procs for job");
            queue.mark_ineligible(slot);
            continue;
        };

        if let Err(err) = ctx.allocate(jid, &nodes) {
            debug!(job = %name, %err, "cannot allocate resources for job");
            queue.mark_ineligible(slot);
            continue;
        }

        if let Err(err) = ctx.start(jid, "job preempted") {
            debug!(job = %name, %err, "cannot start job");
            queue.mark_ineligible(slot);
            continue;
        }

        // started under preemption-based backfill: the job is itself
        // preemptible from now on
        {
            let job = ctx.cluster.job_mut(jid)?;
            job.flags.backfilled = true;
            job.flags.preemptee = true;
        }
        ctx.note_backfill_started(jid);

        remaining_procs -= procs;
        remaining_nodes -= nodes_needed;
        stats.started += 1;
        stats.procs_committed += procs;
        queue.mark_ineligible(slot);

        debug!(job = %name, procs, "job started by preemptive backfill");
    }

    stats.remaining_procs = remaining_procs;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::locate_window;
    use alsvid_core::cluster::Cluster;
    use alsvid_core::config::SchedConfig;
    use alsvid_core::job::Job;
    use alsvid_core::node::Node;
    use alsvid_core::partition::PartitionId;
    use alsvid_core::rm::{MockResourceManager, PolicyLevel};

    fn make_cluster(nodes: u32, procs: u32) -> Cluster {
        let mut cluster = Cluster::new(SchedConfig::default());
        cluster.now = 1_000;
        for i in 0..nodes {
            cluster.add_node(Node::new(format!("n{i}"), procs));
        }
        cluster
    }

    fn window_for(cluster: &Cluster) -> Window {
        locate_window(cluster, PartitionId::GLOBAL, &Job::new("t", 1, 600), 0, None).unwrap()
    }

    #[test]
    fn test_highest_priority_starts_first() {
        let mut cluster = make_cluster(2, 4);
        let low = cluster.add_job(Job::new("low", 2, 600).with_priority(1.0));
        let high = cluster.add_job(Job::new("high", 2, 600).with_priority(9.0));
        let window = window_for(&cluster);

        let mut rm = MockResourceManager::new();
        let mut queue = BackfillQueue::from_ids([low, high]);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = preemptive_fill(&mut ctx, &mut queue, &window).unwrap();

        assert_eq!(stats.started, 2);
        assert_eq!(rm.started, vec![high, low]);
        assert!(cluster.job(high).unwrap().flags.preemptee);
        assert!(cluster.job(high).unwrap().flags.backfilled);
    }

    #[test]
    fn test_zero_priority_jobs_never_win() {
        let mut cluster = make_cluster(1, 4);
        let job = cluster.add_job(Job::new("unwilling", 2, 600));
        let window = window_for(&cluster);

        let mut rm = MockResourceManager::new();
        let mut queue = BackfillQueue::from_ids([job]);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = preemptive_fill(&mut ctx, &mut queue, &window).unwrap();
        assert_eq!(stats.started, 0);
        assert_eq!(stats.remaining_procs, 4);
    }

    #[test]
    fn test_oversized_jobs_marked_ineligible() {
        let mut cluster = make_cluster(1, 4);
        let big = cluster.add_job(Job::new("big", 9, 600).with_priority(5.0));
        let small = cluster.add_job(Job::new("small", 2, 600).with_priority(1.0));
        let window = window_for(&cluster);

        let mut rm = MockResourceManager::new();
        let mut queue = BackfillQueue::from_ids([big, small]);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = preemptive_fill(&mut ctx, &mut queue, &window).unwrap();

        assert_eq!(rm.started, vec![small]);
        assert_eq!(stats.procs_committed, 2);
        assert_eq!(stats.remaining_procs, 2);
    }

    #[test]
    fn test_policy_rejection_does_not_abort_pass() {
        let mut cluster = make_cluster(1, 8);
        let denied = cluster.add_job(Job::new("denied", 2, 600).with_priority(9.0));
        let ok = cluster.add_job(Job::new("ok", 2, 600).with_priority(1.0));
        let window = window_for(&cluster);

        let mut rm = MockResourceManager::new();
        rm.deny_limits.insert(denied);
        let mut queue = BackfillQueue::from_ids([denied, ok]);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = preemptive_fill(&mut ctx, &mut queue, &window).unwrap();
        assert_eq!(rm.started, vec![ok]);
        assert_eq!(stats.started, 1);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut cluster = make_cluster(2, 4);
        let ids: Vec<_> = (0..5)
            .map(|i| {
                cluster.add_job(Job::new(format!("j{i}"), 3, 600).with_priority(f64::from(5 - i)))
            })
            .collect();
        let window = window_for(&cluster);

        let mut rm = MockResourceManager::new();
        let mut queue = BackfillQueue::from_ids(ids);
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = preemptive_fill(&mut ctx, &mut queue, &window).unwrap();
        assert!(stats.procs_committed <= window.tasks);
        assert_eq!(stats.remaining_procs, window.tasks - stats.procs_committed);
    }
}
