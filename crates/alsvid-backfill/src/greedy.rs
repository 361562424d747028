//! Greedy backtracking backfill.
//!
//! Bounded depth-first search over ordered subsets of the idle queue,
//! maximizing total utility under the partition's metric. Candidate jobs are
//! tentatively placed by marking their nodes `Reserved` so deeper candidates
//! see the reduced capacity; backtracking restores the exact prior state
//! from a snapshot taken on entry, keyed by stable node index. The full
//! snapshot is applied unconditionally before any committed start touches
//! the real tables.

use tracing::{debug, error, trace, warn};

use alsvid_core::ctx::SchedCtx;
use alsvid_core::job::{Job, JobId};
use alsvid_core::node::NodeState;
use alsvid_core::partition::UtilityMetric;
use alsvid_core::queue::BackfillQueue;
use alsvid_core::rm::{NodeList, Selection};

use crate::bestfit::best_fit_fill;
use crate::error::BackfillResult;
use crate::pass::PassStats;
use crate::snapshot::ClusterSnapshot;
use crate::window::{locate_window, Window};

/// Cap on the queue prefix the search considers.
pub const MAX_GREEDY_JOBS: usize = 100;

/// One tentatively scheduled job in the current search branch.
struct Chosen {
    job: JobId,
    queue_index: usize,
    nodes: NodeList,
    procs: u32,
    walltime: u64,
}

pub fn greedy_fill(
    ctx: &mut SchedCtx<'_>,
    queue: &BackfillQueue,
    window: &Window,
) -> BackfillResult<PassStats> {
    let metric = ctx.cluster.utility_metric(ctx.partition);
    let max_schedules = ctx.cluster.global_partition().max_schedules;

    let mut local = queue.clone();
    local.truncate(MAX_GREEDY_JOBS);

    let snapshot = ClusterSnapshot::capture(ctx.cluster);

    let mut attempt: Vec<Chosen> = Vec::new();
    let mut committed = 0u32;
    let mut start_index = 0usize;

    let mut best: Vec<JobId> = Vec::new();
    let mut best_value = 0u64;

    let mut explored = 0u32;
    let mut stats = PassStats::default();

    debug!(
        partition = %ctx.partition,
        procs = window.tasks,
        duration = %window.duration,
        ?metric,
        "greedy backfill search"
    );

    while explored < max_schedules {
        explored += 1;

        // extend the current schedule: sweep forward from just after the
        // last added job, adding every feasible candidate
        let mut jindex = start_index;
        while jindex < local.len() {
            let cur = jindex;
            jindex += 1;

            if explored >= max_schedules {
                warn!(max_schedules, "max backfill schedules reached");
                break;
            }
            let Some(jid) = local.get(cur) else {
                continue;
            };
            let Ok(job) = ctx.cluster.job(jid) else {
                continue;
            };

            let procs = match ctx.cluster.combine_sync(jid) {
                Ok(procs) => procs,
                Err(err) => {
                    debug!(job = %job.name, %err, "job rejected (dependency)");
                    continue;
                }
            };
            if job.billing_failed {
                continue;
            }
            if job.time_locked {
                debug!(job = %job.name, partition = %ctx.partition, "job rejected (time locked)");
                continue;
            }
            // structural rejections hold in every partial schedule
            if !job.state.is_idle() || !job.expected_state.is_idle() {
                local.mark_ineligible(cur);
                continue;
            }
            if !window.duration.fits(job.walltime) {
                trace!(job = %job.name, "job is too long");
                local.mark_ineligible(cur);
                continue;
            }
            if procs > window.tasks {
                trace!(job = %job.name, "job is too large");
                local.mark_ineligible(cur);
                continue;
            }
            if committed + procs > window.tasks {
                trace!(job = %job.name, "job does not fit in schedule");
                continue;
            }

            stats.evaluated += 1;

            // schedule-dependent rejections are only memoized at depth 0: a
            // job infeasible in one partial schedule may fit in another
            let depth0 = attempt.is_empty();

            if !ctx.check_limits(job) {
                trace!(job = %job.name, "job fails active fairness policies");
                if depth0 {
                    local.mark_ineligible(cur);
                }
                continue;
            }
            let Some(feasible) = window.feasible_for(ctx.cluster, job, false) else {
                continue;
            };
            let Some(Selection { nodes, .. }) = ctx.select_nodes(job, &feasible) else {
                if depth0 {
                    local.mark_ineligible(cur);
                }
                continue;
            };

            let name = job.name.clone();
            let walltime = job.walltime;

            if let Err(err) = ctx.allocate(jid, &nodes) {
                trace!(job = %name, %err, "cannot allocate with current schedule");
                if depth0 {
                    local.mark_ineligible(cur);
                }
                continue;
            }

            // tentatively place the job: later candidates in this branch see
            // its nodes as reserved
            for &(index, _) in &nodes {
                if let Some(node) = ctx.cluster.node_mut(index) {
                    node.state = NodeState::Reserved;
                }
            }
            committed += procs;
            trace!(job = %name, procs, committed, "added to trial schedule");
            attempt.push(Chosen {
                job: jid,
                queue_index: cur,
                nodes,
                procs,
                walltime,
            });
        }

        // no further extension possible: score the complete schedule
        let value: u64 = attempt
            .iter()
            .map(|c| metric.value(c.procs, c.walltime))
            .sum();

        if value > best_value {
            best = attempt.iter().map(|c| c.job).collect();
            best_value = value;
            debug!(
                explored,
                utility = value,
                procs_free = window.tasks - committed,
                "improved schedule found"
            );
            if metric == UtilityMetric::Procs && committed == window.tasks {
                // perfect pack, nothing can beat it
                debug!("perfect pack found, stopping search");
                break;
            }
        }

        // backtrack: drop the newest choice and explore without it
        let Some(popped) = attempt.pop() else {
            break;
        };
        committed -= popped.procs;
        snapshot.restore_nodes(ctx.cluster, &popped.nodes);
        trace!(job = %popped.job, "trial reservation released");
        start_index = popped.queue_index + 1;
    }

    // every trial mutation must be gone before any real start is applied
    snapshot.restore(ctx.cluster);

    if best.is_empty() {
        debug!("no jobs found to backfill");
        stats.remaining_procs = window.tasks;
        return Ok(stats);
    }

    debug!(
        explored,
        utility = best_value,
        jobs = best.len(),
        "committing greedy schedule"
    );

    // commit: concurrent scheduling-state drift between search and commit is
    // possible and unguarded, so every job failure is tolerated
    let mut commit_failed = false;
    for jid in best {
        let (name, procs) = {
            let job = ctx.cluster.job(jid)?;
            let procs = ctx.cluster.combine_sync(jid).unwrap_or_else(|_| job.procs());
            (job.name.clone(), procs)
        };

        let limits_ok = {
            let job = ctx.cluster.job(jid)?;
            ctx.check_limits(job)
        };
        if !limits_ok {
            error!(job = %name, "scheduling failure (policy violation at commit)");
            commit_failed = true;
            continue;
        }

        let selection = {
            let job = ctx.cluster.job(jid)?;
            ctx.select_nodes(job, &window.entries)
        };
        let Some(Selection { nodes, .. }) = selection else {
            error!(job = %name, "cannot select tasks at commit");
            commit_failed = true;
            continue;
        };

        if let Err(err) = ctx.allocate(jid, &nodes) {
            error!(job = %name, %err, "cannot allocate resources at commit");
            commit_failed = true;
            continue;
        }
        if let Err(err) = ctx.start(jid, "job backfilled") {
            error!(job = %name, %err, "cannot start job at commit");
            commit_failed = true;
            continue;
        }

        {
            let job = ctx.cluster.job_mut(jid)?;
            job.flags.backfilled = true;
        }
        ctx.note_backfill_started(jid);
        stats.started += 1;
        stats.procs_committed += procs;
    }
    stats.remaining_procs = window.tasks.saturating_sub(stats.procs_committed);

    if commit_failed {
        // part of the plan fell through; salvage leftover capacity with one
        // reduced best-fit pass over a fresh single-proc window
        let probe = Job::new("greedy-salvage", 1, 0).with_partition(ctx.partition);
        match locate_window(ctx.cluster, ctx.partition, &probe, 0, None) {
            Ok(salvage_window) => {
                debug!("running best-fit salvage pass");
                let salvage = best_fit_fill(ctx, queue, &salvage_window)?;
                stats.absorb(salvage);
            }
            Err(err) => debug!(%err, "no salvage window available"),
        }
    }

    Ok(stats)
}
