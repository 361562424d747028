//! Best-fit backfill.
//!
//! Each outer round rescans the entire remaining queue and starts the
//! feasible job with the best utility under the partition's metric, then
//! shrinks capacity and scans again. Only structural infeasibility is
//! memoized: jobs merely out-scored this round stay eligible and are
//! re-evaluated next round, since external policy state can change between
//! rounds.

use tracing::{debug, error, trace};

use alsvid_core::ctx::SchedCtx;
use alsvid_core::job::JobId;
use alsvid_core::queue::BackfillQueue;
use alsvid_core::rm::Selection;

use crate::error::BackfillResult;
use crate::pass::PassStats;
use crate::window::Window;

/// The winner of one scan round.
struct Round {
    slot: usize,
    job: JobId,
    value: u64,
    procs: u32,
}

pub fn best_fit_fill(
    ctx: &mut SchedCtx<'_>,
    queue: &BackfillQueue,
    window: &Window,
) -> BackfillResult<PassStats> {
    let metric = ctx.cluster.utility_metric(ctx.partition);
    // private copy: repeated invocations per iteration must not corrupt the
    // caller's queue
    let mut local = queue.clone();

    let mut stats = PassStats::default();
    let mut remaining = window.tasks;

    debug!(
        partition = %ctx.partition,
        procs = remaining,
        ?metric,
        duration = %window.duration,
        "best-fit backfill pass"
    );

    loop {
        let mut best: Option<Round> = None;

        let slots: Vec<(usize, JobId)> = local.eligible().collect();
        for (slot, jid) in slots {
            let Ok(job) = ctx.cluster.job(jid) else {
                local.mark_ineligible(slot);
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
            if !job.state.is_idle() || !job.expected_state.is_idle() {
                local.mark_ineligible(slot);
                continue;
            }
            if procs > remaining {
                // too big to fit in the window; capacity only shrinks
                local.mark_ineligible(slot);
                continue;
            }

            let value = metric.value(procs, job.walltime);
            if best.as_ref().is_some_and(|b| value <= b.value) {
                trace!(job = %job.name, value, "out-scored this round");
                continue;
            }

            stats.evaluated += 1;

            if !ctx.check_limits(job) {
                trace!(job = %job.name, "job fails active fairness policies");
                local.mark_ineligible(slot);
                continue;
            }
            let Some(feasible) = window.feasible_for(ctx.cluster, job, false) else {
                debug!(job = %job.name, "insufficient feasible nodes");
                continue;
            };
            if ctx.select_nodes(job, &feasible).is_none() {
                debug!(job = %job.name, "cannot select tasks for job");
                local.mark_ineligible(slot);
                continue;
            }

            trace!(job = %job.name, procs, value, "best-fit candidate");
            best = Some(Round {
                slot,
                job: jid,
                value,
                procs,
            });
        }

        let Some(round) = best else {
            debug!("no jobs found to backfill");
            break;
        };

        // the winner is consumed this round whether or not it starts
        local.mark_ineligible(round.slot);

        let (selection, name) = {
            let job = ctx.cluster.job(round.job)?;
            (ctx.select_nodes(job, &window.entries), job.name.clone())
        };
        let Some(Selection {
            nodes,
            needs_preempt,
        }) = selection
        else {
            error!(job = %name, "cannot select tasks for best-fit winner");
            continue;
        };

        if let Err(err) = ctx.allocate(round.job, &nodes) {
            error!(job = %name, %err, "cannot allocate nodes for job");
            continue;
        }

        if let Err(err) = ctx.start(round.job, "job backfilled") {
            if needs_preempt {
                // wait for the preempted resources instead of retrying
                ctx.placeholder_reservation(round.job);
            } else {
                error!(job = %name, %err, "cannot start job");
            }
            continue;
        }

        {
            let job = ctx.cluster.job_mut(round.job)?;
            job.flags.backfilled = true;
        }
        ctx.note_backfill_started(round.job);

        stats.started += 1;
        stats.procs_committed += round.procs;
        remaining -= round.procs;

        debug!(job = %name, procs = round.procs, remaining, "located best-fit job");
    }

    stats.remaining_procs = remaining;
    debug!(
        partition = %ctx.partition,
        started = stats.started,
        evals = stats.evaluated,
        remaining,
        "best-fit backfill pass complete"
    );
    Ok(stats)
}
