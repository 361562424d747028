//! First-fit backfill.
//!
//! One forward pass over the priority queue. For each job every alternative
//! shape is tried against the window and the largest feasible shape is
//! started. Chunking optionally withholds small jobs so idle capacity can
//! accumulate into a block sized for a larger one.

use tracing::{debug, error, trace};

use alsvid_core::config::NodeSetPolicy;
use alsvid_core::ctx::SchedCtx;
use alsvid_core::node::NodeIndex;
use alsvid_core::queue::BackfillQueue;
use alsvid_core::rm::{NodeList, Selection};

use crate::error::BackfillResult;
use crate::pass::PassStats;
use crate::window::Window;

/// Reusable buffers for the first-fit shape search.
///
/// Owned by the caller and handed to every invocation, so one pass at a time
/// may run per scratch; size is retained across passes.
#[derive(Debug, Default)]
pub struct FirstFitScratch {
    feasible: Vec<(NodeIndex, u32)>,
    best_nodes: NodeList,
}

impl FirstFitScratch {
    /// Create an empty scratch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scratch pre-sized for a node table of the given size.
    pub fn with_node_capacity(nodes: usize) -> Self {
        Self {
            feasible: Vec::with_capacity(nodes),
            best_nodes: NodeList::with_capacity(nodes),
        }
    }
}

pub fn first_fit_fill(
    ctx: &mut SchedCtx<'_>,
    queue: &BackfillQueue,
    window: &Window,
    scratch: &mut FirstFitScratch,
) -> BackfillResult<PassStats> {
    let mut stats = PassStats::default();
    let mut remaining = window.tasks;

    let now = ctx.cluster.now;
    let optimized = ctx.cluster.config.optimized_backfill;
    let spanning = ctx.cluster.config.node_set_policy == NodeSetPolicy::SpanEvenly;

    let (chunk_size, chunk_duration, block_until) = {
        let gp = ctx.cluster.global_partition();
        (gp.chunk_size, gp.chunk_duration, gp.chunk_block_until)
    };
    let mut chunking_enabled = chunk_size > 0 && chunk_duration > 0;
    if let Some(until) = block_until {
        if until < now {
            // the accumulation window has already run its course
            chunking_enabled = false;
        }
    }
    let mut chunking_active = false;

    debug!(
        partition = %ctx.partition,
        procs = remaining,
        duration = %window.duration,
        chunking_enabled,
        "first-fit backfill pass"
    );

    for (_slot, jid) in queue.eligible() {
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
        if !job.state.is_idle() || !job.expected_state.is_idle() {
            continue;
        }

        let name = job.name.clone();
        let shapes = job.shapes.clone();
        let saved = job.saved_request();
        let per_task = job.procs_per_task.max(1);
        let virtual_walltime = job.virtual_walltime;
        let base_procs = job.procs();

        let combined = match ctx.cluster.combine_sync(jid) {
            Ok(procs) => procs,
            Err(err) => {
                debug!(job = %name, %err, "job rejected (dependency)");
                continue;
            }
        };
        let peer_extra = combined.saturating_sub(base_procs);

        if chunking_enabled && !chunking_active && base_procs < chunk_size {
            // a small idle job arrived: start withholding sub-chunk jobs so
            // capacity can accumulate for a chunk-sized one
            chunking_active = true;
            let gp = ctx.cluster.global_partition_mut();
            if gp.chunk_block_until.is_none() {
                gp.chunk_block_until = Some(now + chunk_duration);
            }
            let block_until = gp.chunk_block_until;
            debug!(?block_until, "chunking activated");
        }

        stats.evaluated += 1;

        // try every alternative shape, keep the largest feasible one
        let mut best: Option<(usize, u32, bool)> = None;
        scratch.best_nodes.clear();

        for (sindex, shape) in shapes.iter().enumerate() {
            if sindex > 0 && shape.tasks == shapes[0].tasks {
                // ignore duplicate shapes
                continue;
            }

            let procs = shape.tasks.saturating_mul(per_task) + peer_extra;
            if chunking_active && procs < chunk_size {
                debug!(job = %name, shape = sindex, procs, "shape blocked by chunking");
                continue;
            }
            if procs > remaining {
                continue;
            }

            trace!(job = %name, shape = sindex, procs, "evaluating shape");
            {
                let job = ctx.cluster.job_mut(jid)?;
                let trial = job.shapes[sindex];
                job.apply_shape(trial, saved.walltime);
            }

            let feasible_ok = {
                let job = ctx.cluster.job(jid)?;
                if !ctx.check_limits(job) {
                    trace!(job = %name, shape = sindex, "shape fails active policy");
                    false
                } else if !window.feasible_into(ctx.cluster, job, optimized, &mut scratch.feasible) {
                    debug!(job = %name, shape = sindex, "insufficient feasible nodes");
                    false
                } else {
                    true
                }
            };
            if !feasible_ok {
                continue;
            }

            let selection = {
                let job = ctx.cluster.job(jid)?;
                ctx.select_nodes(job, &scratch.feasible)
            };
            let Some(Selection {
                nodes: sel_nodes,
                needs_preempt,
            }) = selection
            else {
                trace!(job = %name, shape = sindex, "no selectable node subset");
                continue;
            };

            let nodes = match ctx.allocate(jid, &sel_nodes) {
                Ok(()) => sel_nodes,
                Err(err) => {
                    if spanning {
                        // distribution policy blocked the allocation; an
                        // immediate-start list may still exist
                        match ctx.fallback_start(jid) {
                            Some(list) => list,
                            None => {
                                debug!(job = %name, shape = sindex, %err, "no fallback start");
                                continue;
                            }
                        }
                    } else {
                        debug!(job = %name, shape = sindex, %err, "trial allocation failed");
                        continue;
                    }
                }
            };

            if best.is_none_or(|(_, best_procs, _)| procs > best_procs) {
                best = Some((sindex, procs, needs_preempt));
                scratch.best_nodes.clear();
                scratch.best_nodes.extend_from_slice(&nodes);
            }
        }

        // restore the live request unconditionally before any commit
        {
            let job = ctx.cluster.job_mut(jid)?;
            saved.restore(job);
        }

        let Some((best_index, procs, needs_preempt)) = best else {
            continue;
        };

        {
            let job = ctx.cluster.job_mut(jid)?;
            let shape = job.shapes[best_index];
            job.apply_shape(shape, saved.walltime);
            if let Some(virtual_wall) = virtual_walltime {
                // launch scaled jobs at their virtual walltime
                job.walltime = virtual_wall;
            }
        }

        if let Err(err) = ctx.allocate(jid, &scratch.best_nodes) {
            error!(job = %name, shape = best_index, %err, "cannot allocate nodes for job");
            let job = ctx.cluster.job_mut(jid)?;
            saved.restore(job);
            continue;
        }

        if let Err(err) = ctx.start(jid, "job backfilled") {
            if needs_preempt {
                // wait for the preempted resources instead of retrying
                ctx.placeholder_reservation(jid);
            } else {
                error!(job = %name, shape = best_index, %err, "cannot start job");
            }
            let job = ctx.cluster.job_mut(jid)?;
            saved.restore(job);
            continue;
        }

        debug!(job = %name, shape = best_index, procs, "job backfilled");
        {
            let job = ctx.cluster.job_mut(jid)?;
            job.flags.backfilled = true;
        }
        ctx.note_backfill_started(jid);

        stats.started += 1;
        stats.procs_committed += procs;
        remaining -= procs;
    }

    stats.remaining_procs = remaining;
    debug!(
        partition = %ctx.partition,
        started = stats.started,
        examined = stats.evaluated,
        remaining,
        "first-fit backfill pass complete"
    );
    Ok(stats)
}
