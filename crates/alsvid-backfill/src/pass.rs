//! One backfill pass: window discovery plus a single filling strategy.

use tracing::debug;

use alsvid_core::ctx::SchedCtx;
use alsvid_core::job::Job;
use alsvid_core::queue::BackfillQueue;

use crate::bestfit::best_fit_fill;
use crate::error::{BackfillError, BackfillResult};
use crate::firstfit::{first_fit_fill, FirstFitScratch};
use crate::greedy::greedy_fill;
use crate::preempt::preemptive_fill;
use crate::window::locate_window;

/// The filling strategy run by a pass. Exactly one strategy runs per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackfillStrategy {
    /// Single forward pass, first fitting shape wins.
    #[default]
    FirstFit,
    /// Repeated full-queue scans, best utility wins each round.
    BestFit,
    /// Bounded depth-first search over ordered queue subsets.
    Greedy,
    /// Highest backfill-priority preemptor wins each round.
    Preempt,
}

/// What one invocation of a filling strategy did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Jobs evaluated against the window.
    pub evaluated: u32,
    /// Jobs started.
    pub started: u32,
    /// Processors committed to started jobs.
    pub procs_committed: u32,
    /// Processors left in the window after the pass.
    pub remaining_procs: u32,
}

impl PassStats {
    /// Fold a follow-up invocation (e.g. a fallback pass) into this one.
    pub fn absorb(&mut self, other: PassStats) {
        self.evaluated += other.evaluated;
        self.started += other.started;
        self.procs_committed += other.procs_committed;
        self.remaining_procs = other.remaining_procs;
    }
}

/// Run one backfill pass for the context's partition.
///
/// Locates the window for `template`/`threshold` and dispatches to
/// `strategy`. A missing window is not an error — nothing can start, and the
/// pass reports empty statistics. Errors are reserved for structural setup
/// problems.
pub fn run_pass(
    ctx: &mut SchedCtx<'_>,
    queue: &mut BackfillQueue,
    scratch: &mut FirstFitScratch,
    strategy: BackfillStrategy,
    template: &Job,
    threshold: u64,
) -> BackfillResult<PassStats> {
    let window = match locate_window(ctx.cluster, ctx.partition, template, threshold, None) {
        Ok(window) => window,
        Err(BackfillError::NoWindow { nodes, duration }) => {
            debug!(partition = %ctx.partition, nodes, duration, "no backfill window, nothing to do");
            return Ok(PassStats::default());
        }
        Err(err) => return Err(err),
    };

    match strategy {
        BackfillStrategy::FirstFit => first_fit_fill(ctx, queue, &window, scratch),
        BackfillStrategy::BestFit => best_fit_fill(ctx, queue, &window),
        BackfillStrategy::Greedy => greedy_fill(ctx, queue, &window),
        BackfillStrategy::Preempt => preemptive_fill(ctx, queue, &window),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsvid_core::cluster::Cluster;
    use alsvid_core::config::SchedConfig;
    use alsvid_core::job::Job;
    use alsvid_core::node::Node;
    use alsvid_core::partition::PartitionId;
    use alsvid_core::rm::{MockResourceManager, PolicyLevel};

    #[test]
    fn test_missing_window_is_success() {
        // no nodes at all: nothing can start, but the pass itself succeeds
        let mut cluster = Cluster::new(SchedConfig::default());
        let id = cluster.add_job(Job::new("j", 2, 600));

        let mut rm = MockResourceManager::new();
        let mut queue = BackfillQueue::from_ids([id]);
        let mut scratch = FirstFitScratch::default();
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let stats = run_pass(
            &mut ctx,
            &mut queue,
            &mut scratch,
            BackfillStrategy::FirstFit,
            &Job::new("t", 1, 600),
            0,
        )
        .unwrap();

        assert_eq!(stats, PassStats::default());
        assert!(rm.started.is_empty());
    }

    #[test]
    fn test_dispatches_to_strategy() {
        let mut cluster = Cluster::new(SchedConfig::default());
        cluster.add_node(Node::new("n0", 8));
        let id = cluster.add_job(Job::new("j", 2, 600).with_priority(1.0));

        for strategy in [
            BackfillStrategy::FirstFit,
            BackfillStrategy::BestFit,
            BackfillStrategy::Greedy,
            BackfillStrategy::Preempt,
        ] {
            let mut cluster = cluster.clone();
            let mut rm = MockResourceManager::new();
            let mut queue = BackfillQueue::from_ids([id]);
            let mut scratch = FirstFitScratch::default();
            let mut ctx =
                SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

            let stats = run_pass(
                &mut ctx,
                &mut queue,
                &mut scratch,
                strategy,
                &Job::new("t", 1, 600),
                0,
            )
            .unwrap();

            assert_eq!(stats.started, 1, "strategy {strategy:?} should start the job");
            assert_eq!(rm.started, vec![id]);
        }
    }
}
