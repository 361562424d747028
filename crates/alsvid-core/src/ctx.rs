//! The shared scheduling context handed to every filling strategy.

use crate::cluster::Cluster;
use crate::job::{Job, JobId};
use crate::node::NodeIndex;
use crate::partition::PartitionId;
use crate::rm::{NodeList, PolicyLevel, ResourceManager, Selection};

/// Everything one backfill pass operates on: the cluster tables, the
/// resource manager, the target partition, and the policy level.
///
/// The context is borrowed for the duration of a single pass; exactly one
/// filling strategy runs per pass and at most one pass runs per process at a
/// time (serialization across partitions is the caller's job).
pub struct SchedCtx<'a> {
    /// The cluster tables.
    pub cluster: &'a mut Cluster,
    /// The resource-manager boundary.
    pub rm: &'a mut dyn ResourceManager,
    /// Partition this pass targets.
    pub partition: PartitionId,
    /// Enforcement level for limit checks.
    pub policy: PolicyLevel,
}

impl<'a> SchedCtx<'a> {
    /// Create a context for one pass.
    pub fn new(
        cluster: &'a mut Cluster,
        rm: &'a mut dyn ResourceManager,
        partition: PartitionId,
        policy: PolicyLevel,
    ) -> Self {
        Self {
            cluster,
            rm,
            partition,
            policy,
        }
    }

    /// Re-check active-policy limits for a job.
    pub fn check_limits(&self, job: &Job) -> bool {
        self.rm
            .check_limits(self.cluster, job, self.partition, self.policy)
    }

    /// Select a node subset for the job.
    pub fn select_nodes(&self, job: &Job, candidates: &[(NodeIndex, u32)]) -> Option<Selection> {
        self.rm.select_nodes(self.cluster, job, candidates)
    }

    /// Bind an allocation plan to the job.
    pub fn allocate(&mut self, job: JobId, nodes: &NodeList) -> crate::CoreResult<()> {
        self.rm.allocate(self.cluster, job, nodes)
    }

    /// Derive a fallback immediate-start node list.
    pub fn fallback_start(&mut self, job: JobId) -> Option<NodeList> {
        self.rm.fallback_start(self.cluster, job)
    }

    /// Start the job.
    pub fn start(&mut self, job: JobId, reason: &str) -> crate::CoreResult<()> {
        self.rm.start(self.cluster, job, reason)
    }

    /// Create the placeholder reservation for a failed preemption start.
    pub fn placeholder_reservation(&mut self, job: JobId) {
        let ttl = self.cluster.config.placeholder_rsv_ttl;
        self.rm.create_placeholder_reservation(self.cluster, job, ttl);
    }

    /// Record a successful backfill start: bump bypass counters and notify
    /// the resource manager.
    pub fn note_backfill_started(&mut self, job: JobId) {
        self.cluster.note_backfill_started(job);
        self.rm.record_backfill_start(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedConfig;
    use crate::job::Job;
    use crate::node::Node;
    use crate::rm::MockResourceManager;

    #[test]
    fn test_ctx_routes_calls_to_rm() {
        let mut cluster = Cluster::new(SchedConfig::default());
        cluster.add_node(Node::new("n0", 8));
        let id = cluster.add_job(Job::new("j", 4, 600));
        let other = cluster.add_job(Job::new("bystander", 2, 600));

        let mut rm = MockResourceManager::new();
        let mut ctx = SchedCtx::new(&mut cluster, &mut rm, PartitionId::GLOBAL, PolicyLevel::Hard);

        let job = ctx.cluster.job(id).unwrap();
        assert!(ctx.check_limits(job));
        let sel = ctx.select_nodes(job, &[(NodeIndex(0), 8)]).unwrap();

        ctx.allocate(id, &sel.nodes).unwrap();
        ctx.start(id, "job backfilled").unwrap();
        ctx.note_backfill_started(id);

        assert_eq!(rm.started, vec![id]);
        assert_eq!(rm.backfill_records, vec![id]);
        assert_eq!(cluster.job(other).unwrap().bypass_count, 1);
    }
}
