//! The resource-manager boundary.
//!
//! Everything the backfill engine asks of the outside world goes through
//! [`ResourceManager`]: active-policy checks, node-subset selection,
//! allocation, job start, placeholder reservations, and backfill
//! bookkeeping. The engine itself never talks to a resource manager wire
//! protocol.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cluster::Cluster;
use crate::error::{CoreError, CoreResult};
use crate::job::{Job, JobId, JobState};
use crate::node::{NodeIndex, NodeState};
use crate::partition::PartitionId;

/// Enforcement level of active-policy limit checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyLevel {
    /// Limits are not enforced.
    Off,
    /// Soft limits apply.
    Soft,
    /// Hard limits apply.
    #[default]
    Hard,
}

/// An ordered node allocation: (node, task count) pairs.
pub type NodeList = Vec<(NodeIndex, u32)>;

/// Result of node-subset selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// The chosen nodes with per-node task counts.
    pub nodes: NodeList,
    /// Selection is only satisfiable by preempting running work.
    pub needs_preempt: bool,
}

/// Narrow interface to the surrounding scheduler and its resource manager.
///
/// Every method is invoked mid-pass; implementations must not assume a job
/// is only checked once — limits in particular are re-checked at the moment
/// of each start.
pub trait ResourceManager {
    /// Re-check active-policy limits for a job about to be scheduled.
    fn check_limits(
        &self,
        cluster: &Cluster,
        job: &Job,
        partition: PartitionId,
        level: PolicyLevel,
    ) -> bool;

    /// Select a node subset for the job from the candidate list.
    fn select_nodes(
        &self,
        cluster: &Cluster,
        job: &Job,
        candidates: &[(NodeIndex, u32)],
    ) -> Option<Selection>;

    /// Bind an allocation plan to the job. May fail on resource-affinity
    /// policy grounds without the selection itself being wrong.
    fn allocate(&mut self, cluster: &mut Cluster, job: JobId, nodes: &NodeList) -> CoreResult<()>;

    /// Derive an immediate-start node list after an allocation failure under
    /// an evenly-spanning node-set policy. `None` means the job cannot start
    /// now.
    fn fallback_start(&mut self, cluster: &Cluster, job: JobId) -> Option<NodeList>;

    /// Start the job on its allocated nodes, recording a human-readable
    /// reason.
    fn start(&mut self, cluster: &mut Cluster, job: JobId, reason: &str) -> CoreResult<()>;

    /// Create a bounded-lifetime placeholder reservation for a job whose
    /// preemption-dependent start failed.
    fn create_placeholder_reservation(&mut self, cluster: &mut Cluster, job: JobId, ttl: u64);

    /// Bookkeeping hook invoked once per successful backfill start.
    fn record_backfill_start(&mut self, job: JobId);
}

/// In-process resource manager (for testing).
///
/// Selects nodes first-fit from the candidate list, consumes processors on
/// start, and records every outward call so tests can assert on them.
/// Failures are injected per job id.
#[derive(Debug, Default)]
pub struct MockResourceManager {
    /// Jobs rejected by the active-policy check.
    pub deny_limits: FxHashSet<JobId>,
    /// Jobs whose allocation fails.
    pub fail_alloc: FxHashSet<JobId>,
    /// Jobs whose start fails.
    pub fail_start: FxHashSet<JobId>,
    /// Jobs whose selection requires preemption.
    pub preempt_required: FxHashSet<JobId>,
    /// Fallback start lists handed out under the spanning policy.
    pub fallback: FxHashMap<JobId, NodeList>,
    /// Jobs started, in order.
    pub started: Vec<JobId>,
    /// Placeholder reservations created, with their TTLs.
    pub placeholders: Vec<(JobId, u64)>,
    /// Jobs reported through the backfill bookkeeping hook.
    pub backfill_records: Vec<JobId>,
    allocations: FxHashMap<JobId, NodeList>,
}

impl MockResourceManager {
    /// Create a permissive mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// The allocation last bound to a job, if any.
    pub fn allocation(&self, job: JobId) -> Option<&NodeList> {
        self.allocations.get(&job)
    }
}

impl ResourceManager for MockResourceManager {
    fn check_limits(
        &self,
        _cluster: &Cluster,
        job: &Job,
        _partition: PartitionId,
        _level: PolicyLevel,
    ) -> bool {
        !self.deny_limits.contains(&job.id)
    }

    fn select_nodes(
        &self,
        _cluster: &Cluster,
        job: &Job,
        candidates: &[(NodeIndex, u32)],
    ) -> Option<Selection> {
        let needed = job.tasks;
        let mut nodes = NodeList::new();
        let mut got = 0u32;
        for &(index, tasks) in candidates {
            if got >= needed {
                break;
            }
            let take = tasks.min(needed - got);
            if take == 0 {
                continue;
            }
            nodes.push((index, take));
            got += take;
        }
        if got < needed {
            return None;
        }
        Some(Selection {
            nodes,
            needs_preempt: self.preempt_required.contains(&job.id),
        })
    }

    fn allocate(&mut self, _cluster: &mut Cluster, job: JobId, nodes: &NodeList) -> CoreResult<()> {
        if self.fail_alloc.contains(&job) {
            return Err(CoreError::AllocationFailed {
                job,
                reason: "affinity policy".to_string(),
            });
        }
        self.allocations.insert(job, nodes.clone());
        Ok(())
    }

    fn fallback_start(&mut self, _cluster: &Cluster, job: JobId) -> Option<NodeList> {
        self.fallback.get(&job).cloned()
    }

    fn start(&mut self, cluster: &mut Cluster, job: JobId, _reason: &str) -> CoreResult<()> {
        if self.fail_start.contains(&job) {
            return Err(CoreError::StartFailed {
                job,
                reason: "resource manager rejected".to_string(),
            });
        }

        let nodes = self.allocations.get(&job).cloned().unwrap_or_default();
        let per_task = cluster.job(job)?.procs_per_task.max(1);
        for &(index, tasks) in &nodes {
            if let Some(node) = cluster.node_mut(index) {
                node.avail_procs = node.avail_procs.saturating_sub(tasks * per_task);
                node.state = if node.avail_procs == 0 {
                    NodeState::Busy
                } else {
                    NodeState::Active
                };
                node.expected_state = node.state;
            }
        }

        let j = cluster.job_mut(job)?;
        j.state = JobState::Running;
        j.expected_state = JobState::Running;
        self.started.push(job);
        Ok(())
    }

    fn create_placeholder_reservation(&mut self, _cluster: &mut Cluster, job: JobId, ttl: u64) {
        self.placeholders.push((job, ttl));
    }

    fn record_backfill_start(&mut self, job: JobId) {
        self.backfill_records.push(job);
    }
}
