//! The cluster tables shared by every filling strategy.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::SchedConfig;
use crate::error::{CoreError, CoreResult};
use crate::job::{Job, JobId};
use crate::node::{Node, NodeIndex};
use crate::partition::{Partition, PartitionId, UtilityMetric};

/// Kind of a system-wide reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsvKind {
    /// Reservation backing a running or scheduled job.
    Job,
    /// Administrative standing reservation.
    Standing,
    /// User-created reservation.
    User,
}

impl RsvKind {
    /// Check whether the reservation backs a job.
    pub fn is_job(&self) -> bool {
        matches!(self, RsvKind::Job)
    }
}

/// A system-wide reservation. Standing reservations may carry a duration
/// limit that bounds every backfill window, independent of node occupancy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingReservation {
    /// Reservation name.
    pub name: String,
    /// Reservation kind.
    pub kind: RsvKind,
    /// Maximum duration admitted under the reservation, in seconds.
    pub duration_limit: Option<u64>,
}

/// The node, job, and partition tables plus the scheduler clock.
///
/// Owned by the surrounding scheduler and handed to the engine by mutable
/// reference for the duration of one pass; the engine assumes exclusive
/// access (enforced by the outer scheduling loop, not here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    nodes: Vec<Option<Node>>,
    jobs: Vec<Job>,
    partitions: Vec<Partition>,
    /// System-wide reservations.
    pub reservations: Vec<StandingReservation>,
    /// Current scheduler time (epoch seconds).
    pub now: u64,
    /// Cluster-wide configuration.
    pub config: SchedConfig,
}

impl Cluster {
    /// Create an empty cluster. Partition 0 (the global partition) is
    /// created implicitly.
    pub fn new(config: SchedConfig) -> Self {
        let mut global = Partition::new("ALL");
        global.id = PartitionId::GLOBAL;
        Self {
            nodes: Vec::new(),
            jobs: Vec::new(),
            partitions: vec![global],
            reservations: Vec::new(),
            now: 0,
            config,
        }
    }

    // ── Tables ──────────────────────────────────────────────────────

    /// Insert a node, assigning its stable index.
    pub fn add_node(&mut self, mut node: Node) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        node.index = index;
        self.nodes.push(Some(node));
        index
    }

    /// Insert a placeholder (deleted) node slot.
    pub fn add_placeholder_node(&mut self) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(None);
        index
    }

    /// Insert a job, assigning its id.
    pub fn add_job(&mut self, mut job: Job) -> JobId {
        let id = JobId(self.jobs.len() as u32);
        job.id = id;
        self.jobs.push(job);
        id
    }

    /// Insert a partition, assigning its id.
    pub fn add_partition(&mut self, mut partition: Partition) -> PartitionId {
        let id = PartitionId(self.partitions.len() as u32);
        partition.id = id;
        self.partitions.push(partition);
        id
    }

    /// The node at `index`, if the slot is live.
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.0 as usize).and_then(Option::as_ref)
    }

    /// Mutable access to the node at `index`.
    pub fn node_mut(&mut self, index: NodeIndex) -> Option<&mut Node> {
        self.nodes.get_mut(index.0 as usize).and_then(Option::as_mut)
    }

    /// All node slots in index order (placeholders included).
    pub fn node_slots(&self) -> &[Option<Node>] {
        &self.nodes
    }

    /// The job with the given id.
    pub fn job(&self, id: JobId) -> CoreResult<&Job> {
        self.jobs
            .get(id.0 as usize)
            .ok_or(CoreError::JobNotFound(id))
    }

    /// Mutable access to the job with the given id.
    pub fn job_mut(&mut self, id: JobId) -> CoreResult<&mut Job> {
        self.jobs
            .get_mut(id.0 as usize)
            .ok_or(CoreError::JobNotFound(id))
    }

    /// All jobs in table order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// The partition with the given id, falling back to the global one.
    pub fn partition(&self, id: PartitionId) -> &Partition {
        self.partitions
            .get(id.0 as usize)
            .unwrap_or(&self.partitions[0])
    }

    /// The global partition.
    pub fn global_partition(&self) -> &Partition {
        &self.partitions[0]
    }

    /// Mutable access to the global partition.
    pub fn global_partition_mut(&mut self) -> &mut Partition {
        &mut self.partitions[0]
    }

    // ── Derived scheduling inputs ───────────────────────────────────

    /// Utility metric for a partition, with the global metric as fallback.
    pub fn utility_metric(&self, id: PartitionId) -> UtilityMetric {
        self.partition(id)
            .bf_metric
            .or(self.global_partition().bf_metric)
            .unwrap_or_default()
    }

    /// Combine a job with its sync-dependency peers for scheduling.
    ///
    /// Returns the combined processor count. Fails when a peer is missing or
    /// is no longer idle, in which case the job must be skipped this pass.
    pub fn combine_sync(&self, id: JobId) -> CoreResult<u32> {
        let job = self.job(id)?;
        let mut procs = job.procs();
        for &peer in &job.sync_peers {
            let p = self
                .job(peer)
                .map_err(|_| CoreError::SyncCombine { job: id, peer })?;
            if !p.state.is_idle() || !p.expected_state.is_idle() {
                return Err(CoreError::SyncCombine { job: id, peer });
            }
            procs = procs.saturating_add(p.procs());
        }
        Ok(procs)
    }

    /// Record that `started` was backfilled: every other still-idle job in
    /// the table was bypassed once more (input to fairness metrics).
    pub fn note_backfill_started(&mut self, started: JobId) {
        for job in &mut self.jobs {
            if job.id != started && job.state.is_idle() && job.expected_state.is_idle() {
                job.bypass_count += 1;
            }
        }
        trace!(job = %started, "backfill bypass counters updated");
    }
}
