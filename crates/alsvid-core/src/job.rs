//! Job types for the backfill engine.

use serde::{Deserialize, Serialize};

use crate::partition::PartitionId;

/// Identifier of a job in the cluster job table.
///
/// Assigned by [`Cluster::add_job`](crate::cluster::Cluster::add_job); the
/// value is the job's stable index in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Queued and eligible for scheduling.
    Idle,
    /// Handed to the resource manager, not yet running.
    Starting,
    /// Running on allocated nodes.
    Running,
    /// Suspended by the scheduler or an operator.
    Suspended,
    /// Finished.
    Completed,
    /// Removed from the system.
    Removed,
}

impl JobState {
    /// Check whether the state permits backfill consideration.
    pub fn is_idle(&self) -> bool {
        matches!(self, JobState::Idle)
    }
}

/// One alternative (task-count, walltime) pairing a malleable job may run
/// under. A walltime of zero means "inherit the primary shape's walltime".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Number of tasks requested.
    pub tasks: u32,
    /// Requested walltime in seconds.
    pub walltime: u64,
}

/// System flags stamped onto a job by the engine when it starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    /// Job was started by a backfill strategy.
    pub backfilled: bool,
    /// Job may be preempted to reclaim its resources.
    pub preemptee: bool,
}

/// Saved copy of a job's live request, restored after trial shape searches.
#[derive(Debug, Clone, Copy)]
pub struct SavedRequest {
    /// Task count of the live request.
    pub tasks: u32,
    /// Walltime of the live request.
    pub walltime: u64,
}

impl SavedRequest {
    /// Write the saved fields back onto the job.
    pub fn restore(&self, job: &mut Job) {
        job.tasks = self.tasks;
        job.walltime = self.walltime;
    }
}

/// A job as seen by the backfill engine.
///
/// The `tasks`/`walltime` pair is the live request; `shapes` holds the
/// alternatives a malleable job may run under (`shapes[0]` is the primary).
/// The backfill-priority score and the eligibility flags are computed by the
/// surrounding scheduler each iteration and consumed here as opaque inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Table index, assigned on insert.
    pub id: JobId,

    /// Human-readable job name.
    pub name: String,

    /// Current state.
    pub state: JobState,

    /// Expected state as reported by the resource manager.
    pub expected_state: JobState,

    /// Partition the job is bound to.
    pub partition: PartitionId,

    /// Alternative shapes; `shapes[0]` is the primary request.
    pub shapes: Vec<Shape>,

    /// Live request task count.
    pub tasks: u32,

    /// Live request walltime in seconds.
    pub walltime: u64,

    /// Processors consumed per task.
    pub procs_per_task: u32,

    /// Minimum node count required (0 = no constraint).
    pub min_nodes: u32,

    /// Virtual walltime a scaled job launches under, when set.
    pub virtual_walltime: Option<u64>,

    /// Externally computed backfill-priority score (preemptive backfill).
    pub backfill_priority: f64,

    /// Job may not be scheduled before an externally managed release time.
    pub time_locked: bool,

    /// Billing reservation failed this iteration; retry next iteration.
    pub billing_failed: bool,

    /// Sync-dependency peers that must be combined with this job.
    pub sync_peers: Vec<JobId>,

    /// Submitting user, consumed by external policy checks.
    pub user: Option<String>,

    /// Charge account, consumed by external policy checks.
    pub account: Option<String>,

    /// Required operating system, if any.
    pub opsys: Option<String>,

    /// Required architecture, if any.
    pub arch: Option<String>,

    /// Times this job stayed idle while another job was backfilled past it.
    pub bypass_count: u32,

    /// System flags stamped by the engine.
    pub flags: JobFlags,
}

impl Job {
    /// Create a new idle job with a single shape.
    pub fn new(name: impl Into<String>, tasks: u32, walltime: u64) -> Self {
        Self {
            id: JobId(0),
            name: name.into(),
            state: JobState::Idle,
            expected_state: JobState::Idle,
            partition: PartitionId::GLOBAL,
            shapes: vec![Shape { tasks, walltime }],
            tasks,
            walltime,
            procs_per_task: 1,
            min_nodes: 0,
            virtual_walltime: None,
            backfill_priority: 0.0,
            time_locked: false,
            billing_failed: false,
            sync_peers: Vec::new(),
            user: None,
            account: None,
            opsys: None,
            arch: None,
            bypass_count: 0,
            flags: JobFlags::default(),
        }
    }

    /// Bind the job to a partition.
    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = partition;
        self
    }

    /// Add an alternative shape.
    pub fn with_shape(mut self, tasks: u32, walltime: u64) -> Self {
        self.shapes.push(Shape { tasks, walltime });
        self
    }

    /// Set the backfill-priority score.
    pub fn with_priority(mut self, score: f64) -> Self {
        self.backfill_priority = score;
        self
    }

    /// Set the virtual walltime.
    pub fn with_virtual_walltime(mut self, walltime: u64) -> Self {
        self.virtual_walltime = Some(walltime);
        self
    }

    /// Add a sync-dependency peer.
    pub fn with_sync_peer(mut self, peer: JobId) -> Self {
        self.sync_peers.push(peer);
        self
    }

    /// Set the submitting user and charge account.
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        self.user = Some(user.into());
        self.account = Some(account.into());
        self
    }

    /// Set the job state (and expected state).
    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self.expected_state = state;
        self
    }

    /// Processor count of the live request.
    pub fn procs(&self) -> u32 {
        self.tasks.saturating_mul(self.procs_per_task.max(1))
    }

    /// Snapshot the live request for later restoration.
    pub fn saved_request(&self) -> SavedRequest {
        SavedRequest {
            tasks: self.tasks,
            walltime: self.walltime,
        }
    }

    /// Apply a trial shape to the live request.
    pub fn apply_shape(&mut self, shape: Shape, fallback_walltime: u64) {
        self.tasks = shape.tasks;
        self.walltime = if shape.walltime > 0 {
            shape.walltime
        } else {
            fallback_walltime
        };
    }
}
