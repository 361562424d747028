//! Node types for the backfill engine.

use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::partition::PartitionId;

/// Stable index of a node in the cluster node table.
///
/// Node slots are never reused within a scheduling iteration, so state
/// saved against a `NodeIndex` remains valid even if the table grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

impl std::fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// State unknown or not yet reported.
    Unknown,
    /// Node is down.
    Down,
    /// Node is administratively drained.
    Drained,
    /// Node is idle.
    Idle,
    /// Node is running work but has free resources.
    Active,
    /// Node is fully occupied.
    Busy,
    /// Node is held by a reservation (including trial reservations).
    Reserved,
}

impl NodeState {
    /// Check whether the state admits backfill placement.
    pub fn is_available(&self) -> bool {
        matches!(self, NodeState::Idle | NodeState::Active)
    }
}

/// Reason a node was rejected for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRejection {
    /// Operating system mismatch.
    Opsys,
    /// Architecture mismatch.
    Arch,
    /// Insufficient processors.
    Procs,
}

impl NodeRejection {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeRejection::Opsys => "opsys",
            NodeRejection::Arch => "arch",
            NodeRejection::Procs => "procs",
        }
    }
}

impl std::fmt::Display for NodeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A reservation holding resources on a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReservation {
    /// Absolute start time (epoch seconds).
    pub start: u64,
    /// Absolute end time (epoch seconds).
    pub end: u64,
}

/// A cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable table index, assigned on insert.
    pub index: NodeIndex,

    /// Node name.
    pub name: String,

    /// Current state.
    pub state: NodeState,

    /// Expected state as reported by the resource manager.
    pub expected_state: NodeState,

    /// Partition the node belongs to.
    pub partition: PartitionId,

    /// Configured processors. Zero marks a non-compute (license/storage) node.
    pub cfg_procs: u32,

    /// Processors currently available.
    pub avail_procs: u32,

    /// Available generic-resource count (licenses, shared storage units).
    pub avail_gres: u32,

    /// Operating system, if reported.
    pub opsys: Option<String>,

    /// Architecture, if reported.
    pub arch: Option<String>,

    /// Reservations currently placed on the node.
    pub reservations: Vec<NodeReservation>,
}

impl Node {
    /// Create a new idle compute node.
    pub fn new(name: impl Into<String>, procs: u32) -> Self {
        Self {
            index: NodeIndex(0),
            name: name.into(),
            state: NodeState::Idle,
            expected_state: NodeState::Idle,
            partition: PartitionId::GLOBAL,
            cfg_procs: procs,
            avail_procs: procs,
            avail_gres: 0,
            opsys: None,
            arch: None,
            reservations: Vec::new(),
        }
    }

    /// Place the node in a partition.
    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = partition;
        self
    }

    /// Set the available generic-resource count.
    pub fn with_gres(mut self, count: u32) -> Self {
        self.avail_gres = count;
        self
    }

    /// Add a reservation.
    pub fn with_reservation(mut self, start: u64, end: u64) -> Self {
        self.reservations.push(NodeReservation { start, end });
        self
    }

    /// Number of reservations currently on the node.
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Check resource compatibility with a job; returns the task count the
    /// node can host right now.
    pub fn match_job(&self, job: &Job) -> Result<u32, NodeRejection> {
        if let Some(os) = &job.opsys {
            if self.opsys.as_deref() != Some(os.as_str()) {
                return Err(NodeRejection::Opsys);
            }
        }
        if let Some(arch) = &job.arch {
            if self.arch.as_deref() != Some(arch.as_str()) {
                return Err(NodeRejection::Arch);
            }
        }

        let per_task = job.procs_per_task.max(1);
        let tasks = self.avail_procs / per_task;
        if tasks == 0 {
            return Err(NodeRejection::Procs);
        }
        Ok(tasks)
    }

    /// How long the node stays free, as a duration from `now`.
    ///
    /// Returns `None` when a reservation covers `now` (blocked immediately);
    /// otherwise the duration until the earliest future reservation start, or
    /// until `horizon` when nothing is booked.
    pub fn available_window(&self, now: u64, horizon: u64) -> Option<u64> {
        let mut until = horizon;
        for rsv in &self.reservations {
            if rsv.start <= now && now < rsv.end {
                return None;
            }
            if rsv.start > now {
                until = until.min(rsv.start);
            }
        }
        Some(until.saturating_sub(now))
    }
}
