//! Cluster-wide scheduling configuration.

use serde::{Deserialize, Serialize};

use crate::partition::PartitionId;

/// Scheduling horizon in epoch seconds; times at or beyond it are treated as
/// unbounded.
pub const MAX_TIME: u64 = 2_140_000_000;

/// Direction of the backfill window search.
///
/// The window scan inverts every comparison depending on the direction, so
/// the policy is carried as a single comparator rather than branching logic:
/// shortest-first seeks the smallest window longer than the threshold,
/// longest-first the largest window shorter than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowSearch {
    /// Seek the shortest window that still exceeds the duration threshold.
    #[default]
    ShortestFirst,
    /// Seek the longest window below the duration threshold.
    LongestFirst,
}

impl WindowSearch {
    /// Check that a threshold is meaningful for this direction.
    pub fn threshold_valid(&self, threshold: u64, horizon: u64) -> bool {
        match self {
            WindowSearch::ShortestFirst => threshold < horizon,
            WindowSearch::LongestFirst => threshold > 0,
        }
    }

    /// Starting value for the running duration bound.
    pub fn initial_bound(&self, horizon: u64) -> u64 {
        match self {
            WindowSearch::ShortestFirst => horizon,
            WindowSearch::LongestFirst => 0,
        }
    }

    /// Whether an available duration satisfies the threshold.
    pub fn accepts(&self, available: u64, threshold: u64) -> bool {
        match self {
            WindowSearch::ShortestFirst => available > threshold,
            WindowSearch::LongestFirst => available < threshold,
        }
    }

    /// Whether an available duration tightens the running bound.
    pub fn improves(&self, available: u64, bound: u64) -> bool {
        match self {
            WindowSearch::ShortestFirst => available < bound,
            WindowSearch::LongestFirst => available > bound,
        }
    }
}

/// Node-set distribution policy applied by the resource manager's allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeSetPolicy {
    /// No distribution constraint.
    #[default]
    Unconstrained,
    /// Spread tasks evenly across node sets; allocation failures under this
    /// policy may be recovered with a fallback start list.
    SpanEvenly,
}

/// Cluster-wide scheduler configuration consumed by the backfill engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedConfig {
    /// Maximum reservations a node may carry and still enter a window.
    pub max_rsv_per_node: usize,

    /// Reservation cap for shared-partition nodes (usually higher).
    pub max_rsv_per_shared_node: usize,

    /// Partition whose nodes are visible to every partition's window.
    pub shared_partition: Option<PartitionId>,

    /// Reuse discovery-time node vetting when filtering feasible nodes.
    pub optimized_backfill: bool,

    /// Node-set distribution policy.
    pub node_set_policy: NodeSetPolicy,

    /// Lifetime of the placeholder reservation created when a
    /// preemption-dependent start fails, in seconds.
    pub placeholder_rsv_ttl: u64,

    /// Direction of the window search.
    pub window_search: WindowSearch,

    /// Cap on the node list recorded in a window (counts are not capped).
    pub max_window_nodes: usize,

    /// Scheduling horizon in epoch seconds.
    pub horizon: u64,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            max_rsv_per_node: 2,
            max_rsv_per_shared_node: 64,
            shared_partition: None,
            optimized_backfill: false,
            node_set_policy: NodeSetPolicy::default(),
            placeholder_rsv_ttl: 600,
            window_search: WindowSearch::default(),
            max_window_nodes: 4096,
            horizon: MAX_TIME,
        }
    }
}
