//! Partitions and the backfill utility metric.

use serde::{Deserialize, Serialize};

/// Identifier of a partition.
///
/// Partition 0 is the global partition; it carries cluster-wide defaults and
/// admits nodes from every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// The global partition.
    pub const GLOBAL: PartitionId = PartitionId(0);
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar used to rank and sum competing backfill candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UtilityMetric {
    /// Processor count.
    #[default]
    Procs,
    /// Requested walltime.
    Walltime,
    /// Processor-seconds (procs x walltime).
    ProcSeconds,
}

impl UtilityMetric {
    /// Utility value of a job under this metric.
    pub fn value(&self, procs: u32, walltime: u64) -> u64 {
        match self {
            UtilityMetric::Procs => u64::from(procs),
            UtilityMetric::Walltime => walltime,
            UtilityMetric::ProcSeconds => u64::from(procs).saturating_mul(walltime),
        }
    }
}

/// Default ceiling on schedules explored by the greedy search.
pub const DEFAULT_MAX_SCHEDULES: u32 = 10_000;

/// An accounting/scheduling domain within the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partition {
    /// Partition index, assigned on insert.
    pub id: PartitionId,

    /// Partition name.
    pub name: String,

    /// Utility metric override; the global partition's metric applies when
    /// unset.
    pub bf_metric: Option<UtilityMetric>,

    /// Chunking threshold in processors (0 = chunking disabled).
    pub chunk_size: u32,

    /// How long capacity is withheld once chunking activates, in seconds.
    pub chunk_duration: u64,

    /// Absolute time until which sub-chunk jobs are withheld. Set once when
    /// chunking activates; read on the global partition.
    pub chunk_block_until: Option<u64>,

    /// Ceiling on schedules explored by the greedy search (read on the
    /// global partition).
    pub max_schedules: u32,
}

impl Partition {
    /// Create a new partition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PartitionId::GLOBAL,
            name: name.into(),
            bf_metric: None,
            chunk_size: 0,
            chunk_duration: 0,
            chunk_block_until: None,
            max_schedules: DEFAULT_MAX_SCHEDULES,
        }
    }

    /// Set the utility metric override.
    pub fn with_metric(mut self, metric: UtilityMetric) -> Self {
        self.bf_metric = Some(metric);
        self
    }

    /// Enable chunking.
    pub fn with_chunking(mut self, size: u32, duration: u64) -> Self {
        self.chunk_size = size;
        self.chunk_duration = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_values() {
        assert_eq!(UtilityMetric::Procs.value(4, 3600), 4);
        assert_eq!(UtilityMetric::Walltime.value(4, 3600), 3600);
        assert_eq!(UtilityMetric::ProcSeconds.value(4, 3600), 14_400);
    }

    #[test]
    fn test_partition_builder() {
        let p = Partition::new("batch")
            .with_metric(UtilityMetric::Walltime)
            .with_chunking(8, 600);

        assert_eq!(p.name, "batch");
        assert_eq!(p.bf_metric, Some(UtilityMetric::Walltime));
        assert_eq!(p.chunk_size, 8);
        assert_eq!(p.chunk_duration, 600);
        assert!(p.chunk_block_until.is_none());
    }
}
