//! Backfill window discovery.
//!
//! A window is the node/task/duration envelope currently available for
//! backfill in a partition: which idle nodes can host work right now, and
//! for how long before the next reservation constraint lands.

use std::fmt::Write as _;

use tracing::{debug, trace};

use alsvid_core::cluster::Cluster;
use alsvid_core::config::WindowSearch;
use alsvid_core::job::Job;
use alsvid_core::node::NodeIndex;
use alsvid_core::partition::PartitionId;

use crate::error::{BackfillError, BackfillResult};

/// Name given to the synthesized probe job in logs.
pub const PROBE_JOB_NAME: &str = "backfill-probe";

/// Bounding duration of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDuration {
    /// The window closes after this many seconds.
    Bounded(u64),
    /// No reservation constrains the window.
    Unbounded,
}

impl WindowDuration {
    /// Whether a job of the given walltime fits in the window.
    pub fn fits(&self, walltime: u64) -> bool {
        match self {
            WindowDuration::Bounded(limit) => walltime <= *limit,
            WindowDuration::Unbounded => true,
        }
    }

    /// The bound in seconds, if one exists.
    pub fn secs(&self) -> Option<u64> {
        match self {
            WindowDuration::Bounded(limit) => Some(*limit),
            WindowDuration::Unbounded => None,
        }
    }
}

impl std::fmt::Display for WindowDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowDuration::Bounded(limit) => write!(f, "{limit}s"),
            WindowDuration::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// The node/task/duration envelope available for backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Discovered nodes with their hostable task counts, in table order.
    /// The list is capped by `SchedConfig::max_window_nodes`; the counts
    /// below are not.
    pub entries: Vec<(NodeIndex, u32)>,
    /// Total tasks available across all discovered nodes.
    pub tasks: u32,
    /// Total nodes discovered.
    pub nodes: u32,
    /// Duration until the next constraint expires.
    pub duration: WindowDuration,
}

impl Window {
    /// Filter the window down to nodes feasible for a specific job.
    ///
    /// Returns `None` when the feasible nodes cannot host the job's task
    /// count. With `optimized` set, discovery-time state vetting is trusted
    /// and only the resource match is re-run.
    pub fn feasible_for(
        &self,
        cluster: &Cluster,
        job: &Job,
        optimized: bool,
    ) -> Option<Vec<(NodeIndex, u32)>> {
        let mut out = Vec::with_capacity(self.entries.len());
        if self.feasible_into(cluster, job, optimized, &mut out) {
            Some(out)
        } else {
            None
        }
    }

    /// As [`feasible_for`](Self::feasible_for), writing into a reusable
    /// buffer. Returns whether the job's task count is covered.
    pub fn feasible_into(
        &self,
        cluster: &Cluster,
        job: &Job,
        optimized: bool,
        out: &mut Vec<(NodeIndex, u32)>,
    ) -> bool {
        out.clear();
        let mut total = 0u32;
        for &(index, tasks) in &self.entries {
            let Some(node) = cluster.node(index) else {
                continue;
            };
            if optimized {
                if node.match_job(job).is_err() {
                    continue;
                }
                out.push((index, tasks));
                total += tasks;
            } else {
                if !node.state.is_available() || !node.expected_state.is_available() {
                    continue;
                }
                let now_tasks = match node.match_job(job) {
                    Ok(t) => t.min(tasks),
                    Err(_) => continue,
                };
                if now_tasks == 0 {
                    continue;
                }
                out.push((index, now_tasks));
                total += now_tasks;
            }
        }
        total >= job.tasks
    }
}

/// Synthesize the throwaway probe job used for per-node feasibility checks.
///
/// The probe carries independent copies of the template's resource
/// descriptors so the scan never mutates the caller's template.
fn make_probe(template: &Job, threshold: u64, search: WindowSearch) -> Job {
    let mut probe = template.clone();
    probe.name = PROBE_JOB_NAME.to_string();
    if probe.tasks == 0 {
        probe.tasks = 1;
    }
    if search == WindowSearch::ShortestFirst {
        probe.walltime = probe.walltime.max(threshold);
    }
    probe
}

/// Locate the backfill window for a partition.
///
/// Scans the node table for nodes available to the probe for at least (under
/// [`WindowSearch::ShortestFirst`]) or at most ([`WindowSearch::LongestFirst`])
/// `threshold` seconds, and computes the duration until the next constraint
/// expires. The bound is additionally clamped by the nearest duration-limited
/// standing reservation, independent of node occupancy.
///
/// Never succeeds with zero nodes or zero duration. When `diag` is supplied
/// it accumulates one human-readable rejection line per node.
pub fn locate_window(
    cluster: &Cluster,
    partition: PartitionId,
    template: &Job,
    threshold: u64,
    mut diag: Option<&mut String>,
) -> BackfillResult<Window> {
    let cfg = &cluster.config;
    let search = cfg.window_search;
    let now = cluster.now;

    if !search.threshold_valid(threshold, cfg.horizon) {
        return Err(BackfillError::InvalidThreshold(threshold));
    }

    let probe = make_probe(template, threshold, search);
    debug!(
        partition = %partition,
        threshold,
        ?search,
        "searching for backfill nodes"
    );

    let horizon_dur = cfg.horizon.saturating_sub(now);
    let mut bound = search.initial_bound(cfg.horizon);
    let mut entries: Vec<(NodeIndex, u32)> = Vec::new();
    let mut node_count = 0u32;
    let mut task_count = 0u32;

    for slot in cluster.node_slots() {
        let Some(node) = slot else {
            continue;
        };

        let shared = cfg.shared_partition == Some(node.partition);
        let rsv_cap = if shared {
            cfg.max_rsv_per_shared_node
        } else {
            cfg.max_rsv_per_node
        };
        if node.reservation_count() >= rsv_cap {
            trace!(node = %node.name, "node skipped (reservation cap)");
            continue;
        }

        if !node.state.is_available() || !node.expected_state.is_available() {
            if let Some(d) = &mut diag {
                if !node.state.is_available() {
                    let _ = writeln!(d, "node {} is unavailable (state {:?})", node.name, node.state);
                } else {
                    let _ = writeln!(
                        d,
                        "node {} is unavailable (expected state {:?})",
                        node.name, node.expected_state
                    );
                }
            }
            continue;
        }

        let in_scope = node.partition == partition
            || partition == PartitionId::GLOBAL
            || node.partition == PartitionId::GLOBAL
            || shared;
        if !in_scope {
            if let Some(d) = &mut diag {
                let _ = writeln!(
                    d,
                    "node {} is unavailable (partition {})",
                    node.name, node.partition
                );
            }
            continue;
        }

        if shared && node.partition != partition {
            // Shared-partition resources are visible to every partition so
            // license/shared resources can backfill compute jobs. Recorded by
            // generic-resource count, with no time-bound check.
            trace!(node = %node.name, gres = node.avail_gres, "shared node found");
            if entries.len() < cfg.max_window_nodes {
                entries.push((node.index, node.avail_gres));
            }
            node_count += 1;
            task_count += node.avail_gres;
            continue;
        }

        if node.cfg_procs == 0 {
            // non-compute node outside the shared partition
            continue;
        }

        let tasks = match node.match_job(&probe) {
            Ok(tasks) => tasks,
            Err(reason) => {
                trace!(node = %node.name, %reason, "node rejected");
                if let Some(d) = &mut diag {
                    let _ = writeln!(d, "node {} is unavailable ({reason})", node.name);
                }
                continue;
            }
        };

        let Some(available) = node.available_window(now, cfg.horizon) else {
            if let Some(d) = &mut diag {
                let _ = writeln!(d, "node {} is blocked immediately", node.name);
            }
            continue;
        };

        if !search.accepts(available, threshold) {
            if let Some(d) = &mut diag {
                let _ = writeln!(
                    d,
                    "node {} is blocked by reservation in {available}s",
                    node.name
                );
            }
            continue;
        }
        if let Some(d) = &mut diag {
            let _ = writeln!(d, "node {}x{tasks} is available", node.name);
        }

        if search.improves(available, bound) {
            trace!(node = %node.name, available, "new bounding node");
            bound = available;
            if bound == horizon_dur {
                // the constraint is the end of time itself; report unbounded
                // so infinite-walltime jobs are not falsely blocked
                bound = cfg.horizon;
            }
        }

        if entries.len() < cfg.max_window_nodes {
            entries.push((node.index, tasks));
        }
        node_count += 1;
        task_count += tasks;
    }

    // Clamp by the nearest duration-limited standing reservation, regardless
    // of which nodes it occupies.
    for rsv in &cluster.reservations {
        if rsv.kind.is_job() {
            continue;
        }
        let Some(limit) = rsv.duration_limit else {
            continue;
        };
        if !search.accepts(limit, threshold) {
            continue;
        }
        if search.improves(limit, bound) {
            debug!(reservation = %rsv.name, limit, "window clamped by standing reservation");
            bound = limit;
        }
    }

    let duration = if bound >= cfg.horizon {
        WindowDuration::Unbounded
    } else {
        WindowDuration::Bounded(bound)
    };

    debug!(
        nodes = node_count,
        tasks = task_count,
        %duration,
        threshold,
        "resource window computed"
    );

    if node_count == 0 || bound == 0 {
        return Err(BackfillError::NoWindow {
            nodes: node_count,
            duration: bound,
        });
    }

    Ok(Window {
        entries,
        tasks: task_count,
        nodes: node_count,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alsvid_core::cluster::{RsvKind, StandingReservation};
    use alsvid_core::config::SchedConfig;
    use alsvid_core::node::Node;
    use alsvid_core::partition::Partition;

    fn make_cluster(nodes: u32, procs: u32) -> Cluster {
        let mut cluster = Cluster::new(SchedConfig::default());
        cluster.now = 1_000;
        for i in 0..nodes {
            cluster.add_node(Node::new(format!("n{i}"), procs));
        }
        cluster
    }

    fn probe_template() -> Job {
        Job::new("template", 1, 600)
    }

    #[test]
    fn test_idle_cluster_is_unbounded() {
        let cluster = make_cluster(4, 8);
        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();

        assert_eq!(window.nodes, 4);
        assert_eq!(window.tasks, 32);
        assert_eq!(window.duration, WindowDuration::Unbounded);
    }

    #[test]
    fn test_reserved_node_bounds_duration() {
        let mut cluster = make_cluster(2, 8);
        // n2 frees up work at now + 3600
        cluster.add_node(Node::new("n2", 8).with_reservation(4_600, 9_000));

        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();

        assert_eq!(window.nodes, 3);
        assert_eq!(window.duration, WindowDuration::Bounded(3_600));
    }

    #[test]
    fn test_standing_reservation_clamps_window() {
        // Scenario: a node is idle with no job reservation, but a standing
        // reservation with a 3600s duration limit exists.
        let mut cluster = make_cluster(2, 8);
        cluster.reservations.push(StandingReservation {
            name: "maintenance".to_string(),
            kind: RsvKind::Standing,
            duration_limit: Some(3_600),
        });

        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();

        assert_eq!(window.duration, WindowDuration::Bounded(3_600));
    }

    #[test]
    fn test_job_reservations_do_not_clamp() {
        let mut cluster = make_cluster(1, 8);
        cluster.reservations.push(StandingReservation {
            name: "job-rsv".to_string(),
            kind: RsvKind::Job,
            duration_limit: Some(60),
        });

        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();
        assert_eq!(window.duration, WindowDuration::Unbounded);
    }

    #[test]
    fn test_no_nodes_is_failure() {
        let mut cluster = Cluster::new(SchedConfig::default());
        cluster.now = 1_000;
        let result = locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None);
        assert!(matches!(result, Err(BackfillError::NoWindow { .. })));
    }

    #[test]
    fn test_busy_nodes_are_rejected_with_diagnostic() {
        let mut cluster = make_cluster(1, 8);
        cluster
            .node_mut(NodeIndex(0))
            .unwrap()
            .state = alsvid_core::node::NodeState::Busy;

        let mut diag = String::new();
        let result = locate_window(
            &cluster,
            PartitionId::GLOBAL,
            &probe_template(),
            0,
            Some(&mut diag),
        );

        assert!(matches!(result, Err(BackfillError::NoWindow { .. })));
        assert!(diag.contains("n0 is unavailable (state Busy)"));
    }

    #[test]
    fn test_reservation_cap_excludes_node() {
        let mut cluster = make_cluster(1, 8);
        let node = Node::new("crowded", 8)
            .with_reservation(5_000, 6_000)
            .with_reservation(7_000, 8_000);
        cluster.add_node(node);

        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();
        // default cap of 2 reservations excludes "crowded" entirely
        assert_eq!(window.nodes, 1);
    }

    #[test]
    fn test_foreign_partition_rejected_shared_admitted() {
        let mut cluster = make_cluster(0, 0);
        let batch = cluster.add_partition(Partition::new("batch"));
        let other = cluster.add_partition(Partition::new("other"));
        let shared = cluster.add_partition(Partition::new("shared"));
        cluster.config.shared_partition = Some(shared);

        cluster.add_node(Node::new("b0", 8).with_partition(batch));
        cluster.add_node(Node::new("o0", 8).with_partition(other));
        cluster.add_node(Node::new("lic", 0).with_partition(shared).with_gres(5));

        let template = probe_template().with_partition(batch);
        let window = locate_window(&cluster, batch, &template, 0, None).unwrap();

        // b0 (8 tasks) + shared license node (5 gres), o0 excluded
        assert_eq!(window.nodes, 2);
        assert_eq!(window.tasks, 13);
    }

    #[test]
    fn test_threshold_filters_short_windows() {
        let mut cluster = make_cluster(1, 8);
        // this node only has 600s before its reservation
        cluster.add_node(Node::new("short", 8).with_reservation(1_600, 9_000));

        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 1_800, None).unwrap();

        assert_eq!(window.nodes, 1);
        assert_eq!(window.duration, WindowDuration::Unbounded);
    }

    #[test]
    fn test_longest_first_direction() {
        let mut cluster = make_cluster(0, 0);
        cluster.now = 1_000;
        cluster.config.window_search = WindowSearch::LongestFirst;
        cluster.add_node(Node::new("a", 8).with_reservation(1_600, 9_000)); // 600s
        cluster.add_node(Node::new("b", 8).with_reservation(4_600, 9_000)); // 3600s

        // seek the longest window under 7200s: both accepted, bound is the max
        let window =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 7_200, None).unwrap();
        assert_eq!(window.nodes, 2);
        assert_eq!(window.duration, WindowDuration::Bounded(3_600));

        // a zero threshold is meaningless when seeking below it
        let result = locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None);
        assert!(matches!(result, Err(BackfillError::InvalidThreshold(0))));
    }

    #[test]
    fn test_locate_window_is_idempotent() {
        let mut cluster = make_cluster(3, 8);
        cluster.add_node(Node::new("r", 8).with_reservation(2_000, 4_000));

        let first =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();
        let second =
            locate_window(&cluster, PartitionId::GLOBAL, &probe_template(), 0, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_probe_does_not_mutate_template() {
        let cluster = make_cluster(1, 8);
        let template = probe_template();
        let before = template.clone();
        let _ = locate_window(&cluster, PartitionId::GLOBAL, &template, 1_800, None);
        assert_eq!(template.walltime, before.walltime);
        assert_eq!(template.name, before.name);
    }
}
