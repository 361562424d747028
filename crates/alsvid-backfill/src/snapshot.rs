//! Node-state snapshots for trial scheduling.

use alsvid_core::cluster::Cluster;
use alsvid_core::node::{NodeIndex, NodeState};

/// Point-in-time copy of every node's state, keyed by stable node index.
///
/// Taken once on entry to a trial search and applied on every exit path, so
/// trial `Reserved` markings never leak into the real tables even if the
/// node table grew in the meantime.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    states: Vec<(NodeIndex, NodeState)>,
}

impl ClusterSnapshot {
    /// Capture the current state of every live node.
    pub fn capture(cluster: &Cluster) -> Self {
        Self {
            states: cluster
                .node_slots()
                .iter()
                .flatten()
                .map(|node| (node.index, node.state))
                .collect(),
        }
    }

    /// The captured state of a node, if it existed at capture time.
    pub fn state_of(&self, index: NodeIndex) -> Option<NodeState> {
        // states are in ascending index order by construction
        self.states
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.states[pos].1)
    }

    /// Restore the captured state of the listed nodes.
    pub fn restore_nodes(&self, cluster: &mut Cluster, nodes: &[(NodeIndex, u32)]) {
        for &(index, _) in nodes {
            if let Some(state) = self.state_of(index) {
                if let Some(node) = cluster.node_mut(index) {
                    node.state = state;
                }
            }
        }
    }

    /// Restore the captured state of every node.
    pub fn restore(&self, cluster: &mut Cluster) {
        for &(index, state) in &self.states {
            if let Some(node) = cluster.node_mut(index) {
                node.state = state;
            }
        }
    }
}
