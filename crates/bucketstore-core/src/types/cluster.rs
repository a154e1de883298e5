use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reported state of one storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Up,
    Initializing,
    Retired,
    Maintenance,
    Down,
}

impl NodeState {
    /// Whether a node in this state still serves its buckets.
    pub fn is_up(self) -> bool {
        matches!(self, NodeState::Up | NodeState::Initializing | NodeState::Retired)
    }
}

/// Cluster-wide view pushed to every node by the cluster controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterState {
    /// Monotonic version of this state
    pub version: u32,

    /// Node index -> state. Nodes not listed are considered down.
    #[serde(default)]
    pub nodes: BTreeMap<u16, NodeState>,
}

impl ClusterState {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            nodes: BTreeMap::new(),
        }
    }

    pub fn with_node(mut self, index: u16, state: NodeState) -> Self {
        self.nodes.insert(index, state);
        self
    }

    pub fn node_state(&self, index: u16) -> NodeState {
        self.nodes.get(&index).copied().unwrap_or(NodeState::Down)
    }

    pub fn node_up(&self, index: u16) -> bool {
        self.node_state(index).is_up()
    }
}
