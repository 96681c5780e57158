//! In-memory cluster state of an embedded node.
//!
//! Holds the member list, the registered indices and the node's own phase,
//! and derives cluster health from them:
//!
//! - RED until discovery completes with at least `minimum_master_nodes`
//!   members
//! - YELLOW when every primary is assigned but some replica has no node to
//!   live on (a replica never shares a node with its primary)
//! - GREEN when every shard copy is assigned

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{ClusterStatus, HealthSnapshot};
use crate::index::IndexDefinition;

/// Lifecycle phase of the node process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

/// Identity of a cluster member, as served on `/_nodes/local`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub name: String,
    pub cluster_name: String,
    pub address: String,
    pub version: String,
}

/// Body of `/_cluster/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: ClusterStatus,
    pub number_of_nodes: u32,
    pub active_primary_shards: u32,
    pub active_shards: u32,
    pub unassigned_shards: u32,
}

impl From<&ClusterHealth> for HealthSnapshot {
    fn from(health: &ClusterHealth) -> Self {
        Self {
            status: health.status,
            node_count: health.number_of_nodes,
        }
    }
}

/// Body of `/_cluster/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster_name: String,
    pub status: ClusterStatus,
    pub nodes: NodeCount,
    pub indices: IndexStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCount {
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: u32,
    pub names: Vec<String>,
}

struct Inner {
    phase: NodePhase,
    discovered: bool,
    members: BTreeMap<String, NodeInfo>,
    indices: Vec<IndexDefinition>,
}

/// Shared, lock-protected cluster state of one node.
pub struct ClusterState {
    local: NodeInfo,
    minimum_master_nodes: u32,
    inner: RwLock<Inner>,
}

impl ClusterState {
    /// New state with only the local node as member and discovery pending.
    pub fn new(local: NodeInfo, minimum_master_nodes: u32, indices: Vec<IndexDefinition>) -> Self {
        let mut members = BTreeMap::new();
        members.insert(local.node_id.clone(), local.clone());
        Self {
            local,
            minimum_master_nodes: minimum_master_nodes.max(1),
            inner: RwLock::new(Inner {
                phase: NodePhase::Starting,
                discovered: false,
                members,
                indices,
            }),
        }
    }

    pub fn local(&self) -> &NodeInfo {
        &self.local
    }

    pub fn cluster_name(&self) -> &str {
        &self.local.cluster_name
    }

    pub fn phase(&self) -> NodePhase {
        self.inner.read().phase
    }

    pub fn set_phase(&self, phase: NodePhase) {
        self.inner.write().phase = phase;
    }

    /// Add a peer found during discovery. Returns false for self or a
    /// peer of another cluster.
    pub fn join(&self, peer: NodeInfo) -> bool {
        if peer.node_id == self.local.node_id || peer.cluster_name != self.local.cluster_name {
            return false;
        }
        self.inner.write().members.insert(peer.node_id.clone(), peer);
        true
    }

    /// Mark the discovery round as complete.
    pub fn complete_discovery(&self) {
        self.inner.write().discovered = true;
    }

    pub fn is_discovered(&self) -> bool {
        self.inner.read().discovered
    }

    pub fn members(&self) -> Vec<NodeInfo> {
        self.inner.read().members.values().cloned().collect()
    }

    /// Current health, derived from members and indices.
    pub fn health(&self) -> ClusterHealth {
        let inner = self.inner.read();
        let nodes = u32::try_from(inner.members.len()).unwrap_or(u32::MAX);
        let formed = inner.discovered && nodes >= self.minimum_master_nodes;

        // Counts saturate at u32::MAX
        let mut primaries: u32 = 0;
        let mut active: u32 = 0;
        let mut unassigned: u32 = 0;
        for index in &inner.indices {
            if !formed {
                unassigned = unassigned.saturating_add(index.total_shards());
                continue;
            }
            // One copy per node: a replica cannot sit next to its primary
            let placed_replicas = index.replicas.min(nodes.saturating_sub(1));
            primaries = primaries.saturating_add(index.shards);
            active = active
                .saturating_add(index.shards.saturating_mul(placed_replicas.saturating_add(1)));
            unassigned = unassigned
                .saturating_add(index.shards.saturating_mul(index.replicas - placed_replicas));
        }

        let status = if !formed {
            ClusterStatus::Red
        } else if unassigned > 0 {
            ClusterStatus::Yellow
        } else {
            ClusterStatus::Green
        };

        ClusterHealth {
            cluster_name: self.local.cluster_name.clone(),
            status,
            number_of_nodes: nodes,
            active_primary_shards: primaries,
            active_shards: active,
            unassigned_shards: unassigned,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot::from(&self.health())
    }

    pub fn stats(&self) -> ClusterStats {
        let health = self.health();
        let inner = self.inner.read();
        ClusterStats {
            cluster_name: health.cluster_name,
            status: health.status,
            nodes: NodeCount {
                count: health.number_of_nodes,
            },
            indices: IndexStats {
                count: u32::try_from(inner.indices.len()).unwrap_or(u32::MAX),
                names: inner.indices.iter().map(|i| i.name.clone()).collect(),
            },
        }
    }
}
