//! Search node backends.
//!
//! A backend knows how to bring a node up; the instance it returns owns the
//! node's runtime resources (listener, tasks, cluster state) until stopped.
//! The supervisor only talks to these two traits, so the in-process node can
//! be swapped for an externally managed one without touching the state
//! machine.
//!
//! ## Module Structure
//!
//! - [`cluster`]: In-memory cluster state and health computation
//! - [`http`]: HTTP surface served by the embedded node
//! - [`embedded`]: In-process node backend
//! - [`remote`]: Backend attaching to an externally managed node
//! - [`client`]: HTTP health client used for probing and discovery

pub mod client;
pub mod cluster;
pub mod embedded;
pub mod http;
pub mod remote;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NodeConfiguration;
use crate::error::{ForcedShutdownWarning, Result};
use crate::index::IndexDefinition;

pub use client::HealthClient;
pub use cluster::{ClusterHealth, ClusterState, ClusterStats, NodeInfo, NodePhase};
pub use embedded::EmbeddedNode;
pub use remote::RemoteNode;

/// Aggregate health of a cluster, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Some primary shard is unassigned, or the cluster has not formed.
    Red,
    /// All primaries assigned, some replica is not.
    Yellow,
    /// Every shard copy assigned.
    Green,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Red => "RED",
            Self::Yellow => "YELLOW",
            Self::Green => "GREEN",
        })
    }
}

/// Point-in-time health read of a running node. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: ClusterStatus,
    pub node_count: u32,
}

impl HealthSnapshot {
    pub fn is_green(&self) -> bool {
        self.status == ClusterStatus::Green
    }
}

/// Capability to bring up a search node.
#[async_trait]
pub trait NodeBackend: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether a free local port should be allocated when none is configured.
    ///
    /// Backends attaching to something that already listens return `false`
    /// and require an explicit port.
    fn binds_local_port(&self) -> bool {
        true
    }

    /// Start a node for `config` (which carries a port) and register
    /// `indices` on it.
    ///
    /// Must not leave any resource behind when it fails.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::PortInUse`] when the port is already bound
    /// - [`crate::Error::Start`] on any other bootstrap failure
    async fn start(
        &self,
        config: &NodeConfiguration,
        indices: &[IndexDefinition],
    ) -> Result<Box<dyn NodeInstance>>;
}

/// A started node and the resources it owns.
#[async_trait]
pub trait NodeInstance: Send + Sync {
    fn node_name(&self) -> &str;

    /// `host:port` clients connect to.
    fn address(&self) -> String;

    /// Best-effort health read that never waits on the node's lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unavailable`] when the node is not queryable
    /// (starting, stopping, stopped or gone).
    async fn health_status(&self) -> Result<HealthSnapshot>;

    /// True when the node went away without being asked to stop.
    fn has_terminated(&self) -> bool;

    /// Release everything the node owns.
    ///
    /// Idempotent. Waits up to `ceiling` for a graceful shutdown, then forces
    /// it and returns the warning.
    async fn stop(&mut self, ceiling: Duration) -> Option<ForcedShutdownWarning>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(ClusterStatus::Red < ClusterStatus::Yellow);
        assert!(ClusterStatus::Yellow < ClusterStatus::Green);
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(
            serde_json::to_string(&ClusterStatus::Green).unwrap(),
            "\"green\""
        );
        let status: ClusterStatus = serde_json::from_str("\"yellow\"").unwrap();
        assert_eq!(status, ClusterStatus::Yellow);
        assert_eq!(ClusterStatus::Red.to_string(), "RED");
    }
}
