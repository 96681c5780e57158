//! Backend attaching to an externally managed search node.
//!
//! Nothing is bound or spawned locally: `start` checks that a node of the
//! configured cluster answers at `search.host:search.port`, and `stop`
//! detaches without shutting the remote node down.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::client::HealthClient;
use super::{HealthSnapshot, NodeBackend, NodeInstance};
use crate::config::NodeConfiguration;
use crate::error::{Error, ForcedShutdownWarning, Result};
use crate::index::IndexDefinition;

/// Backend for nodes whose process is owned by someone else.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteNode;

impl RemoteNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeBackend for RemoteNode {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn binds_local_port(&self) -> bool {
        false
    }

    async fn start(
        &self,
        config: &NodeConfiguration,
        indices: &[IndexDefinition],
    ) -> Result<Box<dyn NodeInstance>> {
        let address = config
            .address()
            .ok_or_else(|| Error::start("remote backend needs an explicit search.port"))?;
        let client = HealthClient::new(config.cluster_name.clone())?;

        let info = client
            .node_info(&address)
            .await
            .map_err(|e| Error::start(format!("remote node not reachable: {e}")))?;
        if info.cluster_name != config.cluster_name {
            return Err(Error::start(format!(
                "node at {address} belongs to cluster '{}', expected '{}'",
                info.cluster_name, config.cluster_name
            )));
        }

        if !indices.is_empty() {
            warn!(
                address = %address,
                indices = indices.len(),
                "Remote node manages its own indices; declared indices are not registered"
            );
        }

        info!(address = %address, node = %info.name, "Attached to remote node");
        Ok(Box::new(RemoteInstance {
            node_name: info.name,
            address,
            client,
            detached: false,
        }))
    }
}

/// Attachment to a remote node.
pub struct RemoteInstance {
    node_name: String,
    address: String,
    client: HealthClient,
    detached: bool,
}

#[async_trait]
impl NodeInstance for RemoteInstance {
    fn node_name(&self) -> &str {
        &self.node_name
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn health_status(&self) -> Result<HealthSnapshot> {
        if self.detached {
            return Err(Error::unavailable("detached from remote node"));
        }
        self.client.health_snapshot(&self.address).await
    }

    fn has_terminated(&self) -> bool {
        false
    }

    async fn stop(&mut self, _ceiling: Duration) -> Option<ForcedShutdownWarning> {
        if !self.detached {
            self.detached = true;
            info!(address = %self.address, "Detached from remote node");
        }
        None
    }
}
