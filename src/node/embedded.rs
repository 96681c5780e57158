//! In-process search node.
//!
//! The node lives inside the supervising process but is handled with the
//! discipline of an external one: it owns a TCP listener, a server task and a
//! discovery task, and all of them are released by [`NodeInstance::stop`] or,
//! as a last resort, when the instance is dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::HealthClient;
use super::cluster::{ClusterState, NodeInfo, NodePhase};
use super::{HealthSnapshot, NodeBackend, NodeInstance, http};
use crate::config::{DiscoverySettings, NodeConfiguration};
use crate::constants;
use crate::error::{Error, ForcedShutdownWarning, Result};
use crate::index::IndexDefinition;

/// Backend starting nodes inside the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedNode;

impl EmbeddedNode {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeBackend for EmbeddedNode {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn start(
        &self,
        config: &NodeConfiguration,
        indices: &[IndexDefinition],
    ) -> Result<Box<dyn NodeInstance>> {
        let port = config
            .port
            .ok_or_else(|| Error::start("no port assigned to the node"))?;

        let listener = TcpListener::bind((config.host.as_str(), port))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AddrInUse => Error::PortInUse { port },
                _ => Error::start(format!("failed to bind {}:{port}: {e}", config.host)),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::start(format!("failed to read bound address: {e}")))?;

        // The listener is dropped on every early return below
        for dir in [&config.data_path, &config.logs_path] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::start(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let local = NodeInfo {
            node_id: uuid::Uuid::new_v4().to_string(),
            name: config.node_name.clone(),
            cluster_name: config.cluster_name.clone(),
            address: local_addr.to_string(),
            version: constants::NODE_VERSION.to_string(),
        };
        let cluster = Arc::new(ClusterState::new(
            local,
            config.discovery.minimum_master_nodes,
            indices.to_vec(),
        ));
        let pinger = HealthClient::with_timeout(
            config.cluster_name.clone(),
            config.discovery.ping_timeout,
        )?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, Arc::clone(&cluster), shutdown_rx));
        cluster.set_phase(NodePhase::Running);
        let discovery = tokio::spawn(discover(
            Arc::clone(&cluster),
            config.discovery.clone(),
            pinger,
        ));

        info!(
            node = %config.node_name,
            cluster = %config.cluster_name,
            address = %local_addr,
            indices = indices.len(),
            "Embedded node started"
        );

        Ok(Box::new(EmbeddedInstance {
            node_name: config.node_name.clone(),
            address: local_addr,
            cluster,
            shutdown: shutdown_tx,
            server,
            discovery,
            stopped: false,
        }))
    }
}

async fn serve(
    listener: TcpListener,
    cluster: Arc<ClusterState>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let app = http::router(Arc::clone(&cluster));
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // A dropped sender also means shut down
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await;
    cluster.set_phase(NodePhase::Stopped);
    result
}

/// One discovery round: ping all seeds at once, admit peers of the same
/// cluster.
async fn discover(cluster: Arc<ClusterState>, settings: DiscoverySettings, pinger: HealthClient) {
    let pings = settings.seed_hosts.iter().map(|seed| pinger.node_info(seed));
    let answers = futures::future::join_all(pings).await;

    for (seed, answer) in settings.seed_hosts.iter().zip(answers) {
        match answer {
            Ok(peer) if peer.cluster_name != cluster.cluster_name() => {
                warn!(
                    seed = %seed,
                    peer_cluster = %peer.cluster_name,
                    "Ignoring seed from another cluster"
                );
            },
            Ok(peer) => {
                let name = peer.name.clone();
                if cluster.join(peer) {
                    info!(seed = %seed, peer = %name, "Peer joined cluster");
                }
            },
            Err(e) => {
                debug!(seed = %seed, error = %e, "Seed not reachable");
            },
        }
    }

    cluster.complete_discovery();
    debug!(
        cluster = %cluster.cluster_name(),
        members = cluster.members().len(),
        "Discovery complete"
    );
}

/// A running embedded node.
pub struct EmbeddedInstance {
    node_name: String,
    address: SocketAddr,
    cluster: Arc<ClusterState>,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<std::io::Result<()>>,
    discovery: JoinHandle<()>,
    stopped: bool,
}

impl EmbeddedInstance {
    /// Cluster state shared with the node's HTTP surface.
    pub fn cluster(&self) -> &Arc<ClusterState> {
        &self.cluster
    }
}

#[async_trait]
impl NodeInstance for EmbeddedInstance {
    fn node_name(&self) -> &str {
        &self.node_name
    }

    fn address(&self) -> String {
        self.address.to_string()
    }

    async fn health_status(&self) -> Result<HealthSnapshot> {
        if self.server.is_finished() && !self.stopped {
            return Err(Error::unavailable("node server terminated"));
        }
        match self.cluster.phase() {
            NodePhase::Running => Ok(self.cluster.snapshot()),
            phase => Err(Error::unavailable(format!("node is {phase}"))),
        }
    }

    fn has_terminated(&self) -> bool {
        !self.stopped && self.server.is_finished()
    }

    async fn stop(&mut self, ceiling: Duration) -> Option<ForcedShutdownWarning> {
        if self.stopped {
            return None;
        }
        self.stopped = true;

        self.cluster.set_phase(NodePhase::Stopping);
        self.discovery.abort();
        let _ = self.shutdown.send(true);

        let forced = match tokio::time::timeout(ceiling, &mut self.server).await {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => {
                warn!(node = %self.node_name, error = %e, "Node server exited with error");
                None
            },
            Ok(Err(e)) => {
                warn!(node = %self.node_name, error = %e, "Node server task failed");
                None
            },
            Err(_) => {
                self.server.abort();
                // Wait for the aborted task so the listener is really gone
                let _ = (&mut self.server).await;
                Some(ForcedShutdownWarning {
                    node_name: self.node_name.clone(),
                    waited: ceiling,
                })
            },
        };

        self.cluster.set_phase(NodePhase::Stopped);
        info!(node = %self.node_name, address = %self.address, "Embedded node stopped");
        forced
    }
}

impl Drop for EmbeddedInstance {
    fn drop(&mut self) {
        if !self.stopped {
            warn!(node = %self.node_name, "Embedded node dropped without stop, aborting");
            let _ = self.shutdown.send(true);
            self.discovery.abort();
            self.server.abort();
        }
    }
}
