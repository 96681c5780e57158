//! HTTP client for probing search nodes from the outside.
//!
//! Every request is bound to an expected cluster name: a node that answers
//! for another cluster is treated as unavailable, exactly like one that does
//! not answer at all.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use super::HealthSnapshot;
use super::cluster::{ClusterHealth, ClusterStats, NodeInfo};
use crate::constants;
use crate::error::{Error, Result};

/// Health probe bound to one cluster name.
#[derive(Debug, Clone)]
pub struct HealthClient {
    cluster_name: String,
    client: reqwest::Client,
}

impl HealthClient {
    /// Create a client with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(cluster_name: impl Into<String>) -> Result<Self> {
        Self::with_timeout(cluster_name, constants::DEFAULT_HEALTH_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_timeout(cluster_name: impl Into<String>, timeout: Duration) -> Result<Self> {
        // No idle pooling: a stopped node must show up as refused, not as a
        // stale pooled connection
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            cluster_name: cluster_name.into(),
            client,
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// GET `/_cluster/health` on `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the node cannot be reached, answers
    /// with an error status, or belongs to another cluster.
    pub async fn cluster_health(&self, address: &str) -> Result<ClusterHealth> {
        let health: ClusterHealth = self.get_json(address, "/_cluster/health").await?;
        self.check_cluster(address, &health.cluster_name)?;
        Ok(health)
    }

    /// Health reduced to a [`HealthSnapshot`].
    ///
    /// # Errors
    ///
    /// Same as [`HealthClient::cluster_health`].
    pub async fn health_snapshot(&self, address: &str) -> Result<HealthSnapshot> {
        Ok(HealthSnapshot::from(&self.cluster_health(address).await?))
    }

    /// GET `/_cluster/stats` on `address`.
    ///
    /// # Errors
    ///
    /// Same as [`HealthClient::cluster_health`].
    pub async fn cluster_stats(&self, address: &str) -> Result<ClusterStats> {
        let stats: ClusterStats = self.get_json(address, "/_cluster/stats").await?;
        self.check_cluster(address, &stats.cluster_name)?;
        Ok(stats)
    }

    /// GET `/_nodes/local` on `address`, without checking the cluster name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when the node cannot be reached.
    pub async fn node_info(&self, address: &str) -> Result<NodeInfo> {
        self.get_json(address, "/_nodes/local").await
    }

    fn check_cluster(&self, address: &str, actual: &str) -> Result<()> {
        if actual == self.cluster_name {
            Ok(())
        } else {
            Err(Error::unavailable(format!(
                "node at {address} belongs to cluster '{actual}', expected '{}'",
                self.cluster_name
            )))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, address: &str, path: &str) -> Result<T> {
        let url = format!("http://{address}{path}");

        let response = self.client.get(&url).send().await.map_err(|e| {
            debug!(url = %url, error = %e, "Node request failed");
            Error::unavailable(format!("no node available at {address}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "node at {address} answered {status} for {path}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::unavailable(format!("invalid response from {address}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::PortAllocator;

    #[test]
    fn test_cluster_check() {
        let client = HealthClient::new("unitTest").unwrap();
        assert!(client.check_cluster("a:1", "unitTest").is_ok());
        let err = client.check_cluster("a:1", "other").unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("expected 'unitTest'"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unavailable() {
        let port = PortAllocator::new().allocate().unwrap();
        let client = HealthClient::with_timeout("unitTest", Duration::from_millis(200)).unwrap();
        let err = client
            .cluster_health(&format!("127.0.0.1:{port}"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
    }
}
