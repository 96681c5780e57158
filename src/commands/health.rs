//! Probe the cluster health of a running node.

use anyhow::{Context, Result};

use nodewarden::HealthClient;

/// Print the node's cluster health as JSON.
///
/// Fails (non-zero exit) when no node of `cluster_name` answers at
/// `host:port`.
pub async fn execute(host: &str, port: u16, cluster_name: &str) -> Result<()> {
    let client = HealthClient::new(cluster_name)?;
    let address = format!("{host}:{port}");

    let health = client
        .cluster_health(&address)
        .await
        .with_context(|| format!("No healthy node of cluster '{cluster_name}' at {address}"))?;

    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
