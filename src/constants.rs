//! Shared constants for nodewarden.
//!
//! Property keys, default timeouts and the polling cadence used by the
//! supervisor and its collaborators live here so that the CLI, the config
//! builder and the tests agree on the same values.

use std::time::Duration;

// =============================================================================
// Property keys
// =============================================================================

/// Name of the cluster the node joins (required).
pub const CLUSTER_NAME: &str = "cluster.name";

/// Name of this node inside the cluster (required).
pub const CLUSTER_NODE_NAME: &str = "cluster.node.name";

/// Process home directory; data and logs are derived from it (required).
pub const PATH_HOME: &str = "path.home";

/// Interface the node listens on.
pub const SEARCH_HOST: &str = "search.host";

/// Port the node listens on. Absent or `0` means "allocate one".
pub const SEARCH_PORT: &str = "search.port";

/// Comma separated `host:port` list of peers pinged during discovery.
pub const DISCOVERY_SEED_HOSTS: &str = "search.discovery.seed_hosts";

/// Number of members required before the cluster leaves RED.
pub const DISCOVERY_MINIMUM_MASTER_NODES: &str = "search.discovery.minimum_master_nodes";

/// Timeout of a single discovery ping, in milliseconds.
pub const DISCOVERY_PING_TIMEOUT_MS: &str = "search.discovery.ping_timeout_ms";

/// Ceiling of the readiness wait performed by `start()`, in milliseconds.
pub const READY_TIMEOUT_MS: &str = "search.ready_timeout_ms";

/// Ceiling of a graceful node shutdown, in milliseconds.
pub const STOP_TIMEOUT_MS: &str = "search.stop_timeout_ms";

/// Readiness polling cadence, in milliseconds.
pub const PROBE_INTERVAL_MS: &str = "search.probe_interval_ms";

/// Extra attempts when an allocated port is taken before the node binds it.
pub const BIND_RETRIES: &str = "search.bind_retries";

/// Node backend: `embedded` (default) or `remote`.
pub const BACKEND: &str = "search.backend";

// =============================================================================
// Defaults
// =============================================================================

/// Default listen interface.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default readiness ceiling.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default graceful stop ceiling before the node is forced down.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default readiness polling cadence.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Default discovery ping timeout.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_millis(500);

/// Default timeout of an external health request.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of bind retries for allocated ports.
pub const DEFAULT_BIND_RETRIES: u32 = 3;

/// Default number of primary shards for a new index.
pub const DEFAULT_SHARDS: u32 = 1;

/// Default number of replicas per primary for a new index.
pub const DEFAULT_REPLICAS: u32 = 0;

/// Environment variable used as a fallback for `path.home`.
pub const HOME_ENV: &str = "NODEWARDEN_HOME";

/// Version reported by the node's info endpoint.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");
