//! Configuration types for a supervised search node.
//!
//! - [`Props`] - flat property map, loadable from TOML
//! - [`NodeConfiguration`] - immutable record handed to a node backend
//! - [`NodeConfigBuilder`] - validates properties into a [`NodeConfiguration`]
//! - [`SupervisorSettings`] - timeouts and retry budget of the supervisor
//!
//! Nested TOML tables are flattened into dotted keys, so
//!
//! ```toml
//! [cluster]
//! name = "prod"
//! node.name = "node-1"
//! ```
//!
//! yields `cluster.name = prod` and `cluster.node.name = node-1`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants;
use crate::error::{Error, Result};
use crate::paths;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

// =============================================================================
// Props
// =============================================================================

/// Process-wide properties as a flat `key -> value` map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Props {
    values: BTreeMap<String, String>,
}

impl Props {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load properties from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or is not
    /// valid TOML.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading config file {}", path.display()), e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::configuration(format!("{}: {msg}", path.display()))
            },
            other => other,
        })
    }

    /// Parse properties from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on invalid TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("invalid TOML: {e}")))?;
        let mut values = BTreeMap::new();
        flatten_into(&mut values, None, &table);
        Ok(Self { values })
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Set a property only if it is not already present.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.entry(key.into()).or_insert_with(|| value.into());
        self
    }

    /// Remove a property.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Raw value of a property.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn non_blank(&self, key: &str) -> Option<&str> {
        self.value(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Parse a property, `Ok(None)` when absent or blank.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.non_blank(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Error::configuration(format!("property {key} has invalid value '{raw}'"))
            }),
        }
    }

    /// Parse a millisecond property into a [`Duration`], with a default.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the value is not a whole number.
    pub fn millis(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self
            .parse::<u64>(key)?
            .map_or(default, Duration::from_millis))
    }

    /// Comma separated list property; empty entries are dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.non_blank(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate over all properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, prefix: Option<&str>, table: &toml::Table) {
    for (key, value) in table {
        let full = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            toml::Value::Table(nested) => flatten_into(out, Some(&full), nested),
            other => {
                out.insert(full, scalar_to_string(other));
            },
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

// =============================================================================
// Node configuration
// =============================================================================

/// How the node finds its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// `host:port` of peers pinged once at bootstrap.
    pub seed_hosts: Vec<String>,
    /// Members required before the cluster can leave RED.
    pub minimum_master_nodes: u32,
    /// Timeout of a single ping.
    pub ping_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            seed_hosts: Vec::new(),
            minimum_master_nodes: 1,
            ping_timeout: constants::DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Immutable configuration of one search node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfiguration {
    pub cluster_name: String,
    pub node_name: String,
    /// Canonical, existing, writable home directory.
    pub home_path: PathBuf,
    pub data_path: PathBuf,
    pub logs_path: PathBuf,
    pub host: String,
    /// `None` until a port has been configured or allocated.
    pub port: Option<u16>,
    pub discovery: DiscoverySettings,
}

impl NodeConfiguration {
    /// Copy of this configuration bound to `port`.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port: Some(port),
            ..self.clone()
        }
    }

    /// `host:port` the node listens on, once a port is known.
    pub fn address(&self) -> Option<String> {
        self.port.map(|port| format!("{}:{port}", self.host))
    }
}

/// Builds a [`NodeConfiguration`] from [`Props`].
pub struct NodeConfigBuilder;

impl NodeConfigBuilder {
    /// Validate properties into a node configuration.
    ///
    /// The only I/O is the home path check. A missing `search.port` (or `0`)
    /// leaves the port unset for the supervisor to allocate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error listing every problem found:
    /// - missing cluster name, node name or home path
    /// - a home path that is not an existing writable directory
    /// - a port or discovery setting that does not parse
    pub fn build(props: &Props) -> Result<NodeConfiguration> {
        let mut errors = Vec::new();

        let cluster_name = required(props, constants::CLUSTER_NAME, &mut errors);
        let node_name = required(props, constants::CLUSTER_NODE_NAME, &mut errors);

        let home_path = match props.non_blank(constants::PATH_HOME) {
            None => {
                errors.push(format!("missing required property {}", constants::PATH_HOME));
                None
            },
            Some(raw) => match paths::resolve_writable_dir(Path::new(raw)) {
                Ok(path) => Some(path),
                Err(e) => {
                    errors.push(e.to_string());
                    None
                },
            },
        };

        let port = match props.parse::<u16>(constants::SEARCH_PORT) {
            Ok(port) => port.filter(|p| *p != 0),
            Err(_) => {
                errors.push(format!(
                    "{} must be a port number (1-65535), got '{}'",
                    constants::SEARCH_PORT,
                    props.value(constants::SEARCH_PORT).unwrap_or_default()
                ));
                None
            },
        };

        let discovery = match discovery_settings(props) {
            Ok(d) => d,
            Err(e) => {
                errors.push(e.to_string());
                DiscoverySettings::default()
            },
        };

        if !errors.is_empty() {
            return Err(Error::configuration(errors.join("; ")));
        }

        // All three are Some when no error was recorded
        let (Some(cluster_name), Some(node_name), Some(home_path)) =
            (cluster_name, node_name, home_path)
        else {
            return Err(Error::configuration("incomplete node configuration"));
        };

        Ok(NodeConfiguration {
            data_path: paths::data_dir(&home_path),
            logs_path: paths::logs_dir(&home_path),
            home_path,
            cluster_name,
            node_name,
            host: props
                .non_blank(constants::SEARCH_HOST)
                .unwrap_or(constants::DEFAULT_HOST)
                .to_string(),
            port,
            discovery,
        })
    }

    /// Non-fatal checks on a built configuration.
    pub fn validate(config: &NodeConfiguration) -> ValidationResult {
        let mut warnings = Vec::new();

        if let Some(port) = config.port
            && port < 1024
        {
            warnings.push(format!(
                "Search port {port} is a system/privileged port (< 1024)\n  \
                 Recommendation: leave search.port unset to allocate a free port"
            ));
        }

        if config.discovery.minimum_master_nodes as usize > config.discovery.seed_hosts.len() + 1
        {
            warnings.push(format!(
                "minimum_master_nodes is {} but only {} seed host(s) are configured; \
                 the cluster will stay RED",
                config.discovery.minimum_master_nodes,
                config.discovery.seed_hosts.len()
            ));
        }

        ValidationResult { warnings }
    }
}

fn required(props: &Props, key: &str, errors: &mut Vec<String>) -> Option<String> {
    let value = props.non_blank(key).map(ToString::to_string);
    if value.is_none() {
        errors.push(format!("missing required property {key}"));
    }
    value
}

fn discovery_settings(props: &Props) -> Result<DiscoverySettings> {
    let minimum_master_nodes = props
        .parse::<u32>(constants::DISCOVERY_MINIMUM_MASTER_NODES)?
        .unwrap_or(1);
    if minimum_master_nodes == 0 {
        return Err(Error::configuration(format!(
            "{} must be at least 1",
            constants::DISCOVERY_MINIMUM_MASTER_NODES
        )));
    }

    Ok(DiscoverySettings {
        seed_hosts: props.list(constants::DISCOVERY_SEED_HOSTS),
        minimum_master_nodes,
        ping_timeout: props.millis(
            constants::DISCOVERY_PING_TIMEOUT_MS,
            constants::DEFAULT_PING_TIMEOUT,
        )?,
    })
}

// =============================================================================
// Supervisor settings
// =============================================================================

/// Which node backend the supervisor drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process node owning its own listener.
    #[default]
    Embedded,
    /// Externally managed node; the supervisor only attaches.
    Remote,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "remote" => Ok(Self::Remote),
            other => Err(Error::configuration(format!(
                "unknown backend '{other}' (expected 'embedded' or 'remote')"
            ))),
        }
    }
}

/// Ceilings and budgets of the lifecycle supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Ceiling of the readiness wait inside `start()`.
    pub ready_timeout: Duration,
    /// Ceiling of a graceful stop before the node is forced down.
    pub stop_timeout: Duration,
    /// Readiness polling cadence.
    pub probe_interval: Duration,
    /// Extra bind attempts when an allocated port is lost to another process.
    pub bind_retries: u32,
    pub backend: BackendKind,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            ready_timeout: constants::DEFAULT_READY_TIMEOUT,
            stop_timeout: constants::DEFAULT_STOP_TIMEOUT,
            probe_interval: constants::DEFAULT_PROBE_INTERVAL,
            bind_retries: constants::DEFAULT_BIND_RETRIES,
            backend: BackendKind::default(),
        }
    }
}

impl SupervisorSettings {
    /// Read settings from properties, defaulting anything absent.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for values that do not parse or a zero
    /// probe interval.
    pub fn from_props(props: &Props) -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            ready_timeout: props.millis(constants::READY_TIMEOUT_MS, defaults.ready_timeout)?,
            stop_timeout: props.millis(constants::STOP_TIMEOUT_MS, defaults.stop_timeout)?,
            probe_interval: props.millis(constants::PROBE_INTERVAL_MS, defaults.probe_interval)?,
            bind_retries: props
                .parse(constants::BIND_RETRIES)?
                .unwrap_or(defaults.bind_retries),
            backend: props
                .parse(constants::BACKEND)?
                .unwrap_or(defaults.backend),
        };

        if settings.probe_interval.is_zero() {
            return Err(Error::configuration(format!(
                "{} must be greater than 0",
                constants::PROBE_INTERVAL_MS
            )));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn valid_props(home: &Path) -> Props {
        let mut props = Props::new();
        props
            .set(constants::CLUSTER_NAME, "unitTest")
            .set(constants::CLUSTER_NODE_NAME, "test")
            .set(constants::PATH_HOME, home.to_string_lossy());
        props
    }

    #[test]
    fn test_flatten_nested_tables() {
        let toml_str = r#"
[cluster]
name = "prod"
node.name = "node-1"

[path]
home = "/srv/search"

[search]
port = 9001
discovery.seed_hosts = ["10.0.0.1:9001", "10.0.0.2:9001"]
"#;
        let props = Props::from_toml_str(toml_str).unwrap();
        assert_eq!(props.value("cluster.name"), Some("prod"));
        assert_eq!(props.value("cluster.node.name"), Some("node-1"));
        assert_eq!(props.value("path.home"), Some("/srv/search"));
        assert_eq!(props.value("search.port"), Some("9001"));
        assert_eq!(
            props.list(constants::DISCOVERY_SEED_HOSTS),
            vec!["10.0.0.1:9001".to_string(), "10.0.0.2:9001".to_string()]
        );
    }

    #[test]
    fn test_invalid_toml() {
        let err = Props::from_toml_str("cluster = [").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("node.toml");
        std::fs::write(&file, "cluster.name = \"fromfile\"\n").unwrap();
        let props = Props::load_from(&file).unwrap();
        assert_eq!(props.value(constants::CLUSTER_NAME), Some("fromfile"));
    }

    #[test]
    fn test_build_valid() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfigBuilder::build(&valid_props(dir.path())).unwrap();

        assert_eq!(config.cluster_name, "unitTest");
        assert_eq!(config.node_name, "test");
        assert_eq!(config.host, constants::DEFAULT_HOST);
        assert_eq!(config.port, None);
        assert!(config.data_path.starts_with(&config.home_path));
        assert!(config.logs_path.starts_with(&config.home_path));
        assert_eq!(config.discovery, DiscoverySettings::default());
    }

    #[test]
    fn test_build_explicit_port() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props.set(constants::SEARCH_PORT, "9123");
        let config = NodeConfigBuilder::build(&props).unwrap();
        assert_eq!(config.port, Some(9123));
        assert_eq!(config.address().unwrap(), "127.0.0.1:9123");
    }

    #[test]
    fn test_build_port_zero_means_allocate() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props.set(constants::SEARCH_PORT, "0");
        assert_eq!(NodeConfigBuilder::build(&props).unwrap().port, None);
    }

    #[test]
    fn test_build_port_out_of_range() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props.set(constants::SEARCH_PORT, "70000");
        let err = NodeConfigBuilder::build(&props).unwrap_err().to_string();
        assert!(err.contains("search.port"));
    }

    #[test]
    fn test_build_missing_home() {
        let mut props = Props::new();
        props
            .set(constants::CLUSTER_NAME, "unitTest")
            .set(constants::CLUSTER_NODE_NAME, "test");
        let err = NodeConfigBuilder::build(&props).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains(constants::PATH_HOME));
    }

    #[test]
    fn test_build_reports_all_missing() {
        let err = NodeConfigBuilder::build(&Props::new())
            .unwrap_err()
            .to_string();
        assert!(err.contains(constants::CLUSTER_NAME));
        assert!(err.contains(constants::CLUSTER_NODE_NAME));
        assert!(err.contains(constants::PATH_HOME));
    }

    #[test]
    fn test_build_blank_values_are_missing() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props.set(constants::CLUSTER_NAME, "   ");
        let err = NodeConfigBuilder::build(&props).unwrap_err().to_string();
        assert!(err.contains(constants::CLUSTER_NAME));
    }

    #[test]
    fn test_build_home_not_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let err = NodeConfigBuilder::build(&valid_props(&file))
            .unwrap_err()
            .to_string();
        assert!(err.contains("not a directory"));
    }

    #[test]
    fn test_build_discovery() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props
            .set(constants::DISCOVERY_SEED_HOSTS, "a:1, b:2,,")
            .set(constants::DISCOVERY_MINIMUM_MASTER_NODES, "2")
            .set(constants::DISCOVERY_PING_TIMEOUT_MS, "50");
        let config = NodeConfigBuilder::build(&props).unwrap();
        assert_eq!(config.discovery.seed_hosts, vec!["a:1", "b:2"]);
        assert_eq!(config.discovery.minimum_master_nodes, 2);
        assert_eq!(config.discovery.ping_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_build_zero_master_nodes() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props.set(constants::DISCOVERY_MINIMUM_MASTER_NODES, "0");
        assert!(NodeConfigBuilder::build(&props).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let dir = TempDir::new().unwrap();
        let mut props = valid_props(dir.path());
        props
            .set(constants::SEARCH_PORT, "80")
            .set(constants::DISCOVERY_MINIMUM_MASTER_NODES, "3");
        let config = NodeConfigBuilder::build(&props).unwrap();
        let result = NodeConfigBuilder::validate(&config);
        assert!(result.has_warnings());
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_validate_clean() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfigBuilder::build(&valid_props(dir.path())).unwrap();
        assert!(!NodeConfigBuilder::validate(&config).has_warnings());
    }

    #[test]
    fn test_supervisor_settings_defaults() {
        let settings = SupervisorSettings::from_props(&Props::new()).unwrap();
        assert_eq!(settings, SupervisorSettings::default());
        assert_eq!(settings.backend, BackendKind::Embedded);
    }

    #[test]
    fn test_supervisor_settings_custom() {
        let props: Props = [
            (constants::READY_TIMEOUT_MS, "1500"),
            (constants::STOP_TIMEOUT_MS, "200"),
            (constants::PROBE_INTERVAL_MS, "20"),
            (constants::BIND_RETRIES, "5"),
            (constants::BACKEND, "Remote"),
        ]
        .into_iter()
        .collect();
        let settings = SupervisorSettings::from_props(&props).unwrap();
        assert_eq!(settings.ready_timeout, Duration::from_millis(1500));
        assert_eq!(settings.stop_timeout, Duration::from_millis(200));
        assert_eq!(settings.probe_interval, Duration::from_millis(20));
        assert_eq!(settings.bind_retries, 5);
        assert_eq!(settings.backend, BackendKind::Remote);
    }

    #[test]
    fn test_supervisor_settings_rejects_zero_interval() {
        let props: Props = [(constants::PROBE_INTERVAL_MS, "0")].into_iter().collect();
        assert!(SupervisorSettings::from_props(&props).is_err());
    }

    #[test]
    fn test_unknown_backend() {
        assert!("docker".parse::<BackendKind>().is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_ports_round_trip(port in 1u16..=u16::MAX) {
            let dir = TempDir::new().unwrap();
            let mut props = valid_props(dir.path());
            props.set(constants::SEARCH_PORT, port.to_string());
            let config = NodeConfigBuilder::build(&props).unwrap();
            prop_assert_eq!(config.port, Some(port));
        }

        #[test]
        fn prop_flatten_keeps_dotted_keys(key in "[a-z]{1,8}", value in "[a-zA-Z0-9 ]{0,16}") {
            let toml_str = format!("[outer]\n{key} = \"{value}\"\n");
            let props = Props::from_toml_str(&toml_str).unwrap();
            let full_key = format!("outer.{key}");
            prop_assert_eq!(props.value(&full_key), Some(value.as_str()));
        }
    }
}
