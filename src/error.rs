//! Error types for the supervisor and its collaborators.
//!
//! Fatal conditions are variants of [`Error`]; a stop that had to be forced is
//! not an error and is reported as a [`ForcedShutdownWarning`] value instead.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::supervisor::LifecycleState;

/// Result type for nodewarden operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid startup properties. Raised before any resource
    /// is acquired.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested port is already bound by someone else.
    #[error("failed to start node: port {port} is already in use")]
    PortInUse { port: u16 },

    /// Internal bootstrap failure or readiness timeout.
    #[error("failed to start node: {reason}")]
    Start { reason: String },

    /// The node is not in a queryable state (mid-start, stopping, gone).
    #[error("node unavailable: {reason}")]
    Unavailable { reason: String },

    /// `start()` on a supervisor that has been stopped.
    #[error("supervisor already stopped; create a new one to start again")]
    AlreadyStopped,

    /// Operation not permitted in the current lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Index name collision in the schema registry.
    #[error("Index already exists: {name}")]
    IndexAlreadyExists { name: String },

    /// Keyed lookup miss in a collaborator.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate key on insert in a collaborator.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a start error.
    pub fn start(reason: impl Into<String>) -> Self {
        Self::Start {
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error for an unusable home path.
    pub fn home_path(path: impl Into<PathBuf>, reason: &str) -> Self {
        let path = path.into();
        Self::Configuration(format!("home path {} {reason}", path.display()))
    }

    /// True for conditions the readiness probe absorbs as "not ready yet".
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// True when a bind lost the race for a freshly allocated port.
    pub fn is_port_conflict(&self) -> bool {
        matches!(self, Self::PortInUse { .. })
    }

    /// True for any failure surfaced by `start()` as a start error.
    pub fn is_start_error(&self) -> bool {
        matches!(self, Self::Start { .. } | Self::PortInUse { .. })
    }
}

/// A stop that did not finish within its ceiling and was forced.
///
/// Returned as data and logged; never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedShutdownWarning {
    /// Node that was forced down.
    pub node_name: String,
    /// Ceiling that elapsed.
    pub waited: Duration,
}

impl fmt::Display for ForcedShutdownWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "node '{}' did not stop within {}ms and was forced down",
            self.node_name,
            self.waited.as_millis()
        )
    }
}
