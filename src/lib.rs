//! nodewarden - lifecycle supervision for embedded clustered search nodes.
//!
//! A [`LifecycleSupervisor`] builds a [`NodeConfiguration`] from [`Props`],
//! allocates a port when none is configured, starts the node through a
//! [`NodeBackend`], waits (bounded) until the cluster reports GREEN and tears
//! everything down deterministically on [`LifecycleSupervisor::stop`].
//!
//! ```rust,ignore
//! use nodewarden::{LifecycleSupervisor, config::Props, constants};
//!
//! let mut props = Props::new();
//! props
//!     .set(constants::CLUSTER_NAME, "unitTest")
//!     .set(constants::CLUSTER_NODE_NAME, "node-1")
//!     .set(constants::PATH_HOME, "/var/lib/nodewarden");
//!
//! let supervisor = LifecycleSupervisor::new(props)?;
//! supervisor.start().await?;
//! assert!(supervisor.is_ready());
//! supervisor.stop().await;
//! supervisor.await_stop().await;
//! ```
//!
//! ## Module Structure
//!
//! - [`config`]: Properties, node configuration and supervisor settings
//! - [`net`]: Free port allocation
//! - [`node`]: Backends, cluster state, HTTP surface and health client
//! - [`probe`]: Readiness polling
//! - [`supervisor`]: Lifecycle state machine
//! - [`index`]: Index schema registry
//! - [`db`], [`compute`]: Collaborators of hosted services

#![deny(unsafe_code)]

pub mod compute;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod index;
pub mod net;
pub mod node;
pub mod paths;
pub mod probe;
pub mod reliability;
pub mod supervisor;

pub use config::{NodeConfigBuilder, NodeConfiguration, Props, SupervisorSettings};
pub use error::{Error, ForcedShutdownWarning, Result};
pub use index::{IndexDefinition, IndexRegistry};
pub use net::PortAllocator;
pub use node::{ClusterStatus, HealthClient, HealthSnapshot, NodeBackend, NodeInstance};
pub use probe::ReadinessProbe;
pub use supervisor::{LifecycleState, LifecycleSupervisor, StopOutcome};
