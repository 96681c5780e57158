//! Search node lifecycle supervision.
//!
//! [`LifecycleSupervisor`] drives one node through a single
//! `start → ready → stop` cycle. All destructive work happens under one async
//! mutex, so a `stop()` issued while `start()` is in flight waits for the start
//! to settle (READY or FAILED) before tearing anything down, and concurrent
//! stops observe exactly one teardown.
//!
//! The current [`LifecycleState`] lives in a `watch` channel next to the mutex:
//! `state()` and `is_ready()` never block, and any number of callers can
//! `await_stop()` and are released together.
//!
//! `start()` includes the bounded readiness wait. A successful return means the
//! node reported GREEN and `is_ready()` is true; a node that does not become
//! ready in time is torn down and reported as a start error.

mod state;


pub use state::LifecycleState;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{
    BackendKind, NodeConfigBuilder, NodeConfiguration, Props, SupervisorSettings,
};
use crate::constants;
use crate::error::{Error, ForcedShutdownWarning, Result};
use crate::index::{IndexDefinition, IndexRegistry};
use crate::net::PortAllocator;
use crate::node::{EmbeddedNode, HealthSnapshot, NodeBackend, NodeInstance, RemoteNode};
use crate::probe::ReadinessProbe;
use crate::reliability::retry::{RetryPolicy, retry_async};

/// What a call to [`LifecycleSupervisor::stop`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The node shut down within its ceiling.
    Graceful,
    /// The node had to be forced down.
    Forced(ForcedShutdownWarning),
    /// Nothing was running; the supervisor went straight to STOPPED.
    NotStarted,
    /// Another stop already completed the teardown.
    AlreadyStopped,
}

impl StopOutcome {
    pub fn warning(&self) -> Option<&ForcedShutdownWarning> {
        match self {
            Self::Forced(warning) => Some(warning),
            _ => None,
        }
    }
}

/// Resources held between `start()` and `stop()`.
#[derive(Default)]
struct Slot {
    config: Option<NodeConfiguration>,
    indices: Vec<IndexDefinition>,
    node: Option<Box<dyn NodeInstance>>,
}

#[derive(Debug, Clone)]
struct Endpoint {
    address: String,
    port: Option<u16>,
}

/// Owns one search node's start/stop lifecycle.
pub struct LifecycleSupervisor {
    props: Props,
    settings: SupervisorSettings,
    backend: Arc<dyn NodeBackend>,
    probe: ReadinessProbe,
    state: watch::Sender<LifecycleState>,
    slot: Mutex<Slot>,
    endpoint: RwLock<Option<Endpoint>>,
    last_warning: RwLock<Option<ForcedShutdownWarning>>,
}

impl LifecycleSupervisor {
    /// Supervisor for the backend selected by `search.backend`.
    ///
    /// Node properties are only validated by `start()`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the supervisor settings themselves
    /// (timeouts, interval, backend name) do not parse.
    pub fn new(props: Props) -> Result<Self> {
        let settings = SupervisorSettings::from_props(&props)?;
        let backend: Arc<dyn NodeBackend> = match settings.backend {
            BackendKind::Embedded => Arc::new(EmbeddedNode::new()),
            BackendKind::Remote => Arc::new(RemoteNode::new()),
        };
        Ok(Self::with_backend(props, settings, backend))
    }

    /// Supervisor driving an explicit backend.
    pub fn with_backend(
        props: Props,
        settings: SupervisorSettings,
        backend: Arc<dyn NodeBackend>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            probe: ReadinessProbe::new(settings.probe_interval),
            props,
            settings,
            backend,
            state,
            slot: Mutex::new(Slot::default()),
            endpoint: RwLock::new(None),
            last_warning: RwLock::new(None),
        }
    }

    /// Register index schemas to create when the node starts.
    #[must_use]
    pub fn with_indices(mut self, registry: IndexRegistry) -> Self {
        self.slot.get_mut().indices = registry.into_definitions();
        self
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current lifecycle state. Never blocks.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// True once `start()` has succeeded and until the node stops or fails.
    pub fn is_ready(&self) -> bool {
        self.state() == LifecycleState::Ready
    }

    /// `host:port` of the running node.
    pub fn address(&self) -> Option<String> {
        self.endpoint.read().as_ref().map(|e| e.address.clone())
    }

    /// Port the node is bound to, explicit or allocated.
    pub fn port(&self) -> Option<u16> {
        self.endpoint.read().as_ref().and_then(|e| e.port)
    }

    /// Configuration the node was started with.
    pub async fn configuration(&self) -> Option<NodeConfiguration> {
        self.slot.lock().await.config.clone()
    }

    /// Most recent forced shutdown, if any.
    pub fn last_warning(&self) -> Option<ForcedShutdownWarning> {
        self.last_warning.read().clone()
    }

    /// Build the configuration, launch the node and wait for it to be ready.
    ///
    /// Calling `start()` on a READY supervisor is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for missing or invalid node properties
    /// - [`Error::Start`] / [`Error::PortInUse`] when the node cannot be
    ///   launched or does not become ready within `search.ready_timeout_ms`
    /// - [`Error::AlreadyStopped`] once the supervisor is stopping or stopped
    /// - [`Error::InvalidState`] after a failed start
    ///
    /// Every failure leaves the supervisor FAILED with nothing bound.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;

        match self.state() {
            LifecycleState::Created => {},
            LifecycleState::Ready => return Ok(()),
            LifecycleState::Stopping | LifecycleState::Stopped => {
                return Err(Error::AlreadyStopped);
            },
            state => {
                return Err(Error::InvalidState {
                    operation: "start",
                    state,
                });
            },
        }

        self.transition(LifecycleState::Starting);
        let guard = StartGuard {
            supervisor: self,
            armed: true,
        };
        let result = self.launch(&mut slot).await;
        guard.disarm();

        match result {
            Ok(()) => {
                self.transition(LifecycleState::Ready);
                Ok(())
            },
            Err(e) => {
                error!(backend = self.backend.name(), error = %e, "Search node failed to start");
                self.transition(LifecycleState::Failed);
                Err(e)
            },
        }
    }

    async fn launch(&self, slot: &mut Slot) -> Result<()> {
        let config = NodeConfigBuilder::build(&self.props)?;
        for warning in NodeConfigBuilder::validate(&config).warnings {
            warn!("{warning}");
        }

        let (mut node, config) = match config.port {
            Some(_) => {
                let node = self.backend.start(&config, &slot.indices).await?;
                (node, config)
            },
            None if !self.backend.binds_local_port() => {
                return Err(Error::configuration(format!(
                    "{} is required by the {} backend",
                    constants::SEARCH_PORT,
                    self.backend.name()
                )));
            },
            None => self.launch_on_free_port(&config, &slot.indices).await?,
        };

        info!(
            node = %config.node_name,
            address = %node.address(),
            timeout_ms = self.settings.ready_timeout.as_millis() as u64,
            "Waiting for search node to be ready"
        );
        if !self
            .probe
            .await_ready(node.as_ref(), self.settings.ready_timeout)
            .await
        {
            if let Some(warning) = node.stop(self.settings.stop_timeout).await {
                self.record_warning(&warning);
            }
            return Err(Error::start(format!(
                "node '{}' not ready within {}ms",
                config.node_name,
                self.settings.ready_timeout.as_millis()
            )));
        }

        *self.endpoint.write() = Some(Endpoint {
            address: node.address(),
            port: config.port,
        });
        slot.config = Some(config);
        slot.node = Some(node);
        Ok(())
    }

    /// Allocate a port on the node's bind interface and start on it,
    /// re-allocating when another process grabs the port first.
    async fn launch_on_free_port(
        &self,
        config: &NodeConfiguration,
        indices: &[IndexDefinition],
    ) -> Result<(Box<dyn NodeInstance>, NodeConfiguration)> {
        let allocator = PortAllocator::for_host(&config.host);
        let backend = self.backend.as_ref();

        retry_async(
            RetryPolicy::bind(self.settings.bind_retries),
            move || async move {
                let config = config.with_port(allocator.allocate()?);
                let node = backend.start(&config, indices).await?;
                Ok::<_, Error>((node, config))
            },
            Error::is_port_conflict,
        )
        .await
    }

    /// Stop the node and release everything it holds.
    ///
    /// Safe to call any number of times, from any task, in any state. A stop
    /// issued during `start()` waits for the start to settle first. Forced
    /// shutdowns are reported in the outcome, never as errors.
    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.slot.lock().await;

        match self.state() {
            LifecycleState::Stopped => return StopOutcome::AlreadyStopped,
            LifecycleState::Created => {
                self.transition(LifecycleState::Stopped);
                return StopOutcome::NotStarted;
            },
            LifecycleState::Failed if slot.node.is_none() => {
                self.transition(LifecycleState::Stopped);
                return StopOutcome::NotStarted;
            },
            _ => {},
        }

        self.transition(LifecycleState::Stopping);
        let outcome = match slot.node.take() {
            Some(mut node) => match node.stop(self.settings.stop_timeout).await {
                None => StopOutcome::Graceful,
                Some(warning) => {
                    self.record_warning(&warning);
                    StopOutcome::Forced(warning)
                },
            },
            None => StopOutcome::Graceful,
        };

        self.endpoint.write().take();
        self.transition(LifecycleState::Stopped);
        outcome
    }

    /// Wait until the supervisor reaches STOPPED.
    pub async fn await_stop(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }

    /// [`await_stop`](Self::await_stop) with a ceiling. Returns `false` on
    /// timeout.
    pub async fn await_stop_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_stop()).await.is_ok()
    }

    /// Current health of the running node.
    ///
    /// A READY node whose server has died moves the supervisor to FAILED.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] when no node is running, a start or stop
    /// is in progress, or the node cannot answer.
    pub async fn health(&self) -> Result<HealthSnapshot> {
        let slot = self
            .slot
            .try_lock()
            .map_err(|_| Error::unavailable(format!("node is {}", self.state())))?;
        let Some(node) = slot.node.as_ref() else {
            return Err(Error::unavailable(format!("node is {}", self.state())));
        };

        if self.state() == LifecycleState::Ready && node.has_terminated() {
            error!(node = %node.node_name(), "Search node terminated unexpectedly");
            self.transition(LifecycleState::Failed);
            return Err(Error::unavailable("node terminated unexpectedly"));
        }

        node.health_status().await
    }

    /// Stop the node when `signal` completes.
    ///
    /// The hosting process registers its shutdown trigger here, for example
    /// `tokio::signal::ctrl_c()`. Dropping the returned handle does not cancel
    /// the hook.
    pub fn stop_on<F>(self: &Arc<Self>, signal: F) -> JoinHandle<StopOutcome>
    where
        F: Future + Send + 'static,
    {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            signal.await;
            info!("Shutdown requested, stopping search node");
            supervisor.stop().await
        })
    }

    fn record_warning(&self, warning: &ForcedShutdownWarning) {
        warn!(
            node = %warning.node_name,
            waited_ms = warning.waited.as_millis() as u64,
            "{warning}"
        );
        *self.last_warning.write() = Some(warning.clone());
    }

    /// Move to `next` if the state machine allows it.
    fn transition(&self, next: LifecycleState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                info!(from = %from, to = %next, "Search node state changed");
                true
            },
            None => {
                debug!(to = %next, state = %self.state(), "Ignoring illegal state transition");
                false
            },
        }
    }
}

/// Fails the supervisor if a `start()` future is dropped mid-flight.
///
/// The half-started node is a local of the dropped future and releases its
/// resources on drop.
struct StartGuard<'a> {
    supervisor: &'a LifecycleSupervisor,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Search node start was cancelled");
            self.supervisor.transition(LifecycleState::Failed);
        }
    }
}
