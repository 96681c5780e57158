//! Readiness probing for freshly started nodes.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::constants;
use crate::node::NodeInstance;

/// Polls a node's health on a fixed cadence until it reports GREEN.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new(constants::DEFAULT_PROBE_INTERVAL)
    }
}

impl ReadinessProbe {
    /// Probe polling every `interval` (clamped to at least 1ms).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `node` reports GREEN, for at most `timeout`.
    ///
    /// Returns `false` when the timeout elapses first. Unavailable answers
    /// count as "not ready yet"; a poll still in flight when the timeout hits
    /// is abandoned.
    pub async fn await_ready(&self, node: &dyn NodeInstance, timeout: Duration) -> bool {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll = async {
            let mut attempts = 0u32;
            loop {
                ticker.tick().await;
                attempts += 1;
                match node.health_status().await {
                    Ok(snapshot) if snapshot.is_green() => return attempts,
                    Ok(snapshot) => {
                        debug!(
                            node = %node.node_name(),
                            status = %snapshot.status,
                            nodes = snapshot.node_count,
                            "Node not ready yet"
                        );
                    },
                    Err(e) if e.is_transient() => {
                        debug!(node = %node.node_name(), error = %e, "Node not queryable yet");
                    },
                    Err(e) => {
                        debug!(node = %node.node_name(), error = %e, "Health poll failed");
                    },
                }
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(attempts) => {
                info!(
                    node = %node.node_name(),
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Node is ready"
                );
                true
            },
            Err(_) => {
                info!(
                    node = %node.node_name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Node not ready before timeout"
                );
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ForcedShutdownWarning, Result};
    use crate::node::{ClusterStatus, HealthSnapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Node answering from a script: unavailable, then the given statuses.
    struct ScriptedNode {
        unavailable_polls: u32,
        green_after: Option<u32>,
        polls: AtomicU32,
        poll_delay: Duration,
    }

    impl ScriptedNode {
        fn new(unavailable_polls: u32, green_after: Option<u32>) -> Self {
            Self {
                unavailable_polls,
                green_after,
                polls: AtomicU32::new(0),
                poll_delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl NodeInstance for ScriptedNode {
        fn node_name(&self) -> &str {
            "scripted"
        }

        fn address(&self) -> String {
            "127.0.0.1:0".to_string()
        }

        async fn health_status(&self) -> Result<HealthSnapshot> {
            if !self.poll_delay.is_zero() {
                tokio::time::sleep(self.poll_delay).await;
            }
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.unavailable_polls {
                return Err(Error::unavailable("starting"));
            }
            let status = match self.green_after {
                Some(g) if n >= g => ClusterStatus::Green,
                _ => ClusterStatus::Yellow,
            };
            Ok(HealthSnapshot {
                status,
                node_count: 1,
            })
        }

        fn has_terminated(&self) -> bool {
            false
        }

        async fn stop(&mut self, _ceiling: Duration) -> Option<ForcedShutdownWarning> {
            None
        }
    }

    #[tokio::test]
    async fn test_ready_after_transient_unavailable() {
        let node = ScriptedNode::new(3, Some(5));
        let probe = ReadinessProbe::new(Duration::from_millis(5));
        assert!(probe.await_ready(&node, Duration::from_secs(5)).await);
        assert_eq!(node.polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_never_green_times_out() {
        let node = ScriptedNode::new(0, None);
        let probe = ReadinessProbe::new(Duration::from_millis(10));
        let started = std::time::Instant::now();
        assert!(!probe.await_ready(&node, Duration::from_millis(200)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_slow_poll_does_not_exceed_timeout() {
        let mut node = ScriptedNode::new(0, None);
        node.poll_delay = Duration::from_secs(10);
        let probe = ReadinessProbe::new(Duration::from_millis(10));
        let started = std::time::Instant::now();
        assert!(!probe.await_ready(&node, Duration::from_millis(100)).await);
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_zero_timeout() {
        let node = ScriptedNode::new(0, Some(1));
        let probe = ReadinessProbe::default();
        // Either outcome is allowed; it must simply return
        let _ = probe.await_ready(&node, Duration::ZERO).await;
    }

    #[test]
    fn test_interval_clamped() {
        assert_eq!(
            ReadinessProbe::new(Duration::ZERO).interval(),
            Duration::from_millis(1)
        );
    }
}
