//! Lifecycle states of a supervised node and the legal moves between them.

use std::fmt;

/// Where a supervisor is in its single start/stop cycle.
///
/// Moves only forward through `CREATED → STARTING → READY → STOPPING →
/// STOPPED`, except that FAILED can interrupt STARTING or READY. CREATED and
/// FAILED go straight to STOPPED when nothing is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

impl LifecycleState {
    /// All states, for exhaustive checks.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Starting,
        Self::Ready,
        Self::Stopping,
        Self::Stopped,
        Self::Failed,
    ];

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::{Created, Failed, Ready, Starting, Stopped, Stopping};
        matches!(
            (self, next),
            (Created, Starting | Stopped)
                | (Starting, Ready | Failed)
                | (Ready, Stopping | Failed)
                | (Failed, Stopping | Stopped)
                | (Stopping, Stopped)
        )
    }

    /// STOPPED admits no further transition.
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Starting => "STARTING",
            Self::Ready => "READY",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rank(state: LifecycleState) -> u8 {
        match state {
            LifecycleState::Created => 0,
            LifecycleState::Starting => 1,
            LifecycleState::Ready => 2,
            LifecycleState::Failed => 3,
            LifecycleState::Stopping => 4,
            LifecycleState::Stopped => 5,
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        for next in LifecycleState::ALL {
            assert!(!LifecycleState::Stopped.can_transition_to(next));
        }
        assert!(LifecycleState::Stopped.is_terminal());
    }

    #[test]
    fn test_failed_reachable_only_from_starting_or_ready() {
        for from in LifecycleState::ALL {
            let expected = matches!(from, LifecycleState::Starting | LifecycleState::Ready);
            assert_eq!(from.can_transition_to(LifecycleState::Failed), expected, "{from}");
        }
    }

    #[test]
    fn test_no_self_loops() {
        for state in LifecycleState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::Ready.to_string(), "READY");
        assert_eq!(LifecycleState::Failed.to_string(), "FAILED");
    }

    proptest! {
        /// Any walk along legal edges only moves forward and ends stuck at
        /// STOPPED once reached.
        #[test]
        fn prop_legal_walks_are_monotonic(choices in proptest::collection::vec(0usize..6, 0..32)) {
            let mut state = LifecycleState::Created;
            for choice in choices {
                let next = LifecycleState::ALL[choice];
                if state.can_transition_to(next) {
                    prop_assert!(rank(next) > rank(state));
                    state = next;
                }
            }
        }
    }
}
