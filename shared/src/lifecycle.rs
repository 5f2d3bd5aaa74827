//! Activity lifecycle state machine
//!
//! Defines the legal transitions of an activity from creation to stop, and
//! the restart path back into `Running`.

use std::fmt;

/// Lifecycle of one activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    StopRequested,
    Stopped,
}

/// Events that move an activity between lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The init entry point returned success
    InitSucceeded,
    /// The loop was spawned
    StartSucceeded,
    /// A stop request was recorded for the running loop
    StopRequested,
    /// The loop returned
    LoopExited,
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// The state changed
    Changed(LifecycleState),
    /// The event is accepted but leaves the state as it was
    Unchanged(LifecycleState),
    /// The event is not legal from the current state
    Invalid {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

impl LifecycleState {
    /// Whether init has completed at some point
    pub fn is_initialized(self) -> bool {
        self != LifecycleState::Uninitialized
    }

    /// Whether a loop is (or is still winding down) in flight
    pub fn is_active(self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::StopRequested)
    }

    /// Apply an event and report the outcome
    pub fn apply(self, event: LifecycleEvent) -> TransitionResult {
        use LifecycleEvent as E;
        use LifecycleState as S;

        match (self, event) {
            (S::Uninitialized, E::InitSucceeded) => TransitionResult::Changed(S::Initialized),

            // Init is idempotent once it has succeeded
            (S::Initialized | S::Running | S::StopRequested | S::Stopped, E::InitSucceeded) => {
                TransitionResult::Unchanged(self)
            }

            (S::Initialized | S::Stopped, E::StartSucceeded) => TransitionResult::Changed(S::Running),

            (S::Running, E::StopRequested) => TransitionResult::Changed(S::StopRequested),
            (S::StopRequested, E::StopRequested) => TransitionResult::Unchanged(self),

            // A loop may also leave on the global exit flag without a request
            (S::Running | S::StopRequested, E::LoopExited) => TransitionResult::Changed(S::Stopped),

            _ => TransitionResult::Invalid { from: self, event },
        }
    }

    /// Apply an event, returning the resulting state when it is legal
    pub fn next(self, event: LifecycleEvent) -> Option<LifecycleState> {
        match self.apply(event) {
            TransitionResult::Changed(state) | TransitionResult::Unchanged(state) => Some(state),
            TransitionResult::Invalid { .. } => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::StopRequested => "stop-requested",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let state = LifecycleState::default();
        let state = state.next(LifecycleEvent::InitSucceeded).unwrap();
        assert_eq!(state, LifecycleState::Initialized);

        let state = state.next(LifecycleEvent::StartSucceeded).unwrap();
        assert_eq!(state, LifecycleState::Running);

        let state = state.next(LifecycleEvent::StopRequested).unwrap();
        assert_eq!(state, LifecycleState::StopRequested);

        let state = state.next(LifecycleEvent::LoopExited).unwrap();
        assert_eq!(state, LifecycleState::Stopped);
    }

    #[test]
    fn test_restart_from_stopped() {
        assert_eq!(
            LifecycleState::Stopped.apply(LifecycleEvent::StartSucceeded),
            TransitionResult::Changed(LifecycleState::Running)
        );
    }

    #[test]
    fn test_reinit_is_noop() {
        assert_eq!(
            LifecycleState::Stopped.apply(LifecycleEvent::InitSucceeded),
            TransitionResult::Unchanged(LifecycleState::Stopped)
        );
        assert_eq!(
            LifecycleState::Running.apply(LifecycleEvent::InitSucceeded),
            TransitionResult::Unchanged(LifecycleState::Running)
        );
    }

    #[test]
    fn test_start_requires_init() {
        assert!(matches!(
            LifecycleState::Uninitialized.apply(LifecycleEvent::StartSucceeded),
            TransitionResult::Invalid { .. }
        ));
    }

    #[test]
    fn test_loop_exit_without_request() {
        assert_eq!(
            LifecycleState::Running.next(LifecycleEvent::LoopExited),
            Some(LifecycleState::Stopped)
        );
    }

    #[test]
    fn test_stop_without_running_loop_is_invalid() {
        assert_eq!(LifecycleState::Initialized.next(LifecycleEvent::StopRequested), None);
    }
}
