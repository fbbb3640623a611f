//! Controller lifecycle state.

use serde::Serialize;

use super::run_config::RunModeKind;

/// Lifecycle state of the acquisition controller.
///
/// ```text
/// Idle ──start──> Running(mode) ──finish──> Idle
///                   │     ▲
///              pause│     │resume
///                   ▼     │
///                 Paused(mode)
///
/// Running / Paused ──abort──> Aborting ──worker exit──> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    /// No run active.
    Idle,
    /// A worker is acquiring.
    Running(RunModeKind),
    /// A worker is holding at an iteration boundary.
    Paused(RunModeKind),
    /// Cancellation requested; the worker is stopping instruments.
    Aborting,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "Idle"),
            ControllerState::Running(mode) => write!(f, "Running ({mode})"),
            ControllerState::Paused(mode) => write!(f, "Paused ({mode})"),
            ControllerState::Aborting => write!(f, "Aborting"),
        }
    }
}

impl ControllerState {
    /// Check if a new run may be started.
    pub fn can_begin(&self) -> bool {
        matches!(self, ControllerState::Idle)
    }

    /// Check if the state allows pausing.
    pub fn can_pause(&self) -> bool {
        matches!(self, ControllerState::Running(_))
    }

    /// Mode of the active run, if any.
    pub fn mode(&self) -> Option<RunModeKind> {
        match self {
            ControllerState::Running(mode) | ControllerState::Paused(mode) => Some(*mode),
            ControllerState::Idle | ControllerState::Aborting => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions() {
        let idle = ControllerState::Idle;
        assert!(idle.can_begin());
        assert!(!idle.can_pause());

        let running = ControllerState::Running(RunModeKind::Continuous);
        assert!(!running.can_begin());
        assert!(running.can_pause());

        let paused = ControllerState::Paused(RunModeKind::Continuous);
        assert!(!paused.can_begin());
        assert!(!paused.can_pause());
        assert_eq!(paused.mode(), Some(RunModeKind::Continuous));

        assert!(!ControllerState::Aborting.can_begin());
        assert_eq!(ControllerState::Aborting.mode(), None);
    }

    #[test]
    fn display() {
        assert_eq!(
            ControllerState::Running(RunModeKind::TemperatureSequence).to_string(),
            "Running (temperature sequence)"
        );
        assert_eq!(ControllerState::Idle.to_string(), "Idle");
    }
}
