//! Run phases: Which effect a run is currently waiting on.

use serde::{Deserialize, Serialize};

/// Phase of a run.
///
/// Per step: Idle → Delaying → Executing → Streaming | Atomic → Idle.
/// A run ends in Completed or Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Delaying,
    Executing,
    Streaming,
    Atomic,
    Completed,
    Cancelled,
}

impl PlaybackPhase {
    /// Check if a transition from `self` to `target` is valid within one run.
    pub fn can_transition_to(&self, target: PlaybackPhase) -> bool {
        use PlaybackPhase::*;
        if target == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Idle, Delaying)
                | (Idle, Executing)
                | (Idle, Completed)
                | (Delaying, Executing)
                | (Executing, Streaming)
                | (Executing, Atomic)
                | (Streaming, Idle)
                | (Atomic, Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for PlaybackPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Delaying => "delaying",
            Self::Executing => "executing",
            Self::Streaming => "streaming",
            Self::Atomic => "atomic",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Observable status of the latest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunStatus {
    /// Generation of the run this status describes (0 before any run).
    pub generation: u64,
    pub phase: PlaybackPhase,
    /// Index of the step being processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_step_cycle_is_valid() {
        use PlaybackPhase::*;
        let cycle = [Idle, Delaying, Executing, Streaming, Idle, Executing, Atomic, Idle, Completed];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn invalid_transitions() {
        use PlaybackPhase::*;
        assert!(!Idle.can_transition_to(Streaming));
        assert!(!Delaying.can_transition_to(Atomic));
        assert!(!Streaming.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Idle));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn any_live_phase_can_cancel() {
        use PlaybackPhase::*;
        for phase in [Idle, Delaying, Executing, Streaming, Atomic] {
            assert!(phase.can_transition_to(Cancelled), "{phase}");
        }
    }

    #[test]
    fn display_matches_serde() {
        use PlaybackPhase::*;
        for phase in [Idle, Delaying, Executing, Streaming, Atomic, Completed, Cancelled] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(format!("\"{phase}\""), json);
        }
    }
}
