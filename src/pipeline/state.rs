//! Per-phase state machine.

use crate::errors::PipelineError;
use serde::Serialize;
use tracing::trace;

/// Where a single phase is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Idle,
    BuildingPrompt,
    AwaitingAgent,
    Validating,
    Merging,
    Recording,
    Failed,
}

impl std::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhaseState::Idle => "idle",
            PhaseState::BuildingPrompt => "building_prompt",
            PhaseState::AwaitingAgent => "awaiting_agent",
            PhaseState::Validating => "validating",
            PhaseState::Merging => "merging",
            PhaseState::Recording => "recording",
            PhaseState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl PhaseState {
    /// Check whether `from -> to` is an edge of the phase graph.
    pub fn is_valid_transition(from: PhaseState, to: PhaseState) -> bool {
        matches!(
            (from, to),
            (PhaseState::Idle, PhaseState::BuildingPrompt)
                | (PhaseState::BuildingPrompt, PhaseState::AwaitingAgent)
                | (PhaseState::AwaitingAgent, PhaseState::Validating)
                | (PhaseState::AwaitingAgent, PhaseState::Failed)
                | (PhaseState::Validating, PhaseState::Merging)
                | (PhaseState::Validating, PhaseState::BuildingPrompt)
                | (PhaseState::Validating, PhaseState::Failed)
                | (PhaseState::Merging, PhaseState::Recording)
                | (PhaseState::Merging, PhaseState::Failed)
                | (PhaseState::Recording, PhaseState::Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseState::Failed)
    }
}

/// Tracks one phase's state and its attempt count.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: String,
    state: PhaseState,
    attempts: u32,
}

impl PhaseMachine {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            state: PhaseState::Idle,
            attempts: 0,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Agent calls started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    /// Move to `to`, failing with `InvalidTransition` if the edge does not exist.
    pub fn advance(&mut self, to: PhaseState) -> Result<(), PipelineError> {
        if !PhaseState::is_valid_transition(self.state, to) {
            return Err(PipelineError::InvalidTransition {
                phase: self.phase.clone(),
                from: self.state,
                to,
            });
        }
        trace!(phase = %self.phase, from = %self.state, to = %to, "Phase transition");
        if to == PhaseState::AwaitingAgent {
            self.attempts += 1;
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_returns_to_idle() {
        let mut machine = PhaseMachine::new("hero");
        for state in [
            PhaseState::BuildingPrompt,
            PhaseState::AwaitingAgent,
            PhaseState::Validating,
            PhaseState::Merging,
            PhaseState::Recording,
            PhaseState::Idle,
        ] {
            machine.advance(state).unwrap();
        }
        assert_eq!(machine.state(), PhaseState::Idle);
        assert_eq!(machine.attempts(), 1);
    }

    #[test]
    fn test_retry_loop_counts_attempts() {
        let mut machine = PhaseMachine::new("hero");
        machine.advance(PhaseState::BuildingPrompt).unwrap();
        machine.advance(PhaseState::AwaitingAgent).unwrap();
        machine.advance(PhaseState::Validating).unwrap();
        machine.advance(PhaseState::BuildingPrompt).unwrap();
        machine.advance(PhaseState::AwaitingAgent).unwrap();
        machine.advance(PhaseState::Validating).unwrap();
        machine.advance(PhaseState::Failed).unwrap();
        assert_eq!(machine.attempts(), 2);
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_invalid_transition_is_reported() {
        let mut machine = PhaseMachine::new("pricing");
        let err = machine.advance(PhaseState::Merging).unwrap_err();
        match err {
            PipelineError::InvalidTransition { phase, from, to } => {
                assert_eq!(phase, "pricing");
                assert_eq!(from, PhaseState::Idle);
                assert_eq!(to, PhaseState::Merging);
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }
        assert_eq!(machine.state(), PhaseState::Idle);
    }

    #[test]
    fn test_failed_is_a_sink() {
        for to in [
            PhaseState::Idle,
            PhaseState::BuildingPrompt,
            PhaseState::AwaitingAgent,
            PhaseState::Validating,
            PhaseState::Merging,
            PhaseState::Recording,
        ] {
            assert!(!PhaseState::is_valid_transition(PhaseState::Failed, to));
        }
        assert!(!PhaseState::is_valid_transition(PhaseState::BuildingPrompt, PhaseState::Failed));
    }
}
