//! Debate phase machine — phases, one-way transitions, kernel position.
//!
//! The machine tracks the kernel's position (phase, round, turn count,
//! current speaker) and enforces the transition graph:
//!
//! ```text
//! INIT → OPENING → ROUNDS → CLOSING → DONE
//! ```
//!
//! Only consecutive pairs are legal; anything else is `InvalidTransition`
//! and fatal. The machine serializes verbatim into the checkpoint.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DebateError, DebateResult};
use crate::state::types::AgentId;

/// Phase of a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Vote 0 and team assignment.
    Init,
    /// Round 1: opening statements.
    Opening,
    /// Rounds 2…1+R: iterative rebuttals.
    Rounds,
    /// Final pseudo-round: closing statements, no new citations.
    Closing,
    /// Terminal.
    Done,
}

impl DebatePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Valid successor phases.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Init => &[Self::Opening],
            Self::Opening => &[Self::Rounds],
            Self::Rounds => &[Self::Closing],
            Self::Closing => &[Self::Done],
            Self::Done => &[],
        }
    }
}

impl fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Opening => write!(f, "opening"),
            Self::Rounds => write!(f, "rounds"),
            Self::Closing => write!(f, "closing"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Tracks phase, round, and turn position; sole authority on progression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseMachine {
    phase: DebatePhase,
    round_number: u32,
    turn_count: u64,
    current_speaker: Option<AgentId>,
    #[serde(default)]
    transitions: Vec<PhaseTransition>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: DebatePhase::Init,
            round_number: 0,
            turn_count: 0,
            current_speaker: None,
            transitions: Vec::new(),
        }
    }

    /// Reconstruct from checkpoint fields.
    pub fn from_position(
        phase: DebatePhase,
        round_number: u32,
        turn_count: u64,
        current_speaker: Option<AgentId>,
    ) -> Self {
        Self {
            phase,
            round_number,
            turn_count,
            current_speaker,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> DebatePhase {
        self.phase
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn current_speaker(&self) -> Option<AgentId> {
        self.current_speaker
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Transition to the next phase; anything but the listed pair is fatal.
    pub fn transition_to(&mut self, to: DebatePhase, reason: &str) -> DebateResult<()> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(DebateError::InvalidTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }

        tracing::info!(from = %self.phase, to = %to, reason, "phase transition");

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Advance the turn counter and set the current speaker.
    pub fn next_turn(&mut self, agent: AgentId) {
        self.turn_count += 1;
        self.current_speaker = Some(agent);
    }

    /// Advance the round counter. Valid within `Rounds`, or once at the
    /// `Init → Opening` boundary to enter round 1.
    pub fn next_round(&mut self) -> DebateResult<u32> {
        match self.phase {
            DebatePhase::Opening if self.round_number == 0 => {
                self.round_number = 1;
                Ok(1)
            }
            DebatePhase::Rounds => {
                self.round_number += 1;
                Ok(self.round_number)
            }
            _ => Err(DebateError::InvalidTransition {
                from: format!("{} round {}", self.phase, self.round_number),
                to: format!("round {}", self.round_number + 1),
            }),
        }
    }

    /// Set the round directly. Used for the closing pseudo-round, whose
    /// number is fixed by the schedule rather than incremented.
    pub fn enter_pseudo_round(&mut self, round: u32) -> DebateResult<()> {
        if self.phase != DebatePhase::Closing {
            return Err(DebateError::InvalidTransition {
                from: format!("{} round {}", self.phase, self.round_number),
                to: format!("pseudo-round {round}"),
            });
        }
        self.round_number = round;
        Ok(())
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let m = PhaseMachine::new();
        assert_eq!(m.phase(), DebatePhase::Init);
        assert_eq!(m.round_number(), 0);
        assert_eq!(m.turn_count(), 0);
        assert!(m.current_speaker().is_none());
    }

    #[test]
    fn test_full_progression() {
        let mut m = PhaseMachine::new();
        m.transition_to(DebatePhase::Opening, "vote 0 complete")
            .unwrap();
        assert_eq!(m.next_round().unwrap(), 1);
        m.transition_to(DebatePhase::Rounds, "opening complete")
            .unwrap();
        assert_eq!(m.next_round().unwrap(), 2);
        assert_eq!(m.next_round().unwrap(), 3);
        m.transition_to(DebatePhase::Closing, "rounds complete")
            .unwrap();
        m.enter_pseudo_round(4).unwrap();
        m.transition_to(DebatePhase::Done, "closing complete")
            .unwrap();
        assert!(m.phase().is_terminal());
        assert_eq!(m.transitions().len(), 4);
    }

    #[test]
    fn test_skip_transition_rejected() {
        let mut m = PhaseMachine::new();
        let err = m.transition_to(DebatePhase::Rounds, "skip").unwrap_err();
        assert!(matches!(err, DebateError::InvalidTransition { .. }));
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut m = PhaseMachine::new();
        m.transition_to(DebatePhase::Opening, "ok").unwrap();
        assert!(m.transition_to(DebatePhase::Init, "back").is_err());
    }

    #[test]
    fn test_terminal_has_no_successors() {
        assert!(DebatePhase::Done.valid_transitions().is_empty());
    }

    #[test]
    fn test_next_round_outside_rounds_rejected() {
        let mut m = PhaseMachine::new();
        // Still in Init; round 1 only opens at the Opening boundary.
        assert!(m.next_round().is_err());

        m.transition_to(DebatePhase::Opening, "ok").unwrap();
        m.next_round().unwrap();
        // Second increment within Opening is not legal.
        assert!(m.next_round().is_err());
    }

    #[test]
    fn test_pseudo_round_only_in_closing() {
        let mut m = PhaseMachine::new();
        assert!(m.enter_pseudo_round(4).is_err());
    }

    #[test]
    fn test_next_turn_tracks_speaker() {
        let mut m = PhaseMachine::new();
        m.next_turn(AgentId::Crowd);
        assert_eq!(m.turn_count(), 1);
        assert_eq!(m.current_speaker(), Some(AgentId::Crowd));
        m.next_turn(AgentId::DebatorA);
        assert_eq!(m.turn_count(), 2);
        assert_eq!(m.current_speaker(), Some(AgentId::DebatorA));
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut m = PhaseMachine::new();
        m.transition_to(DebatePhase::Opening, "go").unwrap();
        m.next_round().unwrap();
        m.next_turn(AgentId::DebatorA);

        let json = serde_json::to_string(&m).unwrap();
        let back: PhaseMachine = serde_json::from_str(&json).unwrap();
        assert_eq!(back.phase(), DebatePhase::Opening);
        assert_eq!(back.round_number(), 1);
        assert_eq!(back.turn_count(), 1);
        assert_eq!(back.current_speaker(), Some(AgentId::DebatorA));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(DebatePhase::Init.to_string(), "init");
        assert_eq!(DebatePhase::Rounds.to_string(), "rounds");
        assert_eq!(DebatePhase::Done.to_string(), "done");
    }
}
