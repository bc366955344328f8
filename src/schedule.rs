//! The fixed turn schedule.
//!
//! Turn ordering is fixed per phase; the whole debate is a deterministic
//! function of the round count R. The moderator walks this list, and resume
//! skips the first `turn_count` entries before invoking any agent.
//!
//! ```text
//! INIT     round 0:    crowd (Vote 0)
//! OPENING  round 1:    debator_a → factchecker_b → debator_b → factchecker_a → judge → crowd
//! ROUNDS   rounds 2…R+1: factchecker_a → debator_a → factchecker_b → debator_b → judge → crowd
//! CLOSING  round R+2:  factchecker_a → factchecker_b → debator_a → debator_b → judge → crowd
//! ```

use serde::{Deserialize, Serialize};

use crate::phase::DebatePhase;
use crate::state::types::{AgentId, RoundLabel};

/// What a scheduled turn is for. Drives both the agent's behavior and the
/// directive text put in its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnDuty {
    /// Crowd baseline stance vote before any arguments.
    VoteZero,
    /// Debator opening statement with comprehensive research.
    OpeningStatement,
    /// Debator rebuttal targeting the disagreement frontier.
    Rebuttal,
    /// Debator closing statement; no new citations.
    ClosingStatement,
    /// Fact-checker defense of own citations plus verification of the
    /// opponent's recent ones.
    VerifyAndDefend,
    /// Judge consensus/frontier analysis for the round.
    AnalyzeRound,
    /// Crowd performance vote for the round.
    RoundVote,
}

/// One entry of the kernel schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSpec {
    /// Zero-based position in the schedule.
    pub index: u64,
    pub agent: AgentId,
    pub phase: DebatePhase,
    pub round: u32,
    pub round_label: RoundLabel,
    pub duty: TurnDuty,
}

impl TurnSpec {
    /// Directive text surfaced to the agent for this turn.
    pub fn instructions(&self) -> String {
        match self.duty {
            TurnDuty::VoteZero => {
                "Vote on your initial stance preference (FOR or AGAINST) before any arguments."
                    .to_string()
            }
            TurnDuty::OpeningStatement => {
                "Generate your opening statement with comprehensive research.".to_string()
            }
            TurnDuty::Rebuttal => format!(
                "Generate a rebuttal for round {} targeting the current disagreement frontier.",
                self.round
            ),
            TurnDuty::ClosingStatement => {
                "Generate your closing statement. No new citations are allowed.".to_string()
            }
            TurnDuty::VerifyAndDefend => format!(
                "Verify opponent citations added in round {} and respond to criticisms left against your own.",
                self.round
            ),
            TurnDuty::AnalyzeRound => format!(
                "Identify consensus points and update the disagreement frontier for round {}.",
                self.round
            ),
            TurnDuty::RoundVote => {
                "Rate the debate performance so far from your persona's perspective.".to_string()
            }
        }
    }
}

/// Build the full deterministic schedule for a debate with `rounds` rebuttal
/// rounds. Total length is `6 * rounds + 13`.
pub fn build_schedule(rounds: u32) -> Vec<TurnSpec> {
    let mut turns: Vec<TurnSpec> = Vec::with_capacity((6 * rounds + 13) as usize);
    let push = |turns: &mut Vec<TurnSpec>,
                    agent: AgentId,
                    phase: DebatePhase,
                    round: u32,
                    label: RoundLabel,
                    duty: TurnDuty| {
        let index = turns.len() as u64;
        turns.push(TurnSpec {
            index,
            agent,
            phase,
            round,
            round_label: label,
            duty,
        });
    };

    // INIT: Vote 0.
    push(
        &mut turns,
        AgentId::Crowd,
        DebatePhase::Init,
        0,
        RoundLabel::Opening,
        TurnDuty::VoteZero,
    );

    // OPENING: round 1.
    let opening = [
        (AgentId::DebatorA, TurnDuty::OpeningStatement),
        (AgentId::FactcheckerB, TurnDuty::VerifyAndDefend),
        (AgentId::DebatorB, TurnDuty::OpeningStatement),
        (AgentId::FactcheckerA, TurnDuty::VerifyAndDefend),
        (AgentId::Judge, TurnDuty::AnalyzeRound),
        (AgentId::Crowd, TurnDuty::RoundVote),
    ];
    for (agent, duty) in opening {
        push(
            &mut turns,
            agent,
            DebatePhase::Opening,
            1,
            RoundLabel::Opening,
            duty,
        );
    }

    // ROUNDS: rounds 2..R+1.
    for round in 2..=rounds + 1 {
        let sequence = [
            (AgentId::FactcheckerA, TurnDuty::VerifyAndDefend),
            (AgentId::DebatorA, TurnDuty::Rebuttal),
            (AgentId::FactcheckerB, TurnDuty::VerifyAndDefend),
            (AgentId::DebatorB, TurnDuty::Rebuttal),
            (AgentId::Judge, TurnDuty::AnalyzeRound),
            (AgentId::Crowd, TurnDuty::RoundVote),
        ];
        for (agent, duty) in sequence {
            push(
                &mut turns,
                agent,
                DebatePhase::Rounds,
                round,
                RoundLabel::Rebuttal,
                duty,
            );
        }
    }

    // CLOSING: pseudo-round R+2.
    let closing_round = rounds + 2;
    let closing = [
        (AgentId::FactcheckerA, TurnDuty::VerifyAndDefend),
        (AgentId::FactcheckerB, TurnDuty::VerifyAndDefend),
        (AgentId::DebatorA, TurnDuty::ClosingStatement),
        (AgentId::DebatorB, TurnDuty::ClosingStatement),
        (AgentId::Judge, TurnDuty::AnalyzeRound),
        (AgentId::Crowd, TurnDuty::RoundVote),
    ];
    for (agent, duty) in closing {
        push(
            &mut turns,
            agent,
            DebatePhase::Closing,
            closing_round,
            RoundLabel::Closing,
            duty,
        );
    }

    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_length() {
        assert_eq!(build_schedule(2).len(), 25);
        assert_eq!(build_schedule(1).len(), 19);
        assert_eq!(build_schedule(3).len(), 31);
    }

    #[test]
    fn test_indices_are_dense() {
        let schedule = build_schedule(2);
        for (i, spec) in schedule.iter().enumerate() {
            assert_eq!(spec.index, i as u64);
        }
    }

    #[test]
    fn test_vote_zero_first() {
        let schedule = build_schedule(2);
        assert_eq!(schedule[0].agent, AgentId::Crowd);
        assert_eq!(schedule[0].duty, TurnDuty::VoteZero);
        assert_eq!(schedule[0].phase, DebatePhase::Init);
        assert_eq!(schedule[0].round, 0);
    }

    #[test]
    fn test_opening_order() {
        let schedule = build_schedule(2);
        let agents: Vec<AgentId> = schedule[1..7].iter().map(|t| t.agent).collect();
        assert_eq!(
            agents,
            vec![
                AgentId::DebatorA,
                AgentId::FactcheckerB,
                AgentId::DebatorB,
                AgentId::FactcheckerA,
                AgentId::Judge,
                AgentId::Crowd,
            ]
        );
        assert!(schedule[1..7].iter().all(|t| t.round == 1));
    }

    #[test]
    fn test_rebuttal_rounds_order_and_numbering() {
        let schedule = build_schedule(2);
        // Round 2 block starts right after opening.
        let round2: Vec<AgentId> = schedule[7..13].iter().map(|t| t.agent).collect();
        assert_eq!(
            round2,
            vec![
                AgentId::FactcheckerA,
                AgentId::DebatorA,
                AgentId::FactcheckerB,
                AgentId::DebatorB,
                AgentId::Judge,
                AgentId::Crowd,
            ]
        );
        assert!(schedule[7..13].iter().all(|t| t.round == 2));
        assert!(schedule[13..19].iter().all(|t| t.round == 3));
    }

    #[test]
    fn test_closing_block() {
        let schedule = build_schedule(2);
        let closing = &schedule[19..25];
        assert!(closing.iter().all(|t| t.phase == DebatePhase::Closing));
        assert!(closing.iter().all(|t| t.round == 4));
        assert_eq!(closing[0].agent, AgentId::FactcheckerA);
        assert_eq!(closing[1].agent, AgentId::FactcheckerB);
        assert_eq!(closing[2].agent, AgentId::DebatorA);
        assert_eq!(closing[2].duty, TurnDuty::ClosingStatement);
        assert_eq!(closing[5].agent, AgentId::Crowd);
    }

    #[test]
    fn test_crowd_votes_once_per_round() {
        let schedule = build_schedule(2);
        let vote_rounds: Vec<u32> = schedule
            .iter()
            .filter(|t| t.agent == AgentId::Crowd)
            .map(|t| t.round)
            .collect();
        assert_eq!(vote_rounds, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_instructions_mention_round() {
        let schedule = build_schedule(2);
        let rebuttal = schedule.iter().find(|t| t.duty == TurnDuty::Rebuttal).unwrap();
        assert!(rebuttal.instructions().contains("round 2"));
    }
}
