//! The single code path through which every agent turn passes.
//!
//! Invoke (with bounded retries on transient provider errors) → validate
//! intents against the agent's write rights and the closing-citation rule →
//! apply intents in order through the store → advance the phase machine,
//! record cost, and log events. Validation failures are fatal and mutate
//! nothing: intents are only applied after the whole list passes.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;

use crate::agents::{Agent, AgentContext, Intent};
use crate::cost::{CostGovernor, ResearchTier};
use crate::error::{DebateError, DebateResult};
use crate::logs::{EventLog, KernelEvent};
use crate::phase::{DebatePhase, PhaseMachine};
use crate::schedule::{TurnDuty, TurnSpec};
use crate::state::store::StateStore;
use crate::state::types::{AgentId, Role};

/// What a completed turn hands back to the moderator.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// 1-based turn counter value after this turn.
    pub turn: u64,
    pub agent: AgentId,
    pub action: String,
    pub cost: f64,
    pub duration_secs: f64,
    pub research_tier: Option<ResearchTier>,
    pub output: Value,
}

pub struct AgentRunner {
    max_attempts: u32,
    backoff_base: Duration,
}

impl AgentRunner {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }

    /// Execute one scheduled turn end to end.
    pub async fn run_turn(
        &self,
        agent: &dyn Agent,
        spec: &TurnSpec,
        context: AgentContext,
        store: &mut StateStore,
        machine: &mut PhaseMachine,
        governor: &mut CostGovernor,
        events: &EventLog,
    ) -> DebateResult<TurnOutcome> {
        let turn = machine.turn_count() + 1;
        let started = Instant::now();
        let tier = (agent.id().role() == Role::Debator
            && spec.duty != TurnDuty::ClosingStatement)
            .then_some(context.metadata.research_tier);

        events.append(&KernelEvent::TurnStarted {
            turn,
            agent: agent.id(),
            phase: spec.phase,
            round: spec.round,
            timestamp: Utc::now(),
        })?;
        tracing::info!(turn, agent = %agent.id(), phase = %spec.phase, round = spec.round, "turn started");

        // Invoke with bounded retries; every retry restarts the turn fresh.
        let response = match self.invoke_with_retries(agent, &context).await {
            Ok(response) => response,
            Err(e) => {
                self.log_failure(events, turn, agent.id(), &e)?;
                return Err(e);
            }
        };

        if !response.success {
            let e = DebateError::AgentFailed {
                agent: agent.id().to_string(),
                detail: response.errors.join(", "),
            };
            self.log_failure(events, turn, agent.id(), &e)?;
            return Err(e);
        }

        // Validate the whole intent list before touching any document.
        if let Err(e) = validate_intents(agent.id(), spec, &response.intents) {
            self.log_failure(events, turn, agent.id(), &e)?;
            return Err(e);
        }

        // Apply in intent order.
        let upcoming_turn_id = store.peek_turn_id();
        for intent in &response.intents {
            apply_intent(store, agent.id(), spec, upcoming_turn_id, intent)?;
            events.append(&KernelEvent::FileUpdated {
                doc: intent.document().to_string(),
                operation: intent.operation().to_string(),
                agent: agent.id(),
                timestamp: Utc::now(),
            })?;
        }

        for warning in &response.warnings {
            tracing::warn!(agent = %agent.id(), "{warning}");
            events.append(&KernelEvent::AgentWarning {
                agent: agent.id(),
                message: warning.clone(),
                timestamp: Utc::now(),
            })?;
        }

        machine.next_turn(agent.id());
        governor.record_turn(agent.id(), spec.phase, response.cost_estimate, tier);

        let duration = started.elapsed();
        events.append(&KernelEvent::TurnCompleted {
            turn,
            agent: agent.id(),
            cost: response.cost_estimate,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        })?;
        tracing::info!(
            turn,
            agent = %agent.id(),
            cost = response.cost_estimate,
            "turn completed"
        );

        Ok(TurnOutcome {
            turn,
            agent: agent.id(),
            action: action_name(spec.duty).to_string(),
            cost: response.cost_estimate,
            duration_secs: duration.as_secs_f64(),
            research_tier: tier,
            output: response.output,
        })
    }

    async fn invoke_with_retries(
        &self,
        agent: &dyn Agent,
        context: &AgentContext,
    ) -> DebateResult<crate::agents::AgentResponse> {
        let mut attempt = 1;
        loop {
            match agent.execute(context).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_base * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        agent = %agent.id(),
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %e,
                        "transient provider error, retrying turn"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn log_failure(
        &self,
        events: &EventLog,
        turn: u64,
        agent: AgentId,
        error: &DebateError,
    ) -> DebateResult<()> {
        tracing::error!(turn, agent = %agent, error = %error, "turn failed");
        events.append(&KernelEvent::TurnFailed {
            turn,
            agent,
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        })
    }
}

impl Default for AgentRunner {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn action_name(duty: TurnDuty) -> &'static str {
    match duty {
        TurnDuty::VoteZero => "vote_zero",
        TurnDuty::OpeningStatement => "opening_statement",
        TurnDuty::Rebuttal => "rebuttal",
        TurnDuty::ClosingStatement => "closing_statement",
        TurnDuty::VerifyAndDefend => "verify_and_defend",
        TurnDuty::AnalyzeRound => "analyze_round",
        TurnDuty::RoundVote => "round_vote",
    }
}

/// Check every intent against the agent's write rights and the schedule
/// position. The closing-citation rule lives here: any `add_citation`
/// originating from a CLOSING turn is rejected outright.
pub fn validate_intents(
    agent: AgentId,
    spec: &TurnSpec,
    intents: &[Intent],
) -> DebateResult<()> {
    let deny = |action: &str| -> DebateResult<()> {
        Err(DebateError::PermissionDenied {
            agent: agent.to_string(),
            action: action.to_string(),
        })
    };

    for intent in intents {
        match (agent.role(), intent) {
            (Role::Debator, Intent::AddCitation { team, .. }) => {
                if spec.phase == DebatePhase::Closing {
                    return Err(DebateError::CitationRuleViolation(format!(
                        "{agent} attempted add_citation during closing"
                    )));
                }
                if agent.team() != Some(*team) {
                    deny(&format!("add a citation to namespace {team}"))?;
                }
            }
            (Role::Debator, Intent::AppendPublicTurn { draft }) => {
                if agent.team() != Some(draft.speaker) || draft.agent != agent {
                    deny("speak for the other team")?;
                }
                if draft.round != spec.round || draft.phase != spec.phase {
                    return Err(DebateError::SchemaViolation(format!(
                        "public turn declares round {} phase {}, schedule says round {} phase {}",
                        draft.round, draft.phase, spec.round, spec.phase
                    )));
                }
            }
            (Role::Debator, Intent::AppendTeamNote { team, .. }) => {
                if agent.team() != Some(*team) {
                    deny(&format!("write notes for team {team}"))?;
                }
            }
            (Role::Factchecker, Intent::SetVerification { team, verification, .. }) => {
                if agent.team() != Some(team.opponent()) || verification.verified_by != agent {
                    deny(&format!("verify citations in namespace {team}"))?;
                }
            }
            (Role::Factchecker, Intent::SetProponentResponse { team, .. }) => {
                if agent.team() != Some(*team) {
                    deny(&format!("defend citations in namespace {team}"))?;
                }
            }
            (Role::Judge, Intent::AppendLatent { entry }) => {
                if entry.round_number != spec.round {
                    return Err(DebateError::SchemaViolation(format!(
                        "latent entry declares round {}, schedule says round {}",
                        entry.round_number, spec.round
                    )));
                }
            }
            (Role::Crowd, Intent::RecordCrowdVote { round_sequence, .. }) => {
                if *round_sequence != spec.round {
                    return Err(DebateError::SchemaViolation(format!(
                        "crowd vote declares round {round_sequence}, schedule says round {}",
                        spec.round
                    )));
                }
            }
            (_, intent) => {
                deny(&format!("emit {}", intent.operation()))?;
            }
        }
    }

    // The crowd's whole turn is one vote.
    if agent.role() == Role::Crowd && intents.len() != 1 {
        return Err(DebateError::SchemaViolation(format!(
            "crowd turn must carry exactly one record_crowd_vote intent, got {}",
            intents.len()
        )));
    }

    Ok(())
}

fn apply_intent(
    store: &mut StateStore,
    agent: AgentId,
    spec: &TurnSpec,
    upcoming_turn_id: u64,
    intent: &Intent,
) -> DebateResult<()> {
    match intent {
        Intent::AppendPublicTurn { draft } => {
            store.append_public_turn(draft.clone())?;
        }
        Intent::AppendTeamNote { team, note } => {
            store.append_team_note(*team, note.clone())?;
        }
        Intent::AddCitation { team, source_url } => {
            store.add_citation(*team, source_url, agent, upcoming_turn_id, spec.round)?;
        }
        Intent::SetVerification {
            team,
            key,
            verification,
        } => {
            store.set_verification(*team, key, spec.round, verification.clone())?;
        }
        Intent::SetProponentResponse {
            team,
            key,
            response,
        } => {
            store.set_proponent_response(*team, key, response, agent)?;
        }
        Intent::AppendLatent { entry } => {
            store.append_latent_round(entry.clone())?;
        }
        Intent::RecordCrowdVote {
            round_sequence,
            votes,
        } => {
            store.record_crowd_vote(*round_sequence, votes)?;
        }
    }
    Ok(())
}
