//! Crowd agent — N diverse personas voting in one batched turn.
//!
//! Vote 0 asks each persona for a baseline stance before any arguments;
//! later rounds ask for a performance rating of the two teams given the
//! latest statements and the judge's latent map. All N prompts run through
//! the gateway's fan-out, so a crowd turn costs exactly one raw-call log
//! entry. An unparseable ballot defaults to 50 (abstain) and is surfaced as
//! a warning for the kernel to record.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::parse::{parse_vote, truncate};
use super::personas::{build_personas, Persona};
use super::{Agent, AgentContext, AgentResponse, Intent};
use crate::error::DebateResult;
use crate::fanout::ProviderGateway;
use crate::provider::CallParams;
use crate::schedule::TurnDuty;
use crate::state::store::VoteBallot;
use crate::state::types::{AgentId, Team};

const ABSTAIN_SCORE: u8 = 50;
/// Most recent statement excerpt length in voting prompts.
const STATEMENT_EXCERPT_CHARS: usize = 400;

pub struct CrowdAgent {
    gateway: Arc<ProviderGateway>,
    model: String,
    personas: Vec<Persona>,
    params: CallParams,
    /// Nominal cost per persona ballot.
    cost_per_vote: f64,
}

impl CrowdAgent {
    pub fn new(gateway: Arc<ProviderGateway>, model: &str, crowd_size: usize) -> Self {
        Self {
            gateway,
            model: model.to_string(),
            personas: build_personas(crowd_size),
            params: CallParams::default()
                .with_temperature(0.8)
                .with_max_tokens(100),
            cost_per_vote: 0.001,
        }
    }

    pub fn personas(&self) -> &[Persona] {
        &self.personas
    }

    fn build_prompt(&self, persona: &Persona, context: &AgentContext) -> String {
        if context.duty == TurnDuty::VoteZero {
            return format!(
                "Voter {id}. You are: {description}\n\n\
                 Topic: {topic}\n\n\
                 This is the initial vote BEFORE any debate arguments. Based on your values \
                 and perspective as a {name}, what is your initial stance on this topic?\n\n\
                 Score: 1-100\n\
                 - 1-20: Strongly AGAINST the proposal\n\
                 - 21-40: Moderately against\n\
                 - 41-60: Neutral or undecided\n\
                 - 61-80: Moderately FOR the proposal\n\
                 - 81-100: Strongly FOR\n\n\
                 Respond with JSON only: {{\"score\": <1-100>, \"reasoning\": \"<one sentence>\"}}",
                id = persona.id,
                description = persona.description,
                topic = context.topic,
                name = persona.name,
            );
        }

        let (last_a, last_b) = latest_statements(context);
        let frontier = frontier_digest(context);

        format!(
            "Voter {id}. You are: {description}\n\n\
             Topic: {topic}\n\n\
             Team A's latest argument:\n{last_a}\n\n\
             Team B's latest argument:\n{last_b}\n\n\
             Contested issues so far:\n{frontier}\n\n\
             Based on your perspective as a {name}, rate how convinced you are by the debate \
             so far.\n\n\
             Score: 1-100\n\
             - 1-20: Strongly favor Team B\n\
             - 21-40: Moderately favor Team B\n\
             - 41-60: Neutral or undecided\n\
             - 61-80: Moderately favor Team A\n\
             - 81-100: Strongly favor Team A\n\n\
             Respond with JSON only: {{\"score\": <1-100>, \"reasoning\": \"<one sentence>\"}}",
            id = persona.id,
            description = persona.description,
            topic = context.topic,
            name = persona.name,
        )
    }
}

fn latest_statements(context: &AgentContext) -> (String, String) {
    let transcript = context
        .state
        .history
        .as_ref()
        .map(|h| h.public_transcript.as_slice())
        .unwrap_or(&[]);

    let mut last_a = None;
    let mut last_b = None;
    for turn in transcript.iter().rev() {
        match turn.speaker {
            Team::A if last_a.is_none() => last_a = Some(turn.statement.as_str()),
            Team::B if last_b.is_none() => last_b = Some(turn.statement.as_str()),
            _ => {}
        }
        if last_a.is_some() && last_b.is_some() {
            break;
        }
    }

    let excerpt = |s: Option<&str>| {
        s.map(|s| truncate(s, STATEMENT_EXCERPT_CHARS))
            .unwrap_or_else(|| "No statement yet".to_string())
    };
    (excerpt(last_a), excerpt(last_b))
}

fn frontier_digest(context: &AgentContext) -> String {
    let frontier = context
        .state
        .latent
        .as_ref()
        .map(|l| l.current_frontier())
        .unwrap_or(&[]);
    if frontier.is_empty() {
        return "(none mapped yet)".to_string();
    }
    frontier
        .iter()
        .map(|issue| format!("- {}", issue.core_issue))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Agent for CrowdAgent {
    fn id(&self) -> AgentId {
        AgentId::Crowd
    }

    async fn execute(&self, context: &AgentContext) -> DebateResult<AgentResponse> {
        let prompts: Vec<String> = self
            .personas
            .iter()
            .map(|p| self.build_prompt(p, context))
            .collect();

        let responses = self
            .gateway
            .invoke_batch(self.id(), &self.model, prompts, &self.params)
            .await?;

        let mut ballots = Vec::with_capacity(self.personas.len());
        let mut warnings = Vec::new();
        for (persona, raw) in self.personas.iter().zip(&responses) {
            let (score, rationale) = match parse_vote(raw) {
                Some(parsed) => parsed,
                None => {
                    warnings.push(format!(
                        "unparseable vote from {} defaulted to abstain",
                        persona.id
                    ));
                    (ABSTAIN_SCORE, None)
                }
            };
            ballots.push(VoteBallot {
                voter_id: persona.id.clone(),
                persona: persona.name.clone(),
                persona_kind: persona.kind.clone(),
                score,
                rationale,
            });
        }

        let for_count = ballots.iter().filter(|b| b.score > 50).count();
        let against_count = ballots.len() - for_count;
        let average: f64 =
            ballots.iter().map(|b| b.score as f64).sum::<f64>() / ballots.len() as f64;

        let output = json!({
            "voter_count": ballots.len(),
            "average_score": (average * 10.0).round() / 10.0,
            "for_count": for_count,
            "against_count": against_count,
        });

        Ok(AgentResponse {
            agent: self.id(),
            success: true,
            output,
            intents: vec![Intent::RecordCrowdVote {
                round_sequence: context.round,
                votes: ballots,
            }],
            errors: Vec::new(),
            warnings,
            cost_estimate: self.cost_per_vote * self.personas.len() as f64,
        })
    }
}
