//! Agent contracts: one polymorphic interface, a tagged union of intents.
//!
//! Agents never touch state. Each turn they receive a permission-filtered
//! snapshot plus a directive, and return structured output together with a
//! list of file-update intents. The kernel validates and applies intents;
//! the agents differ only in which intents they may emit. The kernel knows
//! nothing of prompts.

pub mod crowd;
pub mod debator;
pub mod factchecker;
pub mod judge;
pub mod parse;
pub mod personas;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cost::{ResearchLimits, ResearchTier};
use crate::error::DebateResult;
use crate::phase::DebatePhase;
use crate::schedule::TurnDuty;
use crate::state::store::{
    FilteredState, PublicTurnDraft, TeamNoteDraft, VerificationDraft, VoteBallot,
};
use crate::state::types::{AgentId, RoundAnalysis, RoundLabel, Stance, Team};

pub use crowd::CrowdAgent;
pub use debator::DebatorAgent;
pub use factchecker::FactCheckerAgent;
pub use judge::JudgeAgent;

/// Turn-scoped metadata surfaced to the agent alongside the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// The executing agent's stance, for team-bound agents.
    pub stance: Option<Stance>,
    pub opponent_stance: Option<Stance>,
    /// Budget signal for the disadvantaged team; surfaced in prompts, never
    /// enforced numerically.
    pub resource_multiplier: f64,
    /// Which team the multiplier applies to, if any.
    pub multiplier_team: Option<Team>,
    /// Governor-selected research depth for this turn.
    pub research_tier: ResearchTier,
    /// Per-call limits for research turns; absent for non-research turns.
    pub research_limits: Option<ResearchLimits>,
}

impl TurnMetadata {
    pub fn neutral() -> Self {
        Self {
            stance: None,
            opponent_stance: None,
            resource_multiplier: 1.0,
            multiplier_team: None,
            research_tier: ResearchTier::None,
            research_limits: None,
        }
    }
}

impl Default for TurnMetadata {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Everything an agent sees for one turn.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub debate_id: String,
    pub topic: String,
    pub phase: DebatePhase,
    pub round: u32,
    pub round_label: RoundLabel,
    pub duty: TurnDuty,
    /// Permission-filtered deep copy of the canonical documents.
    pub state: FilteredState,
    /// Directive for this specific turn.
    pub instructions: String,
    pub metadata: TurnMetadata,
}

/// A typed mutation request, the only way agents change state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Intent {
    AppendPublicTurn { draft: PublicTurnDraft },
    AppendTeamNote { team: Team, note: TeamNoteDraft },
    AddCitation { team: Team, source_url: String },
    SetVerification {
        team: Team,
        key: String,
        verification: VerificationDraft,
    },
    SetProponentResponse {
        team: Team,
        key: String,
        response: String,
    },
    AppendLatent { entry: RoundAnalysis },
    RecordCrowdVote {
        round_sequence: u32,
        votes: Vec<VoteBallot>,
    },
}

impl Intent {
    /// Short operation name for event records.
    pub fn operation(&self) -> &'static str {
        match self {
            Intent::AppendPublicTurn { .. } => "append_public_turn",
            Intent::AppendTeamNote { .. } => "append_team_note",
            Intent::AddCitation { .. } => "add_citation",
            Intent::SetVerification { .. } => "set_verification",
            Intent::SetProponentResponse { .. } => "set_proponent_response",
            Intent::AppendLatent { .. } => "append_latent",
            Intent::RecordCrowdVote { .. } => "record_crowd_vote",
        }
    }

    /// Document the intent mutates.
    pub fn document(&self) -> &'static str {
        match self {
            Intent::AppendPublicTurn { .. } | Intent::AppendTeamNote { .. } => "history_chat",
            Intent::AddCitation { .. }
            | Intent::SetVerification { .. }
            | Intent::SetProponentResponse { .. } => "citation_pool",
            Intent::AppendLatent { .. } => "debate_latent",
            Intent::RecordCrowdVote { .. } => "crowd_opinion",
        }
    }
}

/// What an agent returns from one turn.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub agent: AgentId,
    pub success: bool,
    /// Structured output for the moderator (vote splits, analysis counts).
    pub output: serde_json::Value,
    pub intents: Vec<Intent>,
    pub errors: Vec<String>,
    /// Recoverable anomalies (parse fallbacks); logged as events.
    pub warnings: Vec<String>,
    pub cost_estimate: f64,
}

impl AgentResponse {
    pub fn failure(agent: AgentId, errors: Vec<String>) -> Self {
        Self {
            agent,
            success: false,
            output: serde_json::Value::Null,
            intents: Vec::new(),
            errors,
            warnings: Vec::new(),
            cost_estimate: 0.0,
        }
    }
}

/// The single polymorphic agent interface.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> AgentId;

    async fn execute(&self, context: &AgentContext) -> DebateResult<AgentResponse>;
}
