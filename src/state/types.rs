//! Canonical document types and agent identities.
//!
//! Four documents live for the lifetime of a debate: the chat history, the
//! citation pool, the latent map, and the crowd opinion record. Everything
//! here is plain serde data; mutation goes through `StateStore` only.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::DebatePhase;

/// One of the two adversarial sides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    A,
    B,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Team::A => "a",
            Team::B => "b",
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stance on the debate topic. Team A is the side whose stance wins Vote 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    For,
    Against,
}

impl Stance {
    pub fn opposite(self) -> Stance {
        match self {
            Stance::For => Stance::Against,
            Stance::Against => Stance::For,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stance::For => "for",
            Stance::Against => "against",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of kernel-visible agent identities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    DebatorA,
    DebatorB,
    FactcheckerA,
    FactcheckerB,
    Judge,
    Crowd,
    Moderator,
}

/// Agent role, independent of team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Debator,
    Factchecker,
    Judge,
    Crowd,
    Moderator,
}

impl AgentId {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::DebatorA => "debator_a",
            AgentId::DebatorB => "debator_b",
            AgentId::FactcheckerA => "factchecker_a",
            AgentId::FactcheckerB => "factchecker_b",
            AgentId::Judge => "judge",
            AgentId::Crowd => "crowd",
            AgentId::Moderator => "moderator",
        }
    }

    /// The team this agent belongs to, if any.
    pub fn team(self) -> Option<Team> {
        match self {
            AgentId::DebatorA | AgentId::FactcheckerA => Some(Team::A),
            AgentId::DebatorB | AgentId::FactcheckerB => Some(Team::B),
            _ => None,
        }
    }

    pub fn role(self) -> Role {
        match self {
            AgentId::DebatorA | AgentId::DebatorB => Role::Debator,
            AgentId::FactcheckerA | AgentId::FactcheckerB => Role::Factchecker,
            AgentId::Judge => Role::Judge,
            AgentId::Crowd => Role::Crowd,
            AgentId::Moderator => Role::Moderator,
        }
    }

    /// The debator of a given team.
    pub fn debator(team: Team) -> AgentId {
        match team {
            Team::A => AgentId::DebatorA,
            Team::B => AgentId::DebatorB,
        }
    }

    /// The fact-checker of a given team.
    pub fn factchecker(team: Team) -> AgentId {
        match team {
            Team::A => AgentId::FactcheckerA,
            Team::B => AgentId::FactcheckerB,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debator_a" => Ok(AgentId::DebatorA),
            "debator_b" => Ok(AgentId::DebatorB),
            "factchecker_a" => Ok(AgentId::FactcheckerA),
            "factchecker_b" => Ok(AgentId::FactcheckerB),
            "judge" => Ok(AgentId::Judge),
            "crowd" => Ok(AgentId::Crowd),
            "moderator" => Ok(AgentId::Moderator),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}

/// Label attached to every public turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundLabel {
    Opening,
    Rebuttal,
    Closing,
}

impl fmt::Display for RoundLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundLabel::Opening => write!(f, "opening"),
            RoundLabel::Rebuttal => write!(f, "rebuttal"),
            RoundLabel::Closing => write!(f, "closing"),
        }
    }
}

// ============================================================================
// History document
// ============================================================================

/// `history_chat.json`: the public transcript plus per-team private notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub debate_id: String,
    pub topic: String,
    pub metadata: HistoryMetadata,
    pub public_transcript: Vec<PublicTurn>,
    pub team_notes: TeamNotes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMetadata {
    pub created_at: DateTime<Utc>,
    pub phase: DebatePhase,
    pub current_round: u32,
}

/// A single public statement. Append-only; `turn_id` is globally monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTurn {
    pub turn_id: u64,
    pub round: u32,
    pub round_label: RoundLabel,
    pub phase: DebatePhase,
    pub speaker: Team,
    pub agent: AgentId,
    pub timestamp: DateTime<Utc>,
    pub statement: String,
    pub citations_used: Vec<String>,
}

/// Private research/supplementary note visible only to its own team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamNote {
    pub round: u32,
    pub agent: AgentId,
    pub supplementary_material: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamNotes {
    pub a: Vec<TeamNote>,
    pub b: Vec<TeamNote>,
}

impl TeamNotes {
    pub fn for_team(&self, team: Team) -> &[TeamNote] {
        match team {
            Team::A => &self.a,
            Team::B => &self.b,
        }
    }

    pub fn for_team_mut(&mut self, team: Team) -> &mut Vec<TeamNote> {
        match team {
            Team::A => &mut self.a,
            Team::B => &mut self.b,
        }
    }
}

// ============================================================================
// Citation pool document
// ============================================================================

/// `citation_pool.json`: two disjoint namespaces keyed `<team>_<n>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationPool {
    pub debate_id: String,
    /// Per-team citation maps. Keys are never recycled or re-assigned.
    pub citations: BTreeMap<Team, BTreeMap<String, Citation>>,
    /// Round number → citation keys created that round.
    pub index_by_round: BTreeMap<u32, Vec<String>>,
}

impl CitationPool {
    pub fn new(debate_id: &str) -> Self {
        let mut citations = BTreeMap::new();
        citations.insert(Team::A, BTreeMap::new());
        citations.insert(Team::B, BTreeMap::new());
        Self {
            debate_id: debate_id.to_string(),
            citations,
            index_by_round: BTreeMap::new(),
        }
    }

    pub fn team_citations(&self, team: Team) -> &BTreeMap<String, Citation> {
        static EMPTY: BTreeMap<String, Citation> = BTreeMap::new();
        self.citations.get(&team).unwrap_or(&EMPTY)
    }

    /// The next index `n` to allocate for `team` (keys are dense from 1).
    pub fn next_index(&self, team: Team) -> u32 {
        self.team_citations(team)
            .keys()
            .filter_map(|k| parse_citation_key(k).map(|(_, n)| n))
            .max()
            .unwrap_or(0)
            + 1
    }

    pub fn get(&self, team: Team, key: &str) -> Option<&Citation> {
        self.team_citations(team).get(key)
    }
}

/// Parse `<team>_<n>` into its components.
pub fn parse_citation_key(key: &str) -> Option<(Team, u32)> {
    let (team, n) = key.split_once('_')?;
    let team = match team {
        "a" => Team::A,
        "b" => Team::B,
        _ => return None,
    };
    n.parse().ok().map(|n| (team, n))
}

/// Format a citation key from its components.
pub fn citation_key(team: Team, n: u32) -> String {
    format!("{}_{}", team.as_str(), n)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub team: Team,
    /// Source URL as provided by the debator. May be a placeholder search
    /// URL; the kernel stores it verbatim and the fact-checker scores it.
    pub source_url: String,
    pub added_by: AgentId,
    pub added_in_turn: u64,
    pub added_in_round: u32,
    pub created_at: DateTime<Utc>,
    pub verification: Verification,
}

/// Adversarial verification block. All-null until the opposing fact-checker
/// writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Verification {
    pub source_credibility: Option<u8>,
    pub content_correspondence: Option<u8>,
    pub adversary_comment: Option<String>,
    pub proponent_response: Option<String>,
    pub verified_by: Option<AgentId>,
    pub verified_in_round: Option<u32>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Verification {
    pub fn is_verified(&self) -> bool {
        self.verified_by.is_some()
    }

    /// Criticized before `current_round` and not yet defended. Defenses may
    /// only be written in a round after the criticism landed.
    pub fn needs_defense(&self, current_round: u32) -> bool {
        self.adversary_comment.is_some()
            && self.proponent_response.is_none()
            && self.verified_in_round.is_some_and(|r| r < current_round)
    }
}

// ============================================================================
// Latent document
// ============================================================================

/// `debate_latent.json`: the judge's round-by-round map of the
/// argumentative latent space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateLatent {
    pub debate_id: String,
    pub round_history: Vec<RoundAnalysis>,
}

impl DebateLatent {
    pub fn new(debate_id: &str) -> Self {
        Self {
            debate_id: debate_id.to_string(),
            round_history: Vec::new(),
        }
    }

    /// Most recent frontier, if any round has been analyzed.
    pub fn current_frontier(&self) -> &[FrontierIssue] {
        self.round_history
            .last()
            .map(|r| r.disagreement_frontier.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundAnalysis {
    pub round_number: u32,
    /// Claims both sides appear to accept.
    pub consensus: Vec<String>,
    /// Contested issues with each side's current position.
    pub disagreement_frontier: Vec<FrontierIssue>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierIssue {
    pub core_issue: String,
    pub a_stance: String,
    pub b_stance: String,
}

// ============================================================================
// Crowd opinion document
// ============================================================================

/// `crowd_opinion.json`: voter records plus per-round aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdOpinion {
    pub debate_id: String,
    pub voters: Vec<Voter>,
    #[serde(default)]
    pub vote_rounds: Vec<VoteRoundSummary>,
}

impl CrowdOpinion {
    pub fn new(debate_id: &str) -> Self {
        Self {
            debate_id: debate_id.to_string(),
            voters: Vec::new(),
            vote_rounds: Vec::new(),
        }
    }

    pub fn voter_mut(&mut self, voter_id: &str) -> Option<&mut Voter> {
        self.voters.iter_mut().find(|v| v.voter_id == voter_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub voter_id: String,
    pub persona: String,
    pub persona_kind: String,
    pub voting_record: Vec<VoteEntry>,
}

/// One vote. Scores 1..=50 are AGAINST, 51..=100 are FOR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteEntry {
    pub round_sequence: u32,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRoundSummary {
    pub round_sequence: u32,
    pub average_score: f64,
    pub vote_count: usize,
    pub timestamp: DateTime<Utc>,
}
