//! Shared debate state: canonical documents, permission matrix, and the
//! single-writer store.

pub mod permissions;
pub mod store;
pub mod types;

pub use permissions::{scopes_for, DocScope, HistoryScope, ReadScopes};
pub use store::{
    write_json_atomic, FilteredState, PublicTurnDraft, StateStore, TeamNoteDraft,
    VerificationDraft, VoteBallot,
};
pub use types::{
    citation_key, parse_citation_key, AgentId, Citation, CitationPool, CrowdOpinion, DebateLatent,
    FrontierIssue, History, PublicTurn, Role, RoundAnalysis, RoundLabel, Stance, Team, TeamNote,
    Verification, VoteEntry, VoteRoundSummary, Voter,
};
