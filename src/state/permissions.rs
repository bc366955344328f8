//! Read-permission matrix.
//!
//! Agents never touch the documents directly; `StateStore::read_for` builds
//! a deep-copied snapshot with everything outside the agent's scope
//! stripped. Write rights are not matrixed; they are enumerated per intent
//! kind in the runner's validation.

use serde::{Deserialize, Serialize};

use super::types::{AgentId, Team};

/// How much of the history document an agent may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// Public transcript only; both note streams stripped.
    PublicOnly,
    /// Public transcript plus one team's private notes.
    PublicAndTeam(Team),
    /// Everything (moderator).
    All,
}

/// All-or-nothing scope for the other documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocScope {
    None,
    All,
}

/// The read scopes of one agent.
#[derive(Debug, Clone, Copy)]
pub struct ReadScopes {
    pub history: HistoryScope,
    pub citations: DocScope,
    pub latent: DocScope,
    pub crowd: DocScope,
}

/// The permission matrix. Team-bound agents see their own note stream; the
/// judge and crowd see the public transcript only; the crowd additionally
/// sees no citations (policy default); only the moderator sees the crowd
/// opinion document.
pub fn scopes_for(agent: AgentId) -> ReadScopes {
    match agent {
        AgentId::DebatorA | AgentId::FactcheckerA => ReadScopes {
            history: HistoryScope::PublicAndTeam(Team::A),
            citations: DocScope::All,
            latent: DocScope::All,
            crowd: DocScope::None,
        },
        AgentId::DebatorB | AgentId::FactcheckerB => ReadScopes {
            history: HistoryScope::PublicAndTeam(Team::B),
            citations: DocScope::All,
            latent: DocScope::All,
            crowd: DocScope::None,
        },
        AgentId::Judge => ReadScopes {
            history: HistoryScope::PublicOnly,
            citations: DocScope::All,
            latent: DocScope::All,
            crowd: DocScope::None,
        },
        AgentId::Crowd => ReadScopes {
            history: HistoryScope::PublicOnly,
            citations: DocScope::None,
            latent: DocScope::All,
            crowd: DocScope::None,
        },
        AgentId::Moderator => ReadScopes {
            history: HistoryScope::All,
            citations: DocScope::All,
            latent: DocScope::All,
            crowd: DocScope::All,
        },
    }
}
