//! Single-writer store for the four canonical debate documents.
//!
//! The store is the only mutator of `history_chat.json`,
//! `citation_pool.json`, `debate_latent.json`, and `crowd_opinion.json`.
//! Every write rewrites the affected document crash-safely: sibling temp
//! file, fsync, atomic rename. A partially written document is never
//! observable. Agents get deep-copied, permission-filtered snapshots and
//! never write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{DebateError, DebateResult};
use crate::phase::DebatePhase;
use crate::state::permissions::{scopes_for, DocScope, HistoryScope};
use crate::state::types::{
    citation_key, AgentId, Citation, CitationPool, CrowdOpinion, DebateLatent, History,
    HistoryMetadata, PublicTurn, Role, RoundAnalysis, RoundLabel, Team, TeamNote, TeamNotes,
    Verification, VoteEntry, VoteRoundSummary, Voter,
};

pub const HISTORY_FILE: &str = "history_chat.json";
pub const CITATIONS_FILE: &str = "citation_pool.json";
pub const LATENT_FILE: &str = "debate_latent.json";
pub const CROWD_FILE: &str = "crowd_opinion.json";

/// Payload for `append_public_turn`. The store assigns the turn id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTurnDraft {
    pub speaker: Team,
    pub agent: AgentId,
    pub round: u32,
    pub round_label: RoundLabel,
    pub phase: DebatePhase,
    pub statement: String,
    pub citations_used: Vec<String>,
}

/// Payload for `append_team_note`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamNoteDraft {
    pub round: u32,
    pub agent: AgentId,
    pub supplementary_material: String,
}

/// Payload for `set_verification`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationDraft {
    pub source_credibility: u8,
    pub content_correspondence: u8,
    pub adversary_comment: String,
    pub verified_by: AgentId,
}

/// One persona's vote inside a `record_crowd_vote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteBallot {
    pub voter_id: String,
    pub persona: String,
    pub persona_kind: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Permission-filtered snapshot handed to an agent. Documents outside the
/// agent's scope are absent; present documents are deep copies, so agent
/// mutation cannot touch committed state.
#[derive(Debug, Clone, Default)]
pub struct FilteredState {
    pub history: Option<History>,
    pub citations: Option<CitationPool>,
    pub latent: Option<DebateLatent>,
    pub crowd: Option<CrowdOpinion>,
}

/// In-memory images of the four documents plus their directory. All writes
/// go through here; the kernel is single-writer by construction.
pub struct StateStore {
    dir: PathBuf,
    history: History,
    citations: CitationPool,
    latent: DebateLatent,
    crowd: CrowdOpinion,
    next_turn_id: u64,
}

impl StateStore {
    /// Initialize a fresh debate directory with empty documents.
    ///
    /// Must never be called on a directory holding an in-progress debate;
    /// the moderator's entry point branches on checkpoint presence first.
    pub fn create(dir: &Path, debate_id: &str, topic: &str) -> DebateResult<Self> {
        fs::create_dir_all(dir)?;

        let store = Self {
            dir: dir.to_path_buf(),
            history: History {
                debate_id: debate_id.to_string(),
                topic: topic.to_string(),
                metadata: HistoryMetadata {
                    created_at: Utc::now(),
                    phase: DebatePhase::Init,
                    current_round: 0,
                },
                public_transcript: Vec::new(),
                team_notes: TeamNotes::default(),
            },
            citations: CitationPool::new(debate_id),
            latent: DebateLatent::new(debate_id),
            crowd: CrowdOpinion::new(debate_id),
            next_turn_id: 1,
        };

        store.persist_all()?;
        Ok(store)
    }

    /// Load an existing debate directory (the resume path). Never truncates
    /// or reinitializes; counters are derived from the loaded documents so
    /// key allocation continues where it left off.
    pub fn open(dir: &Path) -> DebateResult<Self> {
        let history: History = read_json(&dir.join(HISTORY_FILE))?;
        let citations: CitationPool = read_json(&dir.join(CITATIONS_FILE))?;
        let latent: DebateLatent = read_json(&dir.join(LATENT_FILE))?;
        let crowd: CrowdOpinion = read_json(&dir.join(CROWD_FILE))?;

        let next_turn_id = history
            .public_transcript
            .last()
            .map(|t| t.turn_id + 1)
            .unwrap_or(1);

        Ok(Self {
            dir: dir.to_path_buf(),
            history,
            citations,
            latent,
            crowd,
            next_turn_id,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn citations(&self) -> &CitationPool {
        &self.citations
    }

    pub fn latent(&self) -> &DebateLatent {
        &self.latent
    }

    pub fn crowd(&self) -> &CrowdOpinion {
        &self.crowd
    }

    /// The id the next public turn will receive. Citation intents applied
    /// ahead of their statement record against this id.
    pub fn peek_turn_id(&self) -> u64 {
        self.next_turn_id
    }

    // ========================================================================
    // Permission-filtered reads
    // ========================================================================

    /// Build the agent's view of the world. Everything outside its read
    /// scope is stripped before the copy is handed over.
    pub fn read_for(&self, agent: AgentId) -> FilteredState {
        let scopes = scopes_for(agent);

        let history = match scopes.history {
            HistoryScope::All => Some(self.history.clone()),
            HistoryScope::PublicOnly => {
                let mut h = self.history.clone();
                h.team_notes = TeamNotes::default();
                Some(h)
            }
            HistoryScope::PublicAndTeam(team) => {
                let mut h = self.history.clone();
                let mut notes = TeamNotes::default();
                *notes.for_team_mut(team) = h.team_notes.for_team(team).to_vec();
                h.team_notes = notes;
                Some(h)
            }
        };

        let citations = match scopes.citations {
            DocScope::All => Some(self.citations.clone()),
            DocScope::None => None,
        };
        let latent = match scopes.latent {
            DocScope::All => Some(self.latent.clone()),
            DocScope::None => None,
        };
        let crowd = match scopes.crowd {
            DocScope::All => Some(self.crowd.clone()),
            DocScope::None => None,
        };

        FilteredState {
            history,
            citations,
            latent,
            crowd,
        }
    }

    // ========================================================================
    // Write operations, each the sole mutator of its fields
    // ========================================================================

    /// Append to the public transcript; assigns and returns the turn id.
    pub fn append_public_turn(&mut self, draft: PublicTurnDraft) -> DebateResult<u64> {
        if draft.statement.trim().is_empty() {
            return Err(DebateError::SchemaViolation(
                "public turn statement is empty".into(),
            ));
        }

        let turn_id = self.next_turn_id;
        self.next_turn_id += 1;

        self.history.public_transcript.push(PublicTurn {
            turn_id,
            round: draft.round,
            round_label: draft.round_label,
            phase: draft.phase,
            speaker: draft.speaker,
            agent: draft.agent,
            timestamp: Utc::now(),
            statement: draft.statement,
            citations_used: draft.citations_used,
        });
        self.history.metadata.phase = draft.phase;
        self.history.metadata.current_round = draft.round;

        self.write_doc(HISTORY_FILE, &self.history)?;
        Ok(turn_id)
    }

    /// Append a private note to one team's stream.
    pub fn append_team_note(&mut self, team: Team, draft: TeamNoteDraft) -> DebateResult<()> {
        self.history.team_notes.for_team_mut(team).push(TeamNote {
            round: draft.round,
            agent: draft.agent,
            supplementary_material: draft.supplementary_material,
            timestamp: Utc::now(),
        });
        self.write_doc(HISTORY_FILE, &self.history)
    }

    /// Allocate the next `<team>_<n>` key and store the citation with an
    /// all-null verification block. Returns the allocated key.
    pub fn add_citation(
        &mut self,
        team: Team,
        source_url: &str,
        added_by: AgentId,
        turn_id: u64,
        round: u32,
    ) -> DebateResult<String> {
        if added_by.team() != Some(team) || added_by.role() != Role::Debator {
            return Err(DebateError::PermissionDenied {
                agent: added_by.to_string(),
                action: format!("add a citation to namespace {team}"),
            });
        }

        let key = citation_key(team, self.citations.next_index(team));
        let team_map = self.citations.citations.entry(team).or_default();
        if team_map.contains_key(&key) {
            // Monotone allocation makes this unreachable; hitting it means
            // the counter derivation is broken.
            return Err(DebateError::KeyCollision(key));
        }

        team_map.insert(
            key.clone(),
            Citation {
                team,
                source_url: source_url.to_string(),
                added_by,
                added_in_turn: turn_id,
                added_in_round: round,
                created_at: Utc::now(),
                verification: Verification::default(),
            },
        );
        self.citations
            .index_by_round
            .entry(round)
            .or_default()
            .push(key.clone());

        self.write_doc(CITATIONS_FILE, &self.citations)?;
        Ok(key)
    }

    /// Write the adversarial verification of one citation. Only the
    /// opposing team's fact-checker may verify. `round` is the round the
    /// verifying turn belongs to; defenses become legal the round after.
    pub fn set_verification(
        &mut self,
        team: Team,
        key: &str,
        round: u32,
        draft: VerificationDraft,
    ) -> DebateResult<()> {
        if draft.verified_by != AgentId::factchecker(team.opponent()) {
            return Err(DebateError::PermissionDenied {
                agent: draft.verified_by.to_string(),
                action: format!("verify citation {key} in namespace {team}"),
            });
        }
        for (label, score) in [
            ("source_credibility", draft.source_credibility),
            ("content_correspondence", draft.content_correspondence),
        ] {
            if !(1..=10).contains(&score) {
                return Err(DebateError::SchemaViolation(format!(
                    "{label} {score} outside [1..10] for {key}"
                )));
            }
        }

        let citation = self
            .citations
            .citations
            .get_mut(&team)
            .and_then(|m| m.get_mut(key))
            .ok_or_else(|| {
                DebateError::SchemaViolation(format!("citation {key} not found in namespace {team}"))
            })?;

        citation.verification.source_credibility = Some(draft.source_credibility);
        citation.verification.content_correspondence = Some(draft.content_correspondence);
        citation.verification.adversary_comment = Some(draft.adversary_comment);
        citation.verification.verified_by = Some(draft.verified_by);
        citation.verification.verified_in_round = Some(round);
        citation.verification.verified_at = Some(Utc::now());

        self.write_doc(CITATIONS_FILE, &self.citations)
    }

    /// Write the proponent's defense of a criticized citation. Only the
    /// citation's own team's fact-checker may respond.
    pub fn set_proponent_response(
        &mut self,
        team: Team,
        key: &str,
        response: &str,
        responder: AgentId,
    ) -> DebateResult<()> {
        if responder != AgentId::factchecker(team) {
            return Err(DebateError::PermissionDenied {
                agent: responder.to_string(),
                action: format!("defend citation {key} in namespace {team}"),
            });
        }

        let citation = self
            .citations
            .citations
            .get_mut(&team)
            .and_then(|m| m.get_mut(key))
            .ok_or_else(|| {
                DebateError::SchemaViolation(format!("citation {key} not found in namespace {team}"))
            })?;

        if citation.verification.adversary_comment.is_none() {
            return Err(DebateError::SchemaViolation(format!(
                "citation {key} has no adversary comment to respond to"
            )));
        }

        citation.verification.proponent_response = Some(response.to_string());
        citation.verification.verified_at = Some(Utc::now());

        self.write_doc(CITATIONS_FILE, &self.citations)
    }

    /// Append one round analysis. Round numbers must be strictly increasing.
    pub fn append_latent_round(&mut self, entry: RoundAnalysis) -> DebateResult<()> {
        if let Some(last) = self.latent.round_history.last() {
            if entry.round_number <= last.round_number {
                return Err(DebateError::SchemaViolation(format!(
                    "latent round {} not greater than previous {}",
                    entry.round_number, last.round_number
                )));
            }
        }
        self.latent.round_history.push(entry);
        self.write_doc(LATENT_FILE, &self.latent)
    }

    /// Record one voting round: one `{round_sequence, score}` per voter plus
    /// an aggregate summary. Round 0 creates the voter roster; later rounds
    /// require every ballot to name an existing voter and keep each record
    /// strictly in order.
    pub fn record_crowd_vote(
        &mut self,
        round_sequence: u32,
        ballots: &[VoteBallot],
    ) -> DebateResult<()> {
        if ballots.is_empty() {
            return Err(DebateError::SchemaViolation("empty crowd vote".into()));
        }
        for ballot in ballots {
            if !(1..=100).contains(&ballot.score) {
                return Err(DebateError::SchemaViolation(format!(
                    "vote score {} from {} outside [1..100]",
                    ballot.score, ballot.voter_id
                )));
            }
        }
        if let Some(last) = self.crowd.vote_rounds.last() {
            if round_sequence <= last.round_sequence {
                return Err(DebateError::SchemaViolation(format!(
                    "vote round {round_sequence} not greater than previous {}",
                    last.round_sequence
                )));
            }
        }

        for ballot in ballots {
            let entry = VoteEntry {
                round_sequence,
                score: ballot.score,
                rationale: ballot.rationale.clone(),
            };
            match self.crowd.voter_mut(&ballot.voter_id) {
                Some(voter) => {
                    if voter
                        .voting_record
                        .last()
                        .is_some_and(|e| e.round_sequence >= round_sequence)
                    {
                        return Err(DebateError::SchemaViolation(format!(
                            "voter {} already voted in round {round_sequence}",
                            ballot.voter_id
                        )));
                    }
                    voter.voting_record.push(entry);
                }
                None if round_sequence == 0 => {
                    self.crowd.voters.push(Voter {
                        voter_id: ballot.voter_id.clone(),
                        persona: ballot.persona.clone(),
                        persona_kind: ballot.persona_kind.clone(),
                        voting_record: vec![entry],
                    });
                }
                None => {
                    return Err(DebateError::SchemaViolation(format!(
                        "unknown voter {} in round {round_sequence}",
                        ballot.voter_id
                    )));
                }
            }
        }

        let sum: u64 = ballots.iter().map(|b| b.score as u64).sum();
        self.crowd.vote_rounds.push(VoteRoundSummary {
            round_sequence,
            average_score: sum as f64 / ballots.len() as f64,
            vote_count: ballots.len(),
            timestamp: Utc::now(),
        });

        self.write_doc(CROWD_FILE, &self.crowd)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn persist_all(&self) -> DebateResult<()> {
        self.write_doc(HISTORY_FILE, &self.history)?;
        self.write_doc(CITATIONS_FILE, &self.citations)?;
        self.write_doc(LATENT_FILE, &self.latent)?;
        self.write_doc(CROWD_FILE, &self.crowd)?;
        Ok(())
    }

    /// Crash-safe document write: sibling temp file, fsync, rename.
    fn write_doc<T: Serialize>(&self, name: &str, value: &T) -> DebateResult<()> {
        write_json_atomic(&self.dir.join(name), value)
    }
}

/// Pretty-print `value` to `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> DebateResult<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(value)?;
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> DebateResult<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = StateStore::create(dir.path(), "d-test", "Should we?").unwrap();
        (store, dir)
    }

    fn turn_draft(speaker: Team, agent: AgentId, round: u32) -> PublicTurnDraft {
        PublicTurnDraft {
            speaker,
            agent,
            round,
            round_label: RoundLabel::Opening,
            phase: DebatePhase::Opening,
            statement: "We hold that the motion stands.".into(),
            citations_used: vec![],
        }
    }

    fn ballot(id: &str, score: u8) -> VoteBallot {
        VoteBallot {
            voter_id: id.into(),
            persona: "Economist".into(),
            persona_kind: "professional".into(),
            score,
            rationale: None,
        }
    }

    #[test]
    fn test_create_writes_all_documents() {
        let (_store, dir) = test_store();
        for name in [HISTORY_FILE, CITATIONS_FILE, LATENT_FILE, CROWD_FILE] {
            let raw = fs::read_to_string(dir.path().join(name)).unwrap();
            // Every document re-parses after every kernel write.
            let _: serde_json::Value = serde_json::from_str(&raw).unwrap();
            assert!(raw.contains("d-test"));
        }
    }

    #[test]
    fn test_turn_ids_monotonic() {
        let (mut store, _dir) = test_store();
        let t1 = store
            .append_public_turn(turn_draft(Team::A, AgentId::DebatorA, 1))
            .unwrap();
        let t2 = store
            .append_public_turn(turn_draft(Team::B, AgentId::DebatorB, 1))
            .unwrap();
        assert_eq!(t1, 1);
        assert_eq!(t2, 2);
    }

    #[test]
    fn test_empty_statement_rejected() {
        let (mut store, _dir) = test_store();
        let mut draft = turn_draft(Team::A, AgentId::DebatorA, 1);
        draft.statement = "   ".into();
        assert!(matches!(
            store.append_public_turn(draft),
            Err(DebateError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_citation_keys_sequential_per_team() {
        let (mut store, _dir) = test_store();
        for expected in ["a_1", "a_2", "a_3"] {
            let key = store
                .add_citation(Team::A, "https://example.org", AgentId::DebatorA, 1, 1)
                .unwrap();
            assert_eq!(key, expected);
        }
        let key = store
            .add_citation(Team::B, "https://example.org", AgentId::DebatorB, 3, 1)
            .unwrap();
        assert_eq!(key, "b_1");
        assert_eq!(
            store.citations().index_by_round.get(&1).unwrap(),
            &vec!["a_1", "a_2", "a_3", "b_1"]
        );
    }

    #[test]
    fn test_citation_wrong_team_rejected() {
        let (mut store, _dir) = test_store();
        let err = store
            .add_citation(Team::A, "https://example.org", AgentId::DebatorB, 1, 1)
            .unwrap_err();
        assert!(matches!(err, DebateError::PermissionDenied { .. }));

        // Fact-checkers may add no citations at all.
        let err = store
            .add_citation(Team::A, "https://example.org", AgentId::FactcheckerA, 1, 1)
            .unwrap_err();
        assert!(matches!(err, DebateError::PermissionDenied { .. }));
    }

    #[test]
    fn test_verification_only_by_opposing_factchecker() {
        let (mut store, _dir) = test_store();
        store
            .add_citation(Team::A, "https://example.org", AgentId::DebatorA, 1, 1)
            .unwrap();

        let draft = VerificationDraft {
            source_credibility: 7,
            content_correspondence: 6,
            adversary_comment: "Secondary source; figures match.".into(),
            verified_by: AgentId::FactcheckerA,
        };
        let err = store.set_verification(Team::A, "a_1", 1, draft).unwrap_err();
        assert!(matches!(err, DebateError::PermissionDenied { .. }));

        let draft = VerificationDraft {
            source_credibility: 7,
            content_correspondence: 6,
            adversary_comment: "Secondary source; figures match.".into(),
            verified_by: AgentId::FactcheckerB,
        };
        store.set_verification(Team::A, "a_1", 1, draft).unwrap();
        let citation = store.citations().get(Team::A, "a_1").unwrap();
        assert_eq!(citation.verification.source_credibility, Some(7));
        assert_eq!(citation.verification.verified_in_round, Some(1));
        assert_eq!(citation.verification.verified_by, Some(AgentId::FactcheckerB));
    }

    #[test]
    fn test_verification_score_range_enforced() {
        let (mut store, _dir) = test_store();
        store
            .add_citation(Team::A, "https://example.org", AgentId::DebatorA, 1, 1)
            .unwrap();
        let draft = VerificationDraft {
            source_credibility: 0,
            content_correspondence: 5,
            adversary_comment: "x".into(),
            verified_by: AgentId::FactcheckerB,
        };
        assert!(matches!(
            store.set_verification(Team::A, "a_1", 1, draft),
            Err(DebateError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_defense_requires_prior_criticism_and_own_factchecker() {
        let (mut store, _dir) = test_store();
        store
            .add_citation(Team::A, "https://example.org", AgentId::DebatorA, 1, 1)
            .unwrap();

        // No adversary comment yet.
        let err = store
            .set_proponent_response(Team::A, "a_1", "It holds up.", AgentId::FactcheckerA)
            .unwrap_err();
        assert!(matches!(err, DebateError::SchemaViolation(_)));

        store
            .set_verification(
                Team::A,
                "a_1",
                1,
                VerificationDraft {
                    source_credibility: 3,
                    content_correspondence: 4,
                    adversary_comment: "Out-of-date figures.".into(),
                    verified_by: AgentId::FactcheckerB,
                },
            )
            .unwrap();

        // Wrong responder.
        let err = store
            .set_proponent_response(Team::A, "a_1", "It holds up.", AgentId::FactcheckerB)
            .unwrap_err();
        assert!(matches!(err, DebateError::PermissionDenied { .. }));

        store
            .set_proponent_response(Team::A, "a_1", "Figures were re-confirmed in 2025.", AgentId::FactcheckerA)
            .unwrap();
        let citation = store.citations().get(Team::A, "a_1").unwrap();
        assert!(citation.verification.proponent_response.is_some());
    }

    #[test]
    fn test_latent_rounds_strictly_increasing() {
        let (mut store, _dir) = test_store();
        let entry = |round| RoundAnalysis {
            round_number: round,
            consensus: vec!["The topic matters.".into()],
            disagreement_frontier: vec![],
            analyzed_at: Utc::now(),
        };
        store.append_latent_round(entry(1)).unwrap();
        store.append_latent_round(entry(2)).unwrap();
        assert!(matches!(
            store.append_latent_round(entry(2)),
            Err(DebateError::SchemaViolation(_))
        ));
    }

    #[test]
    fn test_vote_zero_creates_roster_later_rounds_append() {
        let (mut store, _dir) = test_store();
        store
            .record_crowd_vote(0, &[ballot("v_001", 80), ballot("v_002", 20)])
            .unwrap();
        assert_eq!(store.crowd().voters.len(), 2);

        store
            .record_crowd_vote(1, &[ballot("v_001", 60), ballot("v_002", 40)])
            .unwrap();
        let voter = &store.crowd().voters[0];
        assert_eq!(voter.voting_record.len(), 2);
        assert_eq!(voter.voting_record[1].round_sequence, 1);
        assert_eq!(store.crowd().vote_rounds.len(), 2);
        assert_eq!(store.crowd().vote_rounds[1].average_score, 50.0);
    }

    #[test]
    fn test_unknown_voter_rejected_after_round_zero() {
        let (mut store, _dir) = test_store();
        store.record_crowd_vote(0, &[ballot("v_001", 80)]).unwrap();
        let err = store
            .record_crowd_vote(1, &[ballot("v_999", 60)])
            .unwrap_err();
        assert!(matches!(err, DebateError::SchemaViolation(_)));
    }

    #[test]
    fn test_vote_round_must_advance() {
        let (mut store, _dir) = test_store();
        store.record_crowd_vote(0, &[ballot("v_001", 80)]).unwrap();
        assert!(store.record_crowd_vote(0, &[ballot("v_001", 70)]).is_err());
    }

    #[test]
    fn test_vote_score_range() {
        let (mut store, _dir) = test_store();
        assert!(store.record_crowd_vote(0, &[ballot("v_001", 0)]).is_err());
        assert!(store.record_crowd_vote(0, &[ballot("v_001", 101)]).is_err());
    }

    #[test]
    fn test_open_resumes_counters() {
        let dir = tempdir().unwrap();
        {
            let mut store = StateStore::create(dir.path(), "d-test", "Should we?").unwrap();
            store
                .append_public_turn(turn_draft(Team::A, AgentId::DebatorA, 1))
                .unwrap();
            store
                .add_citation(Team::A, "https://example.org", AgentId::DebatorA, 1, 1)
                .unwrap();
            store
                .add_citation(Team::A, "https://example.org/2", AgentId::DebatorA, 1, 1)
                .unwrap();
        }

        let mut reopened = StateStore::open(dir.path()).unwrap();
        let turn = reopened
            .append_public_turn(turn_draft(Team::B, AgentId::DebatorB, 1))
            .unwrap();
        assert_eq!(turn, 2);
        let key = reopened
            .add_citation(Team::A, "https://example.org/3", AgentId::DebatorA, 2, 1)
            .unwrap();
        assert_eq!(key, "a_3");
    }

    #[test]
    fn test_read_for_filters_team_notes() {
        let (mut store, _dir) = test_store();
        store
            .append_team_note(
                Team::A,
                TeamNoteDraft {
                    round: 1,
                    agent: AgentId::DebatorA,
                    supplementary_material: "private research".into(),
                },
            )
            .unwrap();
        store
            .append_team_note(
                Team::B,
                TeamNoteDraft {
                    round: 1,
                    agent: AgentId::DebatorB,
                    supplementary_material: "other private research".into(),
                },
            )
            .unwrap();

        let view = store.read_for(AgentId::DebatorA);
        let history = view.history.unwrap();
        assert_eq!(history.team_notes.a.len(), 1);
        assert!(history.team_notes.b.is_empty());

        let view = store.read_for(AgentId::Judge);
        let history = view.history.unwrap();
        assert!(history.team_notes.a.is_empty());
        assert!(history.team_notes.b.is_empty());
        assert!(view.citations.is_some());
        assert!(view.crowd.is_none());

        let view = store.read_for(AgentId::Crowd);
        assert!(view.citations.is_none());
        assert!(view.latent.is_some());

        let view = store.read_for(AgentId::Moderator);
        assert_eq!(view.history.unwrap().team_notes.b.len(), 1);
        assert!(view.crowd.is_some());
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let (mut store, _dir) = test_store();
        store
            .append_public_turn(turn_draft(Team::A, AgentId::DebatorA, 1))
            .unwrap();

        let mut view = store.read_for(AgentId::DebatorA);
        view.history.as_mut().unwrap().public_transcript.clear();
        assert_eq!(store.history().public_transcript.len(), 1);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (mut store, dir) = test_store();
        store
            .append_public_turn(turn_draft(Team::A, AgentId::DebatorA, 1))
            .unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
