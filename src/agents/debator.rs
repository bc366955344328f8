//! Debator agent — research-backed statements with citation registration.
//!
//! Opening and rebuttal turns run in two steps: a research call at the
//! governor-selected tier, then a statement call conditioned on the research
//! notes, the opponent's latest statement, and the current disagreement
//! frontier. Closing turns make a single call and may not introduce
//! citations. Citation keys are allocated by the store at apply time;
//! allocation is monotone, so the debator predicts the keys from its
//! snapshot and references them in the statement text.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::parse::{parse_json_object, truncate};
use super::{Agent, AgentContext, AgentResponse, Intent};
use crate::cost::{tier_cost_estimate, ResearchTier};
use crate::error::DebateResult;
use crate::fanout::ProviderGateway;
use crate::provider::CallParams;
use crate::schedule::TurnDuty;
use crate::state::store::{PublicTurnDraft, TeamNoteDraft};
use crate::state::types::{citation_key, AgentId, Stance, Team};

const SYSTEM_PROMPT: &str = "You are a skilled debate strategist arguing one side of a contested \
topic. You build arguments on sourced evidence, target the contested issues directly, and keep a \
professional register. You respond in strict JSON when asked to.";

/// Upper bound on citations registered per turn.
const MAX_CITATIONS_PER_TURN: usize = 5;
/// Nominal cost of a statement-generation call.
const STATEMENT_CALL_COST: f64 = 0.05;

pub struct DebatorAgent {
    id: AgentId,
    team: Team,
    stance: Stance,
    gateway: Arc<ProviderGateway>,
    model: String,
    params: CallParams,
}

impl DebatorAgent {
    pub fn new(team: Team, stance: Stance, gateway: Arc<ProviderGateway>, model: &str) -> Self {
        Self {
            id: AgentId::debator(team),
            team,
            stance,
            gateway,
            model: model.to_string(),
            params: CallParams::default()
                .with_temperature(0.7)
                .with_max_tokens(4096),
        }
    }

    pub fn stance(&self) -> Stance {
        self.stance
    }

    // ------------------------------------------------------------------
    // Research step
    // ------------------------------------------------------------------

    async fn research(&self, context: &AgentContext) -> DebateResult<Option<String>> {
        let tier = context.metadata.research_tier;
        if tier == ResearchTier::None || context.duty == TurnDuty::ClosingStatement {
            return Ok(None);
        }

        let depth = match tier {
            ResearchTier::Deep => {
                "Do comprehensive research: cover the strongest evidence for your side, the \
                 strongest counter-evidence you must preempt, and concrete data points with \
                 sources."
            }
            ResearchTier::Standard => {
                "Do focused research: the three or four strongest evidence points for your \
                 side, each with a source."
            }
            ResearchTier::Quick => {
                "Do a quick single-pass scan: one or two key evidence points with sources."
            }
            ResearchTier::None => unreachable!(),
        };

        let focus = if context.duty == TurnDuty::Rebuttal {
            let frontier = frontier_digest(context);
            let opponent = opponent_latest_statement(context, self.team)
                .unwrap_or_else(|| "(opponent has not spoken yet)".to_string());
            format!(
                "You are preparing a rebuttal. Opponent's latest statement:\n{opponent}\n\n\
                 Current contested issues:\n{frontier}\n\n\
                 Research evidence that directly attacks the opponent's position on these issues."
            )
        } else {
            "You are preparing your opening statement. Research the overall case for your side."
                .to_string()
        };

        let query_cap = context
            .metadata
            .research_limits
            .as_ref()
            .map(|limits| format!("Use at most {} search queries.\n\n", limits.max_queries))
            .unwrap_or_default();

        let prompt = format!(
            "Topic: {topic}\n\
             Your stance: {stance}\n\n\
             {focus}\n\n\
             {depth}\n\n\
             {query_cap}\
             Write research notes as plain text. For every evidence point include the source URL \
             on its own line prefixed with 'SOURCE: '.",
            topic = context.topic,
            stance = self.stance,
        );

        // Research calls run under the governor's own limits.
        let mut params = self.params.clone();
        if let Some(limits) = &context.metadata.research_limits {
            let max_tokens = params.max_tokens;
            params = params
                .with_max_tokens(limits.max_output_tokens.min(max_tokens))
                .with_timeout_secs(limits.timeout_secs);
        }

        let notes = self
            .gateway
            .invoke(self.id, &self.model, Some(SYSTEM_PROMPT), &prompt, &params)
            .await?;
        Ok(Some(notes))
    }

    // ------------------------------------------------------------------
    // Statement step
    // ------------------------------------------------------------------

    async fn generate_statement(
        &self,
        context: &AgentContext,
        research: Option<&str>,
        reserved_keys: &[String],
    ) -> DebateResult<String> {
        let mut sections = vec![format!(
            "Topic: {}\nYour team: {} ({} the motion)\n\n{}",
            context.topic,
            self.team,
            self.stance,
            context.instructions
        )];

        if context.metadata.multiplier_team == Some(self.team)
            && context.metadata.resource_multiplier > 1.0
        {
            sections.push(format!(
                "The audience baseline leans against your side; you have been granted a {:.2}x \
                 research budget to compensate. Use it.",
                context.metadata.resource_multiplier
            ));
        }

        if let Some(research) = research {
            sections.push(format!("Your research notes:\n{research}"));
        }

        if context.duty == TurnDuty::Rebuttal {
            if let Some(statement) = opponent_latest_statement(context, self.team) {
                sections.push(format!("Opponent's latest statement:\n{statement}"));
            }
            sections.push(format!(
                "Current disagreement frontier (target these issues directly):\n{}",
                frontier_digest(context)
            ));
        }

        if context.duty == TurnDuty::ClosingStatement {
            let existing = existing_own_keys(context, self.team);
            sections.push(format!(
                "This is your closing statement. Summarize your strongest arguments. You may \
                 reference only your existing citations ({}) as [key]. Adding new citations is \
                 not allowed.",
                if existing.is_empty() {
                    "none".to_string()
                } else {
                    existing.join(", ")
                }
            ));
            sections.push(
                "Respond with JSON only:\n{\"statement\": \"<your closing statement>\", \
                 \"supplementary_material\": \"<optional private notes>\"}"
                    .to_string(),
            );
        } else {
            sections.push(format!(
                "Cite your evidence inline as [key] markers. The keys reserved for this turn \
                 are: {}. List the same source URLs in the citations array, in key order.",
                if reserved_keys.is_empty() {
                    "none (cite nothing)".to_string()
                } else {
                    reserved_keys.join(", ")
                }
            ));
            sections.push(
                "Respond with JSON only:\n{\"statement\": \"<your statement with [key] \
                 markers>\", \"supplementary_material\": \"<optional private notes>\", \
                 \"citations\": [\"<source url>\", ...]}"
                    .to_string(),
            );
        }

        let prompt = sections.join("\n\n");
        self.gateway
            .invoke(self.id, &self.model, Some(SYSTEM_PROMPT), &prompt, &self.params)
            .await
    }

    fn parse_statement(
        &self,
        raw: &str,
        warnings: &mut Vec<String>,
    ) -> Option<(String, Option<String>, Vec<String>)> {
        if let Some(value) = parse_json_object(raw) {
            let statement = value.get("statement").and_then(Value::as_str)?.to_string();
            if statement.trim().is_empty() {
                return None;
            }
            let supplementary = value
                .get("supplementary_material")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from);
            let citations = value
                .get("citations")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            item.as_str()
                                .or_else(|| item.get("url").and_then(Value::as_str))
                        })
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            return Some((statement, supplementary, citations));
        }

        // Fallback: treat the whole response as the statement, no citations.
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        warnings.push(format!(
            "{} statement fell back to raw text without citations",
            self.id
        ));
        Some((text.to_string(), None, Vec::new()))
    }
}

fn opponent_latest_statement(context: &AgentContext, team: Team) -> Option<String> {
    context
        .state
        .history
        .as_ref()?
        .public_transcript
        .iter()
        .rev()
        .find(|t| t.speaker == team.opponent())
        .map(|t| truncate(&t.statement, 2000))
}

fn frontier_digest(context: &AgentContext) -> String {
    let frontier = context
        .state
        .latent
        .as_ref()
        .map(|l| l.current_frontier())
        .unwrap_or(&[]);
    if frontier.is_empty() {
        return "(no frontier mapped yet)".to_string();
    }
    frontier
        .iter()
        .map(|issue| {
            format!(
                "- {}: A holds {}; B holds {}",
                issue.core_issue, issue.a_stance, issue.b_stance
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn existing_own_keys(context: &AgentContext, team: Team) -> Vec<String> {
    context
        .state
        .citations
        .as_ref()
        .map(|pool| pool.team_citations(team).keys().cloned().collect())
        .unwrap_or_default()
}

/// Citation keys referenced as `[a_1]`-style markers in a statement.
fn referenced_keys(statement: &str) -> Vec<String> {
    let re = Regex::new(r"\[([ab]_\d+)\]").expect("static regex");
    let mut keys = Vec::new();
    for capture in re.captures_iter(statement) {
        let key = capture[1].to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

#[async_trait]
impl Agent for DebatorAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn execute(&self, context: &AgentContext) -> DebateResult<AgentResponse> {
        let mut warnings = Vec::new();
        let tier = context.metadata.research_tier;

        // Step 1: research (skipped in closing and at tier NONE).
        let research = self.research(context).await?;

        // Step 2: predict the keys this turn will be assigned. Allocation is
        // monotone per team, so the snapshot determines them exactly.
        let next = context
            .state
            .citations
            .as_ref()
            .map(|pool| pool.next_index(self.team))
            .unwrap_or(1);
        let reserved: Vec<String> = (0..MAX_CITATIONS_PER_TURN as u32)
            .map(|i| citation_key(self.team, next + i))
            .collect();

        // Step 3: statement.
        let raw = self
            .generate_statement(context, research.as_deref(), &reserved)
            .await?;
        let Some((statement, supplementary, citation_urls)) =
            self.parse_statement(&raw, &mut warnings)
        else {
            return Ok(AgentResponse::failure(
                self.id,
                vec!["statement response was empty or unparseable".into()],
            ));
        };

        let mut intents = Vec::new();

        // Citations first so allocation order matches the reserved keys.
        let citations_used;
        if context.duty == TurnDuty::ClosingStatement {
            // No new citations; cited keys must already exist.
            let existing = existing_own_keys(context, self.team);
            citations_used = referenced_keys(&statement)
                .into_iter()
                .filter(|k| existing.contains(k))
                .collect::<Vec<_>>();
        } else {
            let urls: Vec<String> = citation_urls
                .into_iter()
                .take(MAX_CITATIONS_PER_TURN)
                .collect();
            citations_used = reserved[..urls.len()].to_vec();
            for url in urls {
                intents.push(Intent::AddCitation {
                    team: self.team,
                    source_url: url,
                });
            }
        }

        intents.push(Intent::AppendPublicTurn {
            draft: PublicTurnDraft {
                speaker: self.team,
                agent: self.id,
                round: context.round,
                round_label: context.round_label,
                phase: context.phase,
                statement: statement.clone(),
                citations_used: citations_used.clone(),
            },
        });

        // Research notes stay private to the team.
        let note = match (supplementary, research) {
            (Some(supplementary), Some(research)) => {
                Some(format!("{supplementary}\n\nResearch notes:\n{research}"))
            }
            (Some(supplementary), None) => Some(supplementary),
            (None, Some(research)) => Some(format!("Research notes:\n{research}")),
            (None, None) => None,
        };
        if let Some(supplementary_material) = note {
            intents.push(Intent::AppendTeamNote {
                team: self.team,
                note: TeamNoteDraft {
                    round: context.round,
                    agent: self.id,
                    supplementary_material,
                },
            });
        }

        let research_cost = if context.duty == TurnDuty::ClosingStatement {
            0.0
        } else {
            tier_cost_estimate(tier)
        };

        let output = json!({
            "statement_chars": statement.chars().count(),
            "citations_used": citations_used,
            "research_tier": tier,
        });

        Ok(AgentResponse {
            agent: self.id,
            success: true,
            output,
            intents,
            errors: Vec::new(),
            warnings,
            cost_estimate: research_cost + STATEMENT_CALL_COST,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::TurnMetadata;
    use crate::logs::RawCallLog;
    use crate::phase::DebatePhase;
    use crate::state::store::FilteredState;
    use crate::state::types::{CitationPool, RoundLabel};
    use tempfile::tempdir;

    /// Distinguishes research and statement calls by prompt content.
    struct TwoStepClient {
        citations: usize,
    }

    #[async_trait]
    impl crate::provider::ModelClient for TwoStepClient {
        async fn invoke(
            &self,
            _model: &str,
            _system: Option<&str>,
            user: &str,
            _params: &CallParams,
        ) -> DebateResult<String> {
            if user.contains("Write research notes") {
                return Ok("Key finding.\nSOURCE: https://example.org/research".into());
            }
            if user.contains("closing statement") {
                return Ok(r#"{"statement": "In closing, our case stands [a_1].",
                    "supplementary_material": ""}"#
                    .into());
            }
            let urls: Vec<String> = (0..self.citations)
                .map(|i| format!("\"https://example.org/src{i}\""))
                .collect();
            Ok(format!(
                r#"{{"statement": "The evidence is clear.", "supplementary_material": "notes", "citations": [{}]}}"#,
                urls.join(", ")
            ))
        }
    }

    fn agent_with(
        dir: &std::path::Path,
        team: Team,
        citations: usize,
    ) -> DebatorAgent {
        let raw_log = Arc::new(RawCallLog::open(dir).unwrap());
        let gateway = Arc::new(ProviderGateway::new(
            Arc::new(TwoStepClient { citations }),
            raw_log,
            "d-test",
            2,
        ));
        DebatorAgent::new(team, Stance::For, gateway, "debator-model")
    }

    fn opening_context() -> AgentContext {
        let mut metadata = TurnMetadata::neutral();
        metadata.stance = Some(Stance::For);
        metadata.research_tier = ResearchTier::Standard;
        AgentContext {
            debate_id: "d-test".into(),
            topic: "Should remote work be the default?".into(),
            phase: DebatePhase::Opening,
            round: 1,
            round_label: RoundLabel::Opening,
            duty: TurnDuty::OpeningStatement,
            state: FilteredState {
                citations: Some(CitationPool::new("d-test")),
                ..Default::default()
            },
            instructions: "Generate your opening statement with comprehensive research.".into(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_opening_emits_citations_then_turn_then_note() {
        let dir = tempdir().unwrap();
        let agent = agent_with(dir.path(), Team::A, 3);

        let response = agent.execute(&opening_context()).await.unwrap();
        assert!(response.success);

        let ops: Vec<&str> = response.intents.iter().map(|i| i.operation()).collect();
        assert_eq!(
            ops,
            vec![
                "add_citation",
                "add_citation",
                "add_citation",
                "append_public_turn",
                "append_team_note",
            ]
        );

        match &response.intents[3] {
            Intent::AppendPublicTurn { draft } => {
                assert_eq!(draft.citations_used, vec!["a_1", "a_2", "a_3"]);
                assert_eq!(draft.speaker, Team::A);
            }
            other => panic!("unexpected intent {other:?}"),
        }
        // Research notes went into the private team note.
        match response.intents.last().unwrap() {
            Intent::AppendTeamNote { team, note } => {
                assert_eq!(*team, Team::A);
                assert!(note.supplementary_material.contains("Research notes"));
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reserved_keys_continue_from_pool() {
        let dir = tempdir().unwrap();
        let agent = agent_with(dir.path(), Team::A, 2);

        let mut context = opening_context();
        context.duty = TurnDuty::Rebuttal;
        context.round = 2;
        // Pool already holds a_1..a_3.
        let pool = context.state.citations.as_mut().unwrap();
        for i in 1..=3 {
            pool.citations.get_mut(&Team::A).unwrap().insert(
                citation_key(Team::A, i),
                crate::state::types::Citation {
                    team: Team::A,
                    source_url: format!("https://example.org/{i}"),
                    added_by: AgentId::DebatorA,
                    added_in_turn: 1,
                    added_in_round: 1,
                    created_at: chrono::Utc::now(),
                    verification: Default::default(),
                },
            );
        }

        let response = agent.execute(&context).await.unwrap();
        match &response.intents[2] {
            Intent::AppendPublicTurn { draft } => {
                assert_eq!(draft.citations_used, vec!["a_4", "a_5"]);
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closing_adds_no_citations() {
        let dir = tempdir().unwrap();
        let agent = agent_with(dir.path(), Team::A, 3);

        let mut context = opening_context();
        context.duty = TurnDuty::ClosingStatement;
        context.round_label = RoundLabel::Closing;
        context.phase = DebatePhase::Closing;
        context.round = 4;
        context.metadata.research_tier = ResearchTier::None;
        let pool = context.state.citations.as_mut().unwrap();
        pool.citations.get_mut(&Team::A).unwrap().insert(
            "a_1".into(),
            crate::state::types::Citation {
                team: Team::A,
                source_url: "https://example.org/1".into(),
                added_by: AgentId::DebatorA,
                added_in_turn: 1,
                added_in_round: 1,
                created_at: chrono::Utc::now(),
                verification: Default::default(),
            },
        );

        let response = agent.execute(&context).await.unwrap();
        assert!(response
            .intents
            .iter()
            .all(|i| !matches!(i, Intent::AddCitation { .. })));
        match &response.intents[0] {
            Intent::AppendPublicTurn { draft } => {
                // Only pre-existing keys survive into citations_used.
                assert_eq!(draft.citations_used, vec!["a_1"]);
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_citation_cap_enforced() {
        let dir = tempdir().unwrap();
        let agent = agent_with(dir.path(), Team::B, 9);

        let response = agent.execute(&opening_context()).await.unwrap();
        let added = response
            .intents
            .iter()
            .filter(|i| matches!(i, Intent::AddCitation { .. }))
            .count();
        assert_eq!(added, MAX_CITATIONS_PER_TURN);
    }

    #[tokio::test]
    async fn test_unparseable_statement_falls_back_to_raw_text() {
        struct Prose;

        #[async_trait]
        impl crate::provider::ModelClient for Prose {
            async fn invoke(
                &self,
                _model: &str,
                _system: Option<&str>,
                _user: &str,
                _params: &CallParams,
            ) -> DebateResult<String> {
                Ok("Our case rests on three pillars of evidence.".into())
            }
        }

        let dir = tempdir().unwrap();
        let raw_log = Arc::new(RawCallLog::open(dir.path()).unwrap());
        let gateway = Arc::new(ProviderGateway::new(Arc::new(Prose), raw_log, "d-test", 2));
        let agent = DebatorAgent::new(Team::A, Stance::For, gateway, "debator-model");

        let response = agent.execute(&opening_context()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.warnings.len(), 1);
        match &response.intents[0] {
            Intent::AppendPublicTurn { draft } => {
                assert!(draft.statement.contains("three pillars"));
                assert!(draft.citations_used.is_empty());
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[test]
    fn test_referenced_keys_dedup_and_shape() {
        let keys = referenced_keys("See [a_1] and [b_3], also [a_1] again, not [c_9].");
        assert_eq!(keys, vec!["a_1", "b_3"]);
    }
}
