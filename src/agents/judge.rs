//! Judge agent — neutral latent-space mapping.
//!
//! Each turn the judge reads the public transcript (never team notes) and
//! appends one round analysis: consensus statements plus the disagreement
//! frontier. It does not score arguments and never declares a winner.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::parse::parse_json_object;
use super::{Agent, AgentContext, AgentResponse, Intent};
use crate::error::DebateResult;
use crate::fanout::ProviderGateway;
use crate::provider::CallParams;
use crate::state::types::{AgentId, FrontierIssue, RoundAnalysis};

const SYSTEM_PROMPT: &str = "You are a neutral debate analyst. You map the logical structure of \
an ongoing debate: which claims both sides accept, and which core issues remain contested with \
each side's current position. You never judge who is winning and never take a side. You respond \
in strict JSON.";

pub struct JudgeAgent {
    gateway: Arc<ProviderGateway>,
    model: String,
    params: CallParams,
    cost_per_turn: f64,
}

impl JudgeAgent {
    pub fn new(gateway: Arc<ProviderGateway>, model: &str) -> Self {
        Self {
            gateway,
            model: model.to_string(),
            params: CallParams::default()
                .with_temperature(0.3)
                .with_max_tokens(2048),
            cost_per_turn: 0.05,
        }
    }

    fn build_prompt(&self, context: &AgentContext) -> String {
        let transcript = context
            .state
            .history
            .as_ref()
            .map(|h| {
                h.public_transcript
                    .iter()
                    .map(|t| {
                        format!(
                            "[round {} | team {} | {}]\n{}",
                            t.round, t.speaker, t.round_label, t.statement
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
            .unwrap_or_default();

        let prior = context
            .state
            .latent
            .as_ref()
            .and_then(|l| l.round_history.last())
            .map(|r| serde_json::to_string_pretty(&r.disagreement_frontier).unwrap_or_default())
            .unwrap_or_else(|| "(no prior analysis)".to_string());

        format!(
            "Topic: {topic}\n\n\
             {instructions}\n\n\
             Public transcript so far:\n{transcript}\n\n\
             Previous disagreement frontier:\n{prior}\n\n\
             Respond with JSON only:\n\
             {{\n\
             \x20 \"consensus\": [\"<claim both sides accept>\", ...],\n\
             \x20 \"disagreement_frontier\": [\n\
             \x20   {{\"core_issue\": \"<issue>\", \"a_stance\": \"<team A position>\", \"b_stance\": \"<team B position>\"}}\n\
             \x20 ]\n\
             }}",
            topic = context.topic,
            instructions = context.instructions,
        )
    }

    fn parse_analysis(&self, raw: &str, round: u32) -> Option<RoundAnalysis> {
        let value = parse_json_object(raw)?;

        let consensus = value
            .get("consensus")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let frontier = value
            .get("disagreement_frontier")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let core_issue = item.get("core_issue")?.as_str()?.trim();
                        if core_issue.is_empty() {
                            return None;
                        }
                        Some(FrontierIssue {
                            core_issue: core_issue.to_string(),
                            a_stance: item
                                .get("a_stance")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                            b_stance: item
                                .get("b_stance")
                                .and_then(Value::as_str)
                                .unwrap_or("")
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(RoundAnalysis {
            round_number: round,
            consensus,
            disagreement_frontier: frontier,
            analyzed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Agent for JudgeAgent {
    fn id(&self) -> AgentId {
        AgentId::Judge
    }

    async fn execute(&self, context: &AgentContext) -> DebateResult<AgentResponse> {
        let prompt = self.build_prompt(context);
        let raw = self
            .gateway
            .invoke(
                self.id(),
                &self.model,
                Some(SYSTEM_PROMPT),
                &prompt,
                &self.params,
            )
            .await?;

        let Some(entry) = self.parse_analysis(&raw, context.round) else {
            return Ok(AgentResponse::failure(
                self.id(),
                vec!["analysis response was not parseable JSON".into()],
            ));
        };

        let output = json!({
            "consensus_count": entry.consensus.len(),
            "frontier_count": entry.disagreement_frontier.len(),
        });

        Ok(AgentResponse {
            agent: self.id(),
            success: true,
            output,
            intents: vec![Intent::AppendLatent { entry }],
            errors: Vec::new(),
            warnings: Vec::new(),
            cost_estimate: self.cost_per_turn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::TurnMetadata;
    use crate::logs::RawCallLog;
    use crate::phase::DebatePhase;
    use crate::provider::ModelClient;
    use crate::schedule::TurnDuty;
    use crate::state::store::FilteredState;
    use crate::state::types::RoundLabel;
    use tempfile::tempdir;

    struct Canned(&'static str);

    #[async_trait]
    impl ModelClient for Canned {
        async fn invoke(
            &self,
            _model: &str,
            _system: Option<&str>,
            _user: &str,
            _params: &CallParams,
        ) -> DebateResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn context(round: u32) -> AgentContext {
        AgentContext {
            debate_id: "d-test".into(),
            topic: "Topic".into(),
            phase: DebatePhase::Opening,
            round,
            round_label: RoundLabel::Opening,
            duty: TurnDuty::AnalyzeRound,
            state: FilteredState::default(),
            instructions: "analyze".into(),
            metadata: TurnMetadata::neutral(),
        }
    }

    fn judge(dir: &std::path::Path, response: &'static str) -> JudgeAgent {
        let raw_log = Arc::new(RawCallLog::open(dir).unwrap());
        let gateway = Arc::new(ProviderGateway::new(
            Arc::new(Canned(response)),
            raw_log,
            "d-test",
            2,
        ));
        JudgeAgent::new(gateway, "judge-model")
    }

    #[tokio::test]
    async fn test_emits_one_latent_intent() {
        let dir = tempdir().unwrap();
        let agent = judge(
            dir.path(),
            r#"{"consensus": ["The topic matters."], "disagreement_frontier": [
                {"core_issue": "cost", "a_stance": "affordable", "b_stance": "prohibitive"}
            ]}"#,
        );

        let response = agent.execute(&context(1)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.intents.len(), 1);
        match &response.intents[0] {
            Intent::AppendLatent { entry } => {
                assert_eq!(entry.round_number, 1);
                assert_eq!(entry.consensus.len(), 1);
                assert_eq!(entry.disagreement_frontier[0].core_issue, "cost");
            }
            other => panic!("unexpected intent {other:?}"),
        }
        assert_eq!(response.output["frontier_count"], 1);
    }

    #[tokio::test]
    async fn test_malformed_frontier_items_dropped() {
        let dir = tempdir().unwrap();
        let agent = judge(
            dir.path(),
            r#"{"consensus": [], "disagreement_frontier": [
                {"core_issue": "valid", "a_stance": "x", "b_stance": "y"},
                {"a_stance": "missing core issue"},
                {"core_issue": "   "}
            ]}"#,
        );

        let response = agent.execute(&context(2)).await.unwrap();
        match &response.intents[0] {
            Intent::AppendLatent { entry } => {
                assert_eq!(entry.disagreement_frontier.len(), 1);
                assert_eq!(entry.disagreement_frontier[0].core_issue, "valid");
            }
            other => panic!("unexpected intent {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_analysis_fails_without_intents() {
        let dir = tempdir().unwrap();
        let agent = judge(dir.path(), "the debate was very interesting");

        let response = agent.execute(&context(1)).await.unwrap();
        assert!(!response.success);
        assert!(response.intents.is_empty());
        assert!(!response.errors.is_empty());
    }

    #[test]
    fn test_prompt_excludes_team_notes_by_construction() {
        // The judge's snapshot simply has no note streams; the prompt only
        // renders the public transcript.
        let dir = tempdir().unwrap();
        let agent = judge(dir.path(), "{}");
        let prompt = agent.build_prompt(&context(1));
        assert!(prompt.contains("Public transcript"));
        assert!(!prompt.contains("supplementary"));
    }
}
