//! Fact-checker agent — adversarial verification plus defense.
//!
//! Each turn runs two passes. Defense first: respond to adversary comments
//! left against the own team's citations. Then offense: score every
//! opposing citation that has not been verified yet (credibility and
//! content correspondence on 1..10, plus a short critical comment). Under
//! the fixed schedule "not yet verified" is exactly the set added in the
//! most recent round. Fact-checkers add no citations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::parse::{clamp_verification_score, extract_int_field, parse_json_object, truncate};
use super::{Agent, AgentContext, AgentResponse, Intent};
use crate::error::DebateResult;
use crate::fanout::ProviderGateway;
use crate::provider::CallParams;
use crate::state::store::VerificationDraft;
use crate::state::types::{AgentId, Citation, Team};

const SYSTEM_PROMPT: &str = "You are a rigorous fact-checker in a structured debate. You \
evaluate sources for credibility and for whether they actually support the claims made. Be \
rigorous but fair: find real issues, not nitpicks. You respond in strict JSON when asked to.";

/// Fallback credibility when even regex extraction finds no score.
const FALLBACK_SCORE: u8 = 1;

pub struct FactCheckerAgent {
    id: AgentId,
    team: Team,
    gateway: Arc<ProviderGateway>,
    model: String,
    params: CallParams,
    cost_per_call: f64,
}

impl FactCheckerAgent {
    pub fn new(team: Team, gateway: Arc<ProviderGateway>, model: &str) -> Self {
        Self {
            id: AgentId::factchecker(team),
            team,
            gateway,
            model: model.to_string(),
            params: CallParams::default()
                .with_temperature(0.2)
                .with_max_tokens(1024),
            cost_per_call: 0.02,
        }
    }

    fn opponent_citations_to_verify<'a>(
        &self,
        context: &'a AgentContext,
    ) -> Vec<(&'a String, &'a Citation)> {
        let Some(pool) = context.state.citations.as_ref() else {
            return Vec::new();
        };
        pool.team_citations(self.team.opponent())
            .iter()
            .filter(|(_, citation)| !citation.verification.is_verified())
            .collect()
    }

    fn own_citations_to_defend<'a>(
        &self,
        context: &'a AgentContext,
    ) -> Vec<(&'a String, &'a Citation)> {
        let Some(pool) = context.state.citations.as_ref() else {
            return Vec::new();
        };
        pool.team_citations(self.team)
            .iter()
            .filter(|(_, citation)| citation.verification.needs_defense(context.round))
            .collect()
    }

    async fn verify_one(
        &self,
        key: &str,
        citation: &Citation,
        warnings: &mut Vec<String>,
    ) -> DebateResult<VerificationDraft> {
        let prompt = format!(
            "Verify this citation:\n\n\
             Source URL: {url}\n\
             Citation key: [{key}]\n\n\
             Your task:\n\
             1. SOURCE CREDIBILITY (1-10): is this a reliable, authoritative source? Consider \
             domain authority, publication reputation, author credentials.\n\
             2. CONTENT CORRESPONDENCE (1-10): does the source actually support the claim being \
             made? Are data and quotes accurate and in context?\n\
             3. ADVERSARY COMMENT: a brief (2-3 sentence) critical analysis explaining the \
             scores and pointing out specific issues.\n\n\
             Respond with JSON only:\n\
             {{\"source_credibility\": <1-10>, \"content_correspondence\": <1-10>, \
             \"adversary_comment\": \"<2-3 sentences>\"}}",
            url = citation.source_url,
        );

        let raw = self
            .gateway
            .invoke(self.id, &self.model, Some(SYSTEM_PROMPT), &prompt, &self.params)
            .await?;

        if let Some(value) = parse_json_object(&raw) {
            let credibility = value
                .get("source_credibility")
                .and_then(Value::as_i64)
                .map(clamp_verification_score);
            let correspondence = value
                .get("content_correspondence")
                .and_then(Value::as_i64)
                .map(clamp_verification_score);
            if let (Some(credibility), Some(correspondence)) = (credibility, correspondence) {
                let comment = value
                    .get("adversary_comment")
                    .and_then(Value::as_str)
                    .map(|s| truncate(s, 600))
                    .unwrap_or_else(|| truncate(&raw, 300));
                return Ok(VerificationDraft {
                    source_credibility: credibility,
                    content_correspondence: correspondence,
                    adversary_comment: comment,
                    verified_by: self.id,
                });
            }
        }

        // Regex fallback, then floor scores.
        warnings.push(format!("verification of {key} fell back to text extraction"));
        let credibility = extract_int_field(&raw, "source_credibility")
            .or_else(|| extract_int_field(&raw, "credibility"))
            .map(clamp_verification_score)
            .unwrap_or(FALLBACK_SCORE);
        let correspondence = extract_int_field(&raw, "content_correspondence")
            .or_else(|| extract_int_field(&raw, "correspondence"))
            .map(clamp_verification_score)
            .unwrap_or(FALLBACK_SCORE);
        Ok(VerificationDraft {
            source_credibility: credibility,
            content_correspondence: correspondence,
            adversary_comment: truncate(&raw, 300),
            verified_by: self.id,
        })
    }

    async fn defend_one(&self, key: &str, citation: &Citation) -> DebateResult<String> {
        let comment = citation
            .verification
            .adversary_comment
            .as_deref()
            .unwrap_or_default();
        let prompt = format!(
            "You are defending your team's citation that was criticized by the opponent.\n\n\
             Your citation: [{key}]\n\
             Source: {url}\n\n\
             Opponent's criticism:\n{comment}\n\n\
             Write a brief, professional response (2-3 sentences) that acknowledges valid \
             criticism, clarifies misunderstandings about the source, and adds context where \
             helpful. Do not be defensive or dismissive. Respond with the text only.",
            url = citation.source_url,
        );

        let raw = self
            .gateway
            .invoke(self.id, &self.model, Some(SYSTEM_PROMPT), &prompt, &self.params)
            .await?;
        Ok(truncate(raw.trim(), 600))
    }
}

#[async_trait]
impl Agent for FactCheckerAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn execute(&self, context: &AgentContext) -> DebateResult<AgentResponse> {
        let mut intents = Vec::new();
        let mut warnings = Vec::new();
        let mut defended = Vec::new();
        let mut verified = Vec::new();
        let mut calls = 0u32;

        // Defense pass.
        let to_defend: Vec<(String, Citation)> = self
            .own_citations_to_defend(context)
            .into_iter()
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();
        for (key, citation) in &to_defend {
            let response = self.defend_one(key, citation).await?;
            calls += 1;
            intents.push(Intent::SetProponentResponse {
                team: self.team,
                key: key.clone(),
                response,
            });
            defended.push(key.clone());
        }

        // Offense pass.
        let to_verify: Vec<(String, Citation)> = self
            .opponent_citations_to_verify(context)
            .into_iter()
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();
        for (key, citation) in &to_verify {
            let verification = self.verify_one(key, citation, &mut warnings).await?;
            calls += 1;
            intents.push(Intent::SetVerification {
                team: self.team.opponent(),
                key: key.clone(),
                verification,
            });
            verified.push(key.clone());
        }

        let output = json!({
            "citations_verified": verified,
            "defenses_made": defended,
        });

        Ok(AgentResponse {
            agent: self.id,
            success: true,
            output,
            intents,
            errors: Vec::new(),
            warnings,
            cost_estimate: self.cost_per_call * calls as f64,
        })
    }
}
