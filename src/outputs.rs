//! Final artifacts, derived as pure functions of the canonical documents.
//!
//! Written under `outputs/` at the end of CLOSING:
//! - `transcript_full.md`: the public transcript with citation keys
//!   linkified to their source URLs, plus team notes as supplementary
//!   sections.
//! - `citation_ledger.json`: the citation pool reformatted for auditing.
//! - `debate_logic_map.json`: the latent document.
//! - `voter_sentiment_graph.csv`: one row per voter, one column per
//!   voting round.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::DebateResult;
use crate::state::store::{write_json_atomic, StateStore};
use crate::state::types::{CitationPool, CrowdOpinion, History, Team};

pub const OUTPUT_DIR: &str = "outputs";
pub const TRANSCRIPT_FILE: &str = "transcript_full.md";
pub const LEDGER_FILE: &str = "citation_ledger.json";
pub const LOGIC_MAP_FILE: &str = "debate_logic_map.json";
pub const SENTIMENT_FILE: &str = "voter_sentiment_graph.csv";

/// Render all four artifacts.
pub fn write_outputs(debate_dir: &Path, store: &StateStore) -> DebateResult<()> {
    let out = debate_dir.join(OUTPUT_DIR);
    fs::create_dir_all(&out)?;

    fs::write(
        out.join(TRANSCRIPT_FILE),
        render_transcript(store.history(), store.citations()),
    )?;
    write_json_atomic(&out.join(LEDGER_FILE), &render_ledger(store.citations()))?;
    write_json_atomic(&out.join(LOGIC_MAP_FILE), store.latent())?;
    fs::write(out.join(SENTIMENT_FILE), render_sentiment_csv(store.crowd()))?;
    Ok(())
}

/// Markdown transcript with `[a_1]` markers turned into links.
pub fn render_transcript(history: &History, pool: &CitationPool) -> String {
    let mut lines = vec![
        "# Debate Transcript".to_string(),
        String::new(),
        format!("**Topic**: {}", history.topic),
        format!("**Debate ID**: {}", history.debate_id),
        format!(
            "**Started**: {} UTC",
            history.metadata.created_at.format("%Y-%m-%d %H:%M:%S")
        ),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for turn in &history.public_transcript {
        lines.push(format!(
            "## Round {} — Team {} ({})",
            turn.round,
            turn.speaker.as_str().to_uppercase(),
            turn.round_label
        ));
        lines.push(String::new());
        lines.push(linkify(&turn.statement, pool));
        lines.push(String::new());
        if !turn.citations_used.is_empty() {
            lines.push(format!("*Citations: {}*", turn.citations_used.join(", ")));
            lines.push(String::new());
        }
        lines.push("---".to_string());
        lines.push(String::new());
    }

    let has_notes = [Team::A, Team::B]
        .iter()
        .any(|t| !history.team_notes.for_team(*t).is_empty());
    if has_notes {
        lines.push("## Supplementary Materials".to_string());
        lines.push(String::new());
        for team in [Team::A, Team::B] {
            let notes = history.team_notes.for_team(team);
            if notes.is_empty() {
                continue;
            }
            lines.push(format!("### Team {}", team.as_str().to_uppercase()));
            lines.push(String::new());
            for note in notes {
                lines.push("<details>".to_string());
                lines.push(format!("<summary>Round {}</summary>", note.round));
                lines.push(String::new());
                lines.push(note.supplementary_material.clone());
                lines.push("</details>".to_string());
                lines.push(String::new());
            }
        }
    }

    lines.join("\n")
}

fn linkify(statement: &str, pool: &CitationPool) -> String {
    let mut rendered = statement.to_string();
    for team in [Team::A, Team::B] {
        for (key, citation) in pool.team_citations(team) {
            let marker = format!("[{key}]");
            let link = format!("[{key}]({})", citation.source_url);
            rendered = rendered.replace(&marker, &link);
        }
    }
    rendered
}

#[derive(Debug, Serialize)]
struct LedgerEntry {
    key: String,
    team: Team,
    source_url: String,
    added_by: String,
    added_in_round: u32,
    source_credibility: Option<u8>,
    content_correspondence: Option<u8>,
    adversary_comment: Option<String>,
    proponent_response: Option<String>,
    verified_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct Ledger {
    debate_id: String,
    citation_count: usize,
    citations: Vec<LedgerEntry>,
}

fn render_ledger(pool: &CitationPool) -> Ledger {
    let mut citations = Vec::new();
    for team in [Team::A, Team::B] {
        for (key, citation) in pool.team_citations(team) {
            citations.push(LedgerEntry {
                key: key.clone(),
                team,
                source_url: citation.source_url.clone(),
                added_by: citation.added_by.to_string(),
                added_in_round: citation.added_in_round,
                source_credibility: citation.verification.source_credibility,
                content_correspondence: citation.verification.content_correspondence,
                adversary_comment: citation.verification.adversary_comment.clone(),
                proponent_response: citation.verification.proponent_response.clone(),
                verified_by: citation.verification.verified_by.map(|a| a.to_string()),
            });
        }
    }
    Ledger {
        debate_id: pool.debate_id.clone(),
        citation_count: citations.len(),
        citations,
    }
}

/// `voter_id,persona,round_0,round_1,...` rows, one per voter.
pub fn render_sentiment_csv(crowd: &CrowdOpinion) -> String {
    let max_round = crowd
        .voters
        .iter()
        .flat_map(|v| v.voting_record.iter().map(|e| e.round_sequence))
        .max()
        .unwrap_or(0);

    let mut header = vec!["voter_id".to_string(), "persona".to_string()];
    for round in 0..=max_round {
        header.push(format!("round_{round}"));
    }

    let mut lines = vec![header.join(",")];
    for voter in &crowd.voters {
        let mut row = vec![voter.voter_id.clone(), csv_escape(&voter.persona)];
        for round in 0..=max_round {
            let score = voter
                .voting_record
                .iter()
                .find(|e| e.round_sequence == round)
                .map(|e| e.score.to_string())
                .unwrap_or_default();
            row.push(score);
        }
        lines.push(row.join(","));
    }
    lines.join("\n") + "\n"
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
