//! Append-only JSONL traces: kernel events and raw model calls.
//!
//! `events.jsonl` records every kernel-level event in the order the kernel
//! observed it. `raw_calls.jsonl` records every LLM call, and every batch
//! as exactly one entry, never N. Both files are single-writer and strictly
//! append-only; entries are compact JSON, one per line.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DebateResult;
use crate::phase::DebatePhase;
use crate::provider::CallParams;
use crate::state::types::AgentId;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const RAW_CALLS_FILE: &str = "raw_calls.jsonl";

/// Kernel-level events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelEvent {
    PhaseTransition {
        from: DebatePhase,
        to: DebatePhase,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    TurnStarted {
        turn: u64,
        agent: AgentId,
        phase: DebatePhase,
        round: u32,
        timestamp: DateTime<Utc>,
    },
    TurnCompleted {
        turn: u64,
        agent: AgentId,
        cost: f64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TurnFailed {
        turn: u64,
        agent: AgentId,
        kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    FileUpdated {
        doc: String,
        operation: String,
        agent: AgentId,
        timestamp: DateTime<Utc>,
    },
    AgentWarning {
        agent: AgentId,
        message: String,
        timestamp: DateTime<Utc>,
    },
    CheckpointSaved {
        turn: u64,
        total_cost: f64,
        timestamp: DateTime<Utc>,
    },
    VoteAggregate {
        round_sequence: u32,
        average_score: f64,
        for_count: usize,
        against_count: usize,
        timestamp: DateTime<Utc>,
    },
    BudgetExhausted {
        turn: u64,
        agent: AgentId,
        timestamp: DateTime<Utc>,
    },
}

/// Append-only writer for `events.jsonl`.
pub struct EventLog {
    file: Mutex<File>,
}

impl EventLog {
    pub fn open(debate_dir: &Path) -> DebateResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(debate_dir.join(EVENTS_FILE))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn append(&self, event: &KernelEvent) -> DebateResult<()> {
        let line = serde_json::to_string(event)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("event log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// One single (non-batched) model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCallRecord {
    pub timestamp: DateTime<Utc>,
    pub debate_id: String,
    pub agent: AgentId,
    pub model: String,
    pub parameters: CallParams,
    pub input: RawCallInput,
    pub output: RawCallOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCallInput {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCallOutput {
    pub response: String,
    pub length_chars: usize,
    pub length_lines: usize,
}

impl RawCallOutput {
    pub fn from_response(response: &str) -> Self {
        Self {
            response: response.to_string(),
            length_chars: response.chars().count(),
            length_lines: response.lines().count(),
        }
    }
}

/// One batched fan-out, logged as a single entry with `call_type: "batch"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatchRecord {
    pub timestamp: DateTime<Utc>,
    pub debate_id: String,
    pub agent: AgentId,
    pub model: String,
    pub call_type: String,
    pub parameters: CallParams,
    pub batch_size: usize,
    pub prompts: Vec<String>,
    pub responses: Vec<String>,
    pub avg_length_chars: f64,
}

impl RawBatchRecord {
    pub fn new(
        debate_id: &str,
        agent: AgentId,
        model: &str,
        parameters: CallParams,
        prompts: Vec<String>,
        responses: Vec<String>,
    ) -> Self {
        let avg_length_chars = if responses.is_empty() {
            0.0
        } else {
            responses.iter().map(|r| r.chars().count()).sum::<usize>() as f64
                / responses.len() as f64
        };
        Self {
            timestamp: Utc::now(),
            debate_id: debate_id.to_string(),
            agent,
            model: model.to_string(),
            call_type: "batch".to_string(),
            parameters,
            batch_size: prompts.len(),
            prompts,
            responses,
            avg_length_chars,
        }
    }
}

/// Append-only writer for `raw_calls.jsonl`.
pub struct RawCallLog {
    file: Mutex<File>,
}

impl RawCallLog {
    pub fn open(debate_dir: &Path) -> DebateResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(debate_dir.join(RAW_CALLS_FILE))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn log_call(&self, record: &RawCallRecord) -> DebateResult<()> {
        self.append_line(&serde_json::to_string(record)?)
    }

    pub fn log_batch(&self, record: &RawBatchRecord) -> DebateResult<()> {
        self.append_line(&serde_json::to_string(record)?)
    }

    fn append_line(&self, line: &str) -> DebateResult<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("raw call log lock poisoned"))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }
}

/// Count the lines of a JSONL file (absent file counts as zero).
pub fn count_lines(path: &Path) -> DebateResult<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().count())
}
