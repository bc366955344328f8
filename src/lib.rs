//! Adversarial debate orchestration kernel.
//!
//! Two AI teams debate a contested topic across four phases while a crowd of
//! personas votes round by round. The moderator kernel drives a fixed turn
//! schedule, mediates all agent communication through permission-filtered
//! views of four canonical JSON documents, tracks cost with adaptive
//! research tiering, and checkpoints so a crash resumes without replaying
//! paid LLM calls.
//!
//! # Architecture
//!
//! - [`state`]: the four canonical documents, the permission matrix, and
//!   the single-writer atomic store.
//! - [`phase`] / [`schedule`]: the phase machine and the deterministic turn
//!   schedule.
//! - [`agents`]: the five agent contracts behind one `execute(context)`
//!   interface, returning typed file-update intents.
//! - [`runner`]: the single code path every turn passes through (invoke,
//!   validate, apply, log).
//! - [`cost`]: budget presets and research tiering.
//! - [`checkpoint`]: crash-safe snapshots and the resume contract.
//! - [`fanout`]: logged provider gateway with first-class batch fan-out.
//! - [`moderator`]: the kernel that composes all of the above.
//! - [`outputs`]: artifacts derived from the documents at the end.

pub mod agents;
pub mod checkpoint;
pub mod config;
pub mod cost;
pub mod error;
pub mod fanout;
pub mod logs;
pub mod moderator;
pub mod outputs;
pub mod phase;
pub mod provider;
pub mod runner;
pub mod schedule;
pub mod state;

pub use agents::{Agent, AgentContext, AgentResponse, Intent, TurnMetadata};
pub use checkpoint::{Checkpoint, CheckpointStore, TeamAssignments};
pub use config::DebateConfig;
pub use cost::{CostBudget, CostGovernor, CostPreset, ResearchLimits, ResearchTier};
pub use error::{DebateError, DebateResult};
pub use fanout::ProviderGateway;
pub use logs::{EventLog, KernelEvent, RawCallLog};
pub use moderator::{tie_break_stance, Moderator, StepOutcome};
pub use phase::{DebatePhase, PhaseMachine};
pub use provider::{CallParams, ModelClient, OpenAiCompatClient};
pub use runner::AgentRunner;
pub use schedule::{build_schedule, TurnDuty, TurnSpec};
pub use state::{AgentId, Stance, StateStore, Team};
