//! The moderator kernel.
//!
//! Composes the store, phase machine, governor, checkpoint store, logs, and
//! agents; walks the fixed schedule; processes Vote 0 into team assignments;
//! checkpoints at the mandated points; and renders the output artifacts at
//! the end of CLOSING.
//!
//! Entry points are `launch` (new debate) and `resume` (from checkpoint).
//! The resume path never reaches `StateStore::create`: that branch is taken
//! before any initializer is reachable, so an existing debate can never be
//! reinitialized.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::agents::{
    Agent, AgentContext, CrowdAgent, DebatorAgent, FactCheckerAgent, JudgeAgent, TurnMetadata,
};
use crate::checkpoint::{
    Checkpoint, CheckpointStore, CompletedTurn, CostSnapshot, TeamAssignments, CHECKPOINT_VERSION,
};
use crate::config::DebateConfig;
use crate::cost::{CostBudget, CostGovernor, ResearchTier};
use crate::error::{DebateError, DebateResult};
use crate::fanout::ProviderGateway;
use crate::logs::{EventLog, KernelEvent, RawCallLog};
use crate::outputs;
use crate::phase::{DebatePhase, PhaseMachine};
use crate::provider::ModelClient;
use crate::runner::AgentRunner;
use crate::schedule::{build_schedule, TurnDuty, TurnSpec};
use crate::state::store::StateStore;
use crate::state::types::{AgentId, Role, Stance, Team};

/// Result of one `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One turn executed; more remain.
    Advanced,
    /// The schedule is exhausted and artifacts are written.
    Finished,
}

struct TeamAgents {
    debator_a: DebatorAgent,
    debator_b: DebatorAgent,
    factchecker_a: FactCheckerAgent,
    factchecker_b: FactCheckerAgent,
}

impl std::fmt::Debug for Moderator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Moderator")
            .field("debate_id", &self.debate_id)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

pub struct Moderator {
    debate_id: String,
    topic: String,
    config: DebateConfig,
    dir: PathBuf,
    store: StateStore,
    machine: PhaseMachine,
    governor: CostGovernor,
    checkpoints: CheckpointStore,
    events: EventLog,
    gateway: Arc<ProviderGateway>,
    runner: AgentRunner,
    schedule: Vec<TurnSpec>,
    assignments: Option<TeamAssignments>,
    resource_multiplier: f64,
    audience_bias: f64,
    completed_turns: Vec<CompletedTurn>,
    crowd: CrowdAgent,
    judge: JudgeAgent,
    team_agents: Option<TeamAgents>,
}

impl Moderator {
    /// Start a new debate with a generated id.
    pub fn launch(
        topic: &str,
        config: DebateConfig,
        client: Arc<dyn ModelClient>,
    ) -> DebateResult<Self> {
        let debate_id = Uuid::new_v4().to_string();
        Self::launch_with_id(topic, config, client, &debate_id)
    }

    /// Start a new debate under a caller-chosen id.
    pub fn launch_with_id(
        topic: &str,
        config: DebateConfig,
        client: Arc<dyn ModelClient>,
        debate_id: &str,
    ) -> DebateResult<Self> {
        config.validate()?;
        let dir = config.debate_dir(debate_id);
        let checkpoints = CheckpointStore::new(&dir);
        if checkpoints.exists() {
            return Err(DebateError::Config(format!(
                "debate {debate_id} already has a checkpoint; use resume"
            )));
        }

        let store = StateStore::create(&dir, debate_id, topic)?;
        Self::assemble(
            topic,
            config,
            client,
            debate_id,
            dir,
            store,
            checkpoints,
            PhaseMachine::new(),
            None,
            1.0,
            0.5,
            Vec::new(),
            None,
        )
    }

    /// Resume a debate from its checkpoint. Fails without one and never
    /// touches the canonical documents beyond reading them.
    pub fn resume(
        debate_id: &str,
        config: DebateConfig,
        client: Arc<dyn ModelClient>,
    ) -> DebateResult<Self> {
        config.validate()?;
        let dir = config.debate_dir(debate_id);
        let checkpoints = CheckpointStore::new(&dir);
        let checkpoint = checkpoints.load()?;

        let store = StateStore::open(&dir)?;
        let machine = PhaseMachine::from_position(
            checkpoint.phase,
            checkpoint.round_number,
            checkpoint.turn_count,
            checkpoint.current_speaker,
        );

        tracing::info!(
            debate_id,
            topic = %checkpoint.topic,
            turn_count = checkpoint.turn_count,
            cost = checkpoint.costs.total,
            "resuming from checkpoint"
        );

        Self::assemble(
            &checkpoint.topic.clone(),
            config,
            client,
            debate_id,
            dir,
            store,
            checkpoints,
            machine,
            checkpoint.team_assignments.clone(),
            checkpoint.resource_multiplier,
            checkpoint.audience_bias,
            checkpoint.completed_turns.clone(),
            Some(checkpoint.deep_research_turns()),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        topic: &str,
        config: DebateConfig,
        client: Arc<dyn ModelClient>,
        debate_id: &str,
        dir: PathBuf,
        store: StateStore,
        checkpoints: CheckpointStore,
        machine: PhaseMachine,
        assignments: Option<TeamAssignments>,
        resource_multiplier: f64,
        audience_bias: f64,
        completed_turns: Vec<CompletedTurn>,
        deep_research_done: Option<u32>,
    ) -> DebateResult<Self> {
        let events = EventLog::open(&dir)?;
        let raw_log = Arc::new(RawCallLog::open(&dir)?);
        let gateway = Arc::new(ProviderGateway::new(
            client,
            raw_log,
            debate_id,
            config.fanout_concurrency,
        ));

        let mut governor = CostGovernor::new(CostBudget::for_preset(config.preset));
        if let Some(deep) = deep_research_done {
            let by_agent = completed_turns.iter().fold(
                std::collections::BTreeMap::new(),
                |mut acc: std::collections::BTreeMap<String, f64>, t| {
                    *acc.entry(t.agent.to_string()).or_insert(0.0) += t.cost;
                    acc
                },
            );
            let total = completed_turns.iter().map(|t| t.cost).sum();
            governor = CostGovernor::restore(CostBudget::for_preset(config.preset), total, by_agent);
            governor.set_deep_research_count(deep);
        }

        let crowd = CrowdAgent::new(Arc::clone(&gateway), &config.models.crowd, config.crowd_size);
        let judge = JudgeAgent::new(Arc::clone(&gateway), &config.models.judge);

        let team_agents = assignments.as_ref().map(|assignments| {
            Self::build_team_agents(&gateway, &config, assignments.team_a.stance)
        });

        let schedule = build_schedule(config.rounds);

        Ok(Self {
            debate_id: debate_id.to_string(),
            topic: topic.to_string(),
            config,
            dir,
            store,
            machine,
            governor,
            checkpoints,
            events,
            gateway,
            runner: AgentRunner::new(),
            schedule,
            assignments,
            resource_multiplier,
            audience_bias,
            completed_turns,
            crowd,
            judge,
            team_agents,
        })
    }

    fn build_team_agents(
        gateway: &Arc<ProviderGateway>,
        config: &DebateConfig,
        team_a_stance: Stance,
    ) -> TeamAgents {
        TeamAgents {
            debator_a: DebatorAgent::new(
                Team::A,
                team_a_stance,
                Arc::clone(gateway),
                &config.models.debator,
            ),
            debator_b: DebatorAgent::new(
                Team::B,
                team_a_stance.opposite(),
                Arc::clone(gateway),
                &config.models.debator,
            ),
            factchecker_a: FactCheckerAgent::new(
                Team::A,
                Arc::clone(gateway),
                &config.models.factchecker,
            ),
            factchecker_b: FactCheckerAgent::new(
                Team::B,
                Arc::clone(gateway),
                &config.models.factchecker,
            ),
        }
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn phase(&self) -> DebatePhase {
        self.machine.phase()
    }

    pub fn turn_count(&self) -> u64 {
        self.machine.turn_count()
    }

    /// The next scheduled turn, if any remain.
    pub fn next_turn_spec(&self) -> Option<&TurnSpec> {
        self.schedule.get(self.machine.turn_count() as usize)
    }

    /// Run to completion. Interruption is the caller's concern: dropping
    /// the returned future between suspension points leaves the documents
    /// consistent and the last checkpoint on disk, so `resume` continues at
    /// the first uncompleted turn.
    pub async fn run(&mut self) -> DebateResult<()> {
        while self.step().await? != StepOutcome::Finished {}
        Ok(())
    }

    /// Execute the next scheduled turn (or finish). Resume idempotence lives
    /// here: the machine's turn count indexes straight into the schedule, so
    /// completed turns are never replayed.
    pub async fn step(&mut self) -> DebateResult<StepOutcome> {
        let index = self.machine.turn_count() as usize;
        if index >= self.schedule.len() {
            self.finalize()?;
            return Ok(StepOutcome::Finished);
        }
        let spec = self.schedule[index].clone();

        self.sync_phase_and_round(&spec)?;

        let context = self.build_context(&spec);

        if spec.agent.role() == Role::Debator
            && spec.duty != TurnDuty::ClosingStatement
            && context.metadata.research_tier == ResearchTier::None
        {
            self.events.append(&KernelEvent::BudgetExhausted {
                turn: self.machine.turn_count() + 1,
                agent: spec.agent,
                timestamp: Utc::now(),
            })?;
        }

        // Field-level borrows: the agent reference must stay disjoint from
        // the store/machine/governor borrows taken by the runner below.
        let team_agents = self.team_agents.as_ref();
        let missing_teams = || {
            DebateError::SchemaViolation(format!(
                "turn {} scheduled before team assignment",
                spec.index
            ))
        };
        let agent: &dyn Agent = match spec.agent {
            AgentId::Crowd => &self.crowd,
            AgentId::Judge => &self.judge,
            AgentId::DebatorA => &team_agents.ok_or_else(missing_teams)?.debator_a,
            AgentId::DebatorB => &team_agents.ok_or_else(missing_teams)?.debator_b,
            AgentId::FactcheckerA => &team_agents.ok_or_else(missing_teams)?.factchecker_a,
            AgentId::FactcheckerB => &team_agents.ok_or_else(missing_teams)?.factchecker_b,
            AgentId::Moderator => {
                return Err(DebateError::SchemaViolation(
                    "moderator cannot be scheduled as an agent".into(),
                ))
            }
        };

        let outcome = match self
            .runner
            .run_turn(
                agent,
                &spec,
                context,
                &mut self.store,
                &mut self.machine,
                &mut self.governor,
                &self.events,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) if self.config.continue_on_agent_failure && !e.is_fatal() => {
                // The turn mutated nothing; mark it spent and move on.
                tracing::warn!(
                    agent = %spec.agent,
                    error = %e,
                    "turn failed; continuing per configuration"
                );
                self.machine.next_turn(spec.agent);
                crate::runner::TurnOutcome {
                    turn: self.machine.turn_count(),
                    agent: spec.agent,
                    action: crate::runner::action_name(spec.duty).to_string(),
                    cost: 0.0,
                    duration_secs: 0.0,
                    research_tier: None,
                    output: serde_json::Value::Null,
                }
            }
            Err(e) => return Err(e),
        };

        self.completed_turns.push(CompletedTurn {
            turn: outcome.turn,
            agent: outcome.agent,
            action: outcome.action.clone(),
            phase: spec.phase,
            round: spec.round,
            cost: outcome.cost,
            duration_secs: outcome.duration_secs,
            research_tier: outcome.research_tier,
            timestamp: Utc::now(),
        });

        if spec.agent == AgentId::Crowd {
            self.emit_vote_aggregate(&spec)?;
        }
        if spec.duty == TurnDuty::VoteZero {
            self.process_vote_zero()?;
        }

        if self.should_checkpoint(&spec) {
            self.save_checkpoint()?;
        }

        Ok(StepOutcome::Advanced)
    }

    /// Align the phase machine with the schedule position, emitting
    /// transition events and checkpoints at boundaries.
    fn sync_phase_and_round(&mut self, spec: &TurnSpec) -> DebateResult<()> {
        if spec.phase != self.machine.phase() {
            let from = self.machine.phase();
            self.machine
                .transition_to(spec.phase, &format!("entering {}", spec.phase))?;
            self.events.append(&KernelEvent::PhaseTransition {
                from,
                to: spec.phase,
                reason: format!("schedule reached {}", spec.phase),
                timestamp: Utc::now(),
            })?;
            self.save_checkpoint()?;
        }

        if spec.round != self.machine.round_number() {
            match spec.phase {
                DebatePhase::Closing => self.machine.enter_pseudo_round(spec.round)?,
                _ => {
                    self.machine.next_round()?;
                }
            }
        }
        Ok(())
    }

    fn build_context(&self, spec: &TurnSpec) -> AgentContext {
        let metadata = match spec.agent.team() {
            Some(team) => {
                let (stance, opponent_stance) = match &self.assignments {
                    Some(assignments) => {
                        let own = match team {
                            Team::A => assignments.team_a.stance,
                            Team::B => assignments.team_b.stance,
                        };
                        (Some(own), Some(own.opposite()))
                    }
                    None => (None, None),
                };
                let research_tier = if spec.agent.role() == Role::Debator
                    && spec.duty != TurnDuty::ClosingStatement
                {
                    self.governor.research_tier()
                } else {
                    ResearchTier::None
                };
                let research_limits = (research_tier != ResearchTier::None)
                    .then(|| self.governor.budget().research_limits());
                TurnMetadata {
                    stance,
                    opponent_stance,
                    resource_multiplier: self.resource_multiplier,
                    multiplier_team: (self.resource_multiplier > 1.0).then_some(Team::B),
                    research_tier,
                    research_limits,
                }
            }
            None => TurnMetadata::neutral(),
        };

        AgentContext {
            debate_id: self.debate_id.clone(),
            topic: self.topic.clone(),
            phase: spec.phase,
            round: spec.round,
            round_label: spec.round_label,
            duty: spec.duty,
            state: self.store.read_for(spec.agent),
            instructions: spec.instructions(),
            metadata,
        }
    }

    /// Tally Vote 0, assign teams (majority stance becomes Team A, ties
    /// break on a coin flip seeded by the debate id), compute the audience
    /// bias and the minority team's resource multiplier, and build the
    /// team-bound agents.
    fn process_vote_zero(&mut self) -> DebateResult<()> {
        let (for_count, against_count) = {
            let crowd = self.store.crowd();
            let mut for_count = 0usize;
            let mut against_count = 0usize;
            for voter in &crowd.voters {
                if let Some(entry) = voter
                    .voting_record
                    .iter()
                    .find(|e| e.round_sequence == 0)
                {
                    if entry.score > 50 {
                        for_count += 1;
                    } else {
                        against_count += 1;
                    }
                }
            }
            (for_count, against_count)
        };
        let total = for_count + against_count;
        if total == 0 {
            return Err(DebateError::SchemaViolation(
                "vote 0 recorded no ballots".into(),
            ));
        }

        let team_a_stance = if for_count > against_count {
            Stance::For
        } else if against_count > for_count {
            Stance::Against
        } else {
            tie_break_stance(&self.debate_id)
        };

        self.audience_bias = for_count.max(against_count) as f64 / total as f64;
        self.resource_multiplier = if self.audience_bias > self.config.bias_threshold {
            1.25
        } else {
            1.0
        };

        let assignments = TeamAssignments::new(team_a_stance);
        self.team_agents = Some(Self::build_team_agents(
            &self.gateway,
            &self.config,
            team_a_stance,
        ));
        self.assignments = Some(assignments);

        tracing::info!(
            for_count,
            against_count,
            team_a = %team_a_stance,
            bias = self.audience_bias,
            multiplier = self.resource_multiplier,
            "vote 0 processed"
        );
        Ok(())
    }

    fn emit_vote_aggregate(&self, spec: &TurnSpec) -> DebateResult<()> {
        let crowd = self.store.crowd();
        let Some(summary) = crowd
            .vote_rounds
            .iter()
            .find(|r| r.round_sequence == spec.round)
        else {
            return Ok(());
        };
        let mut for_count = 0usize;
        let mut against_count = 0usize;
        for voter in &crowd.voters {
            if let Some(entry) = voter
                .voting_record
                .iter()
                .find(|e| e.round_sequence == spec.round)
            {
                if entry.score > 50 {
                    for_count += 1;
                } else {
                    against_count += 1;
                }
            }
        }
        self.events.append(&KernelEvent::VoteAggregate {
            round_sequence: spec.round,
            average_score: summary.average_score,
            for_count,
            against_count,
            timestamp: Utc::now(),
        })
    }

    /// Checkpoint after Vote 0, every debator turn, and every judge turn.
    /// Phase transitions checkpoint inside `sync_phase_and_round`.
    fn should_checkpoint(&self, spec: &TurnSpec) -> bool {
        spec.duty == TurnDuty::VoteZero
            || matches!(spec.agent.role(), Role::Debator | Role::Judge)
    }

    fn save_checkpoint(&self) -> DebateResult<()> {
        let checkpoint = Checkpoint {
            version: CHECKPOINT_VERSION,
            debate_id: self.debate_id.clone(),
            topic: self.topic.clone(),
            saved_at: Utc::now(),
            phase: self.machine.phase(),
            round_number: self.machine.round_number(),
            turn_count: self.machine.turn_count(),
            current_speaker: self.machine.current_speaker(),
            team_assignments: self.assignments.clone(),
            resource_multiplier: self.resource_multiplier,
            audience_bias: self.audience_bias,
            costs: CostSnapshot {
                total: self.governor.total(),
                by_agent: self.governor.by_agent().clone(),
            },
            completed_turns: self.completed_turns.clone(),
        };
        self.checkpoints.save(&checkpoint)?;
        self.events.append(&KernelEvent::CheckpointSaved {
            turn: self.machine.turn_count(),
            total_cost: self.governor.total(),
            timestamp: Utc::now(),
        })?;
        tracing::debug!(
            turn = self.machine.turn_count(),
            cost = self.governor.total(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Close out the debate: final phase transition, final checkpoint, and
    /// derived output artifacts.
    fn finalize(&mut self) -> DebateResult<()> {
        if self.machine.phase() == DebatePhase::Closing {
            self.machine
                .transition_to(DebatePhase::Done, "schedule exhausted")?;
            self.events.append(&KernelEvent::PhaseTransition {
                from: DebatePhase::Closing,
                to: DebatePhase::Done,
                reason: "schedule exhausted".into(),
                timestamp: Utc::now(),
            })?;
            self.save_checkpoint()?;
        }

        outputs::write_outputs(&self.dir, &self.store)?;

        let report = self.governor.report();
        tracing::info!(
            debate_id = %self.debate_id,
            total_cost = report.total_cost,
            utilization_pct = report.budget_utilization_pct,
            "debate complete; artifacts written"
        );
        Ok(())
    }
}

/// Deterministic coin flip for Vote-0 ties, seeded by the debate id.
pub fn tie_break_stance(debate_id: &str) -> Stance {
    if fnv1a64(debate_id.as_bytes()) % 2 == 0 {
        Stance::For
    } else {
        Stance::Against
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
