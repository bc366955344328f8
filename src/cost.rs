//! Budget tracking and adaptive research tiering.
//!
//! The governor owns the per-debate budget, decides the research tier before
//! every debator turn, and accumulates actual spend per agent and per phase.
//! An overshoot past the debate cap is logged but never aborts; the cost of
//! the current turn has already been incurred.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::phase::DebatePhase;
use crate::state::types::AgentId;

/// Named budget presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostPreset {
    Conservative,
    Balanced,
    Premium,
}

impl FromStr for CostPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown cost preset: {other}")),
        }
    }
}

impl fmt::Display for CostPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conservative => write!(f, "conservative"),
            Self::Balanced => write!(f, "balanced"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Research depth selected for a debator turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchTier {
    Deep,
    Standard,
    Quick,
    None,
}

impl fmt::Display for ResearchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deep => write!(f, "deep"),
            Self::Standard => write!(f, "standard"),
            Self::Quick => write!(f, "quick"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Cost budget for one debate. The token limits are provider-specific
/// numbers surfaced as configuration; the context default stays below the
/// 200k step in provider pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBudget {
    pub max_per_debate: f64,
    pub max_per_deep_research: f64,
    pub max_deep_research_calls: u32,
    pub max_grounding_queries: u32,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub max_research_secs: u64,
    pub quick_search_threshold: f64,
    /// Wall-clock timeout for any single provider call.
    pub call_timeout_secs: u64,
}

impl CostBudget {
    pub fn conservative() -> Self {
        Self {
            max_per_debate: 2.0,
            max_per_deep_research: 1.0,
            max_deep_research_calls: 2,
            max_grounding_queries: 10,
            max_context_tokens: 100_000,
            max_output_tokens: 8_000,
            max_research_secs: 180,
            quick_search_threshold: 1.0,
            call_timeout_secs: 120,
        }
    }

    pub fn balanced() -> Self {
        Self {
            max_per_debate: 5.0,
            max_per_deep_research: 2.0,
            max_deep_research_calls: 4,
            max_grounding_queries: 20,
            max_context_tokens: 180_000,
            max_output_tokens: 15_000,
            max_research_secs: 300,
            quick_search_threshold: 1.0,
            call_timeout_secs: 120,
        }
    }

    pub fn premium() -> Self {
        Self {
            max_per_debate: 15.0,
            max_per_deep_research: 3.0,
            max_deep_research_calls: 6,
            max_grounding_queries: 40,
            max_context_tokens: 300_000,
            max_output_tokens: 30_000,
            max_research_secs: 600,
            quick_search_threshold: 1.0,
            call_timeout_secs: 120,
        }
    }

    pub fn for_preset(preset: CostPreset) -> Self {
        match preset {
            CostPreset::Conservative => Self::conservative(),
            CostPreset::Balanced => Self::balanced(),
            CostPreset::Premium => Self::premium(),
        }
    }

    /// The per-call limits a research turn must honor.
    pub fn research_limits(&self) -> ResearchLimits {
        ResearchLimits {
            max_queries: self.max_grounding_queries,
            max_context_tokens: self.max_context_tokens,
            max_output_tokens: self.max_output_tokens,
            timeout_secs: self.max_research_secs,
        }
    }
}

/// Limits surfaced to a debator for one research call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchLimits {
    pub max_queries: u32,
    pub max_context_tokens: u32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

/// Spend summary for `status` output and end-of-debate logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub total_cost: f64,
    pub remaining_budget: f64,
    pub research_count: u32,
    pub deep_research_count: u32,
    pub by_agent: BTreeMap<String, f64>,
    pub by_phase: BTreeMap<String, f64>,
    pub budget_utilization_pct: f64,
}

/// Tracks cumulative spend and selects research tiers.
#[derive(Debug, Clone)]
pub struct CostGovernor {
    budget: CostBudget,
    total: f64,
    by_agent: BTreeMap<String, f64>,
    by_phase: BTreeMap<String, f64>,
    research_count: u32,
    deep_research_count: u32,
}

impl CostGovernor {
    pub fn new(budget: CostBudget) -> Self {
        Self {
            budget,
            total: 0.0,
            by_agent: BTreeMap::new(),
            by_phase: BTreeMap::new(),
            research_count: 0,
            deep_research_count: 0,
        }
    }

    /// Rebuild from checkpointed totals.
    pub fn restore(budget: CostBudget, total: f64, by_agent: BTreeMap<String, f64>) -> Self {
        let deep_research_count = 0; // recomputed from completed turns by the caller
        Self {
            budget,
            total,
            by_agent,
            by_phase: BTreeMap::new(),
            research_count: 0,
            deep_research_count,
        }
    }

    pub fn budget(&self) -> &CostBudget {
        &self.budget
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn by_agent(&self) -> &BTreeMap<String, f64> {
        &self.by_agent
    }

    pub fn remaining(&self) -> f64 {
        (self.budget.max_per_debate - self.total).max(0.0)
    }

    pub fn set_deep_research_count(&mut self, count: u32) {
        self.deep_research_count = count;
    }

    /// Pick the research tier for the next debator turn from the remaining
    /// budget. Exhausted budget never aborts; the turn proceeds at NONE.
    pub fn research_tier(&self) -> ResearchTier {
        let remaining = self.remaining();
        if remaining >= self.budget.max_per_deep_research
            && self.deep_research_count < self.budget.max_deep_research_calls
        {
            ResearchTier::Deep
        } else if remaining >= self.budget.quick_search_threshold {
            ResearchTier::Standard
        } else if remaining > 0.0 {
            ResearchTier::Quick
        } else {
            ResearchTier::None
        }
    }

    /// Record the actual spend of a completed turn.
    pub fn record_turn(&mut self, agent: AgentId, phase: DebatePhase, cost: f64, tier: Option<ResearchTier>) {
        self.total += cost;
        *self.by_agent.entry(agent.to_string()).or_insert(0.0) += cost;
        *self.by_phase.entry(phase.to_string()).or_insert(0.0) += cost;

        if let Some(tier) = tier {
            if tier != ResearchTier::None {
                self.research_count += 1;
            }
            if tier == ResearchTier::Deep {
                self.deep_research_count += 1;
            }
        }

        if self.total > self.budget.max_per_debate {
            tracing::warn!(
                total = self.total,
                cap = self.budget.max_per_debate,
                "debate budget overshot"
            );
        }
    }

    pub fn report(&self) -> CostReport {
        CostReport {
            total_cost: round2(self.total),
            remaining_budget: round2(self.remaining()),
            research_count: self.research_count,
            deep_research_count: self.deep_research_count,
            by_agent: self
                .by_agent
                .iter()
                .map(|(k, v)| (k.clone(), round2(*v)))
                .collect(),
            by_phase: self
                .by_phase
                .iter()
                .map(|(k, v)| (k.clone(), round2(*v)))
                .collect(),
            budget_utilization_pct: round2(self.total / self.budget.max_per_debate * 100.0),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Nominal per-tier research cost estimates, used by debators when the
/// provider does not report usage.
pub fn tier_cost_estimate(tier: ResearchTier) -> f64 {
    match tier {
        ResearchTier::Deep => 3.0,
        ResearchTier::Standard => 1.0,
        ResearchTier::Quick => 0.10,
        ResearchTier::None => 0.0,
    }
}
