//! Environment-driven configuration.
//!
//! Precedence (highest to lowest):
//! 1. CLI flags (`run --rounds 3 --preset premium`)
//! 2. Environment variables (`DEBATE_*`)
//! 3. Built-in defaults
//!
//! Only the keys listed here are recognized; anything else in the
//! environment is ignored.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cost::CostPreset;
use crate::error::{DebateError, DebateResult};

const ENV_API_KEY: &str = "DEBATE_API_KEY";
const ENV_API_BASE_URL: &str = "DEBATE_API_BASE_URL";
const ENV_DEBATOR_MODEL: &str = "DEBATE_DEBATOR_MODEL";
const ENV_JUDGE_MODEL: &str = "DEBATE_JUDGE_MODEL";
const ENV_FACTCHECKER_MODEL: &str = "DEBATE_FACTCHECKER_MODEL";
const ENV_CROWD_MODEL: &str = "DEBATE_CROWD_MODEL";
const ENV_ROUNDS: &str = "DEBATE_ROUNDS";
const ENV_CROWD_SIZE: &str = "DEBATE_CROWD_SIZE";
const ENV_COST_PRESET: &str = "DEBATE_COST_PRESET";
const ENV_BIAS_THRESHOLD: &str = "DEBATE_BIAS_THRESHOLD";

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_DEBATOR_MODEL: &str = "gpt-4o";
const DEFAULT_JUDGE_MODEL: &str = "gpt-4o";
const DEFAULT_FACTCHECKER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CROWD_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ROUNDS: u32 = 2;
const DEFAULT_CROWD_SIZE: usize = 100;
const DEFAULT_BIAS_THRESHOLD: f64 = 0.6;
const DEFAULT_FANOUT_CONCURRENCY: usize = 10;

/// Per-role model assignment. Every role defaults to the configured
/// OpenAI-compatible endpoint; model selection per role is a configuration
/// concern, not an architectural one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleModels {
    pub debator: String,
    pub judge: String,
    pub factchecker: String,
    pub crowd: String,
}

impl Default for RoleModels {
    fn default() -> Self {
        Self {
            debator: env::var(ENV_DEBATOR_MODEL)
                .unwrap_or_else(|_| DEFAULT_DEBATOR_MODEL.to_string()),
            judge: env::var(ENV_JUDGE_MODEL).unwrap_or_else(|_| DEFAULT_JUDGE_MODEL.to_string()),
            factchecker: env::var(ENV_FACTCHECKER_MODEL)
                .unwrap_or_else(|_| DEFAULT_FACTCHECKER_MODEL.to_string()),
            crowd: env::var(ENV_CROWD_MODEL).unwrap_or_else(|_| DEFAULT_CROWD_MODEL.to_string()),
        }
    }
}

/// Top-level configuration for a debate run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// API key for the provider endpoint. Empty is allowed for offline
    /// commands (`status`) and stubbed test runs.
    pub api_key: String,
    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    pub api_base_url: String,
    pub models: RoleModels,
    /// Number of rebuttal rounds (rounds 2…1+R).
    pub rounds: u32,
    /// Number of crowd personas.
    pub crowd_size: usize,
    /// Cost budget preset.
    pub preset: CostPreset,
    /// Vote-0 bias share above which the minority team gets the 1.25x
    /// resource multiplier.
    pub bias_threshold: f64,
    /// Maximum in-flight provider calls during a crowd fan-out.
    pub fanout_concurrency: usize,
    /// When false (default), an exhausted agent failure aborts the debate
    /// with the checkpoint intact.
    pub continue_on_agent_failure: bool,
    /// Root directory under which per-debate directories are created.
    pub debates_root: PathBuf,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            api_key: env::var(ENV_API_KEY).unwrap_or_default(),
            api_base_url: env::var(ENV_API_BASE_URL)
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            models: RoleModels::default(),
            rounds: parse_env(ENV_ROUNDS).unwrap_or(DEFAULT_ROUNDS),
            crowd_size: parse_env(ENV_CROWD_SIZE).unwrap_or(DEFAULT_CROWD_SIZE),
            preset: env::var(ENV_COST_PRESET)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(CostPreset::Balanced),
            bias_threshold: parse_env(ENV_BIAS_THRESHOLD).unwrap_or(DEFAULT_BIAS_THRESHOLD),
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
            continue_on_agent_failure: false,
            debates_root: PathBuf::from("debates"),
        }
    }
}

impl DebateConfig {
    /// Build from environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Validate the configuration; rejects values the kernel cannot run with.
    pub fn validate(&self) -> DebateResult<()> {
        if self.rounds == 0 {
            return Err(DebateError::Config("rounds must be > 0".into()));
        }
        if self.crowd_size == 0 {
            return Err(DebateError::Config("crowd_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.bias_threshold) {
            return Err(DebateError::Config(format!(
                "bias_threshold must be in [0, 1], got {}",
                self.bias_threshold
            )));
        }
        if self.fanout_concurrency == 0 {
            return Err(DebateError::Config("fanout_concurrency must be > 0".into()));
        }
        Ok(())
    }

    /// Directory of a specific debate.
    pub fn debate_dir(&self, debate_id: &str) -> PathBuf {
        self.debates_root.join(debate_id)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = DebateConfig {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            models: RoleModels {
                debator: DEFAULT_DEBATOR_MODEL.into(),
                judge: DEFAULT_JUDGE_MODEL.into(),
                factchecker: DEFAULT_FACTCHECKER_MODEL.into(),
                crowd: DEFAULT_CROWD_MODEL.into(),
            },
            rounds: DEFAULT_ROUNDS,
            crowd_size: DEFAULT_CROWD_SIZE,
            preset: CostPreset::Balanced,
            bias_threshold: DEFAULT_BIAS_THRESHOLD,
            fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
            continue_on_agent_failure: false,
            debates_root: PathBuf::from("debates"),
        };
        cfg.validate().expect("default config should be valid");
    }

    #[test]
    fn zero_rounds_rejected() {
        let cfg = DebateConfig {
            rounds: 0,
            ..test_cfg()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_crowd_rejected() {
        let cfg = DebateConfig {
            crowd_size: 0,
            ..test_cfg()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_threshold_rejected() {
        let cfg = DebateConfig {
            bias_threshold: 1.5,
            ..test_cfg()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debate_dir_joins_root() {
        let cfg = test_cfg();
        assert_eq!(cfg.debate_dir("abc"), PathBuf::from("debates/abc"));
    }

    fn test_cfg() -> DebateConfig {
        DebateConfig {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.into(),
            models: RoleModels {
                debator: "m".into(),
                judge: "m".into(),
                factchecker: "m".into(),
                crowd: "m".into(),
            },
            rounds: 2,
            crowd_size: 10,
            preset: CostPreset::Balanced,
            bias_threshold: 0.6,
            fanout_concurrency: 4,
            continue_on_agent_failure: false,
            debates_root: PathBuf::from("debates"),
        }
    }
}
