//! Kernel error kinds and their handling policies.
//!
//! Every failure the kernel can observe maps to one of these kinds. Fatal
//! kinds (`is_fatal`) unwind the current debate run; the checkpoint on disk
//! stays intact and resume replays the failed turn. Transient provider
//! errors are the only retryable kind.

use thiserror::Error;

/// Result type alias for kernel operations.
pub type DebateResult<T> = Result<T, DebateError>;

/// Errors raised by the debate kernel.
#[derive(Error, Debug)]
pub enum DebateError {
    /// Phase/round progression violated the state graph.
    #[error("invalid phase transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    /// An agent attempted a read or write outside its permission scope.
    #[error("permission denied: {agent} may not {action}")]
    PermissionDenied { agent: String, action: String },

    /// An intent payload was malformed.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A citation key allocation would reuse an existing key. Indicates a
    /// kernel bug; never retried.
    #[error("citation key collision: {0}")]
    KeyCollision(String),

    /// An `add_citation` intent originated from a closing-phase turn.
    #[error("citation rule violation: {0}")]
    CitationRuleViolation(String),

    /// An agent's structured output could not be recovered even through the
    /// fallback extractors.
    #[error("unrecoverable parse failure for {agent}: {detail}")]
    ParseFailure { agent: String, detail: String },

    /// Transient provider failure (5xx, timeout, rate limit). Retried with
    /// exponential backoff at the turn level.
    #[error("transient provider error: {0}")]
    ProviderTransient(String),

    /// Permanent provider failure (auth, quota). Fails the turn; the debate
    /// aborts with the checkpoint preserved.
    #[error("permanent provider error: {0}")]
    ProviderPermanent(String),

    /// The governor reports zero remaining budget at a mandatory turn.
    /// Logged and downgraded to the NONE research tier; never aborts.
    #[error("debate budget exhausted")]
    BudgetExhausted,

    /// A resume was requested but no checkpoint exists.
    #[error("no checkpoint found for debate {0}")]
    CheckpointMissing(String),

    /// A checkpoint was written by a newer kernel than this one.
    #[error("checkpoint version {found} is newer than supported version {supported}")]
    CheckpointVersion { found: u32, supported: u32 },

    /// An agent turn failed after retries were exhausted.
    #[error("agent {agent} failed: {detail}")]
    AgentFailed { agent: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DebateError {
    /// Whether this error may be retried (turn restarted from scratch).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_))
    }

    /// Whether this error must abort the debate run.
    ///
    /// Fatal kinds indicate a contract violation, not an environmental
    /// failure; retrying would reproduce them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::PermissionDenied { .. }
                | Self::SchemaViolation(_)
                | Self::KeyCollision(_)
                | Self::CitationRuleViolation(_)
        )
    }

    /// Short machine-readable kind name, used in event records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::SchemaViolation(_) => "schema_violation",
            Self::KeyCollision(_) => "key_collision",
            Self::CitationRuleViolation(_) => "citation_rule_violation",
            Self::ParseFailure { .. } => "parse_failure",
            Self::ProviderTransient(_) => "provider_transient",
            Self::ProviderPermanent(_) => "provider_permanent",
            Self::BudgetExhausted => "budget_exhausted",
            Self::CheckpointMissing(_) => "checkpoint_missing",
            Self::CheckpointVersion { .. } => "checkpoint_version",
            Self::AgentFailed { .. } => "agent_failed",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DebateError::ProviderTransient("503".into()).is_retryable());
        assert!(!DebateError::ProviderPermanent("401".into()).is_retryable());
        assert!(!DebateError::BudgetExhausted.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DebateError::KeyCollision("a_1".into()).is_fatal());
        assert!(DebateError::CitationRuleViolation("closing".into()).is_fatal());
        assert!(DebateError::SchemaViolation("bad".into()).is_fatal());
        assert!(!DebateError::ProviderTransient("timeout".into()).is_fatal());
        assert!(!DebateError::BudgetExhausted.is_fatal());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(
            DebateError::InvalidTransition {
                from: "init".into(),
                to: "closing".into()
            }
            .kind(),
            "invalid_transition"
        );
        assert_eq!(DebateError::BudgetExhausted.kind(), "budget_exhausted");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = DebateError::PermissionDenied {
            agent: "crowd".into(),
            action: "read citation_pool".into(),
        };
        assert!(err.to_string().contains("crowd"));
        assert!(err.to_string().contains("read citation_pool"));
    }
}
