//! The narrow provider-invocation contract.
//!
//! The kernel depends on exactly two operations from an LLM client: a single
//! chat completion and an N-way batch. Auth, rate limiting, streaming, and
//! HTTP-level retries are the client's concern. Model selection per role is
//! configuration.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DebateResult;

pub use http::OpenAiCompatClient;

/// Sampling and limit parameters for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParams {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Wall-clock timeout for the call.
    pub timeout_secs: u64,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 120,
        }
    }
}

impl CallParams {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// A model client. Implementations map transport failures to
/// `DebateError::ProviderTransient` (retryable) or
/// `DebateError::ProviderPermanent` (turn-fatal).
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// One chat completion.
    async fn invoke(
        &self,
        model: &str,
        system: Option<&str>,
        user: &str,
        params: &CallParams,
    ) -> DebateResult<String>;

    /// N completions for N prompts, order-preserving. The default loops
    /// `invoke`; callers wanting bounded concurrency go through the
    /// gateway's fan-out instead.
    async fn invoke_batch(
        &self,
        model: &str,
        prompts: &[String],
        params: &CallParams,
    ) -> DebateResult<Vec<String>> {
        let mut responses = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            responses.push(self.invoke(model, None, prompt, params).await?);
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    #[async_trait]
    impl ModelClient for Upper {
        async fn invoke(
            &self,
            _model: &str,
            _system: Option<&str>,
            user: &str,
            _params: &CallParams,
        ) -> DebateResult<String> {
            Ok(user.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let client = Upper;
        let prompts = vec!["one".to_string(), "two".to_string()];
        let out = client
            .invoke_batch("m", &prompts, &CallParams::default())
            .await
            .unwrap();
        assert_eq!(out, vec!["ONE", "TWO"]);
    }

    #[test]
    fn test_params_builders() {
        let p = CallParams::default()
            .with_temperature(0.2)
            .with_max_tokens(100)
            .with_timeout_secs(30);
        assert_eq!(p.temperature, 0.2);
        assert_eq!(p.max_tokens, 100);
        assert_eq!(p.timeout_secs, 30);
    }
}
