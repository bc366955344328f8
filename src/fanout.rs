//! Provider gateway: logged single calls and first-class batch fan-out.
//!
//! Every model call the kernel makes goes through this gateway so that
//! `raw_calls.jsonl` stays complete. A batch suppresses per-call logging by
//! construction: the member calls bypass the single-call path and the
//! gateway emits exactly one batch entry. Fan-out runs the member calls
//! concurrently under a bounded in-flight cap, preserving prompt order.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::error::{DebateError, DebateResult};
use crate::logs::{RawBatchRecord, RawCallInput, RawCallLog, RawCallOutput, RawCallRecord};
use crate::provider::{CallParams, ModelClient};
use crate::state::types::AgentId;

pub struct ProviderGateway {
    client: Arc<dyn ModelClient>,
    raw_log: Arc<RawCallLog>,
    debate_id: String,
    concurrency: usize,
}

impl ProviderGateway {
    pub fn new(
        client: Arc<dyn ModelClient>,
        raw_log: Arc<RawCallLog>,
        debate_id: &str,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            raw_log,
            debate_id: debate_id.to_string(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn debate_id(&self) -> &str {
        &self.debate_id
    }

    /// One logged model call.
    pub async fn invoke(
        &self,
        agent: AgentId,
        model: &str,
        system: Option<&str>,
        user: &str,
        params: &CallParams,
    ) -> DebateResult<String> {
        let response = self.client.invoke(model, system, user, params).await?;

        self.raw_log.log_call(&RawCallRecord {
            timestamp: Utc::now(),
            debate_id: self.debate_id.clone(),
            agent,
            model: model.to_string(),
            parameters: params.clone(),
            input: RawCallInput {
                system_prompt: system.map(String::from),
                user_prompt: user.to_string(),
            },
            output: RawCallOutput::from_response(&response),
        })?;

        Ok(response)
    }

    /// N-way fan-out logged as a single batch entry.
    ///
    /// Member calls run concurrently with at most `concurrency` in flight;
    /// responses come back in prompt order. A member call that fails yields
    /// an empty response (the caller's parse path turns it into an abstain)
    /// rather than poisoning the whole batch.
    pub async fn invoke_batch(
        &self,
        agent: AgentId,
        model: &str,
        prompts: Vec<String>,
        params: &CallParams,
    ) -> DebateResult<Vec<String>> {
        if prompts.is_empty() {
            return Err(DebateError::SchemaViolation("empty batch".into()));
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(prompts.len());

        for prompt in &prompts {
            let semaphore = Arc::clone(&semaphore);
            let client = Arc::clone(&self.client);
            let model = model.to_string();
            let prompt = prompt.clone();
            let params = params.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                client.invoke(&model, None, &prompt, &params).await
            }));
        }

        let mut responses = Vec::with_capacity(handles.len());
        for handle in handles {
            let response = match handle.await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "batch member call failed");
                    String::new()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "batch member task panicked");
                    String::new()
                }
            };
            responses.push(response);
        }

        self.raw_log.log_batch(&RawBatchRecord::new(
            &self.debate_id,
            agent,
            model,
            params.clone(),
            prompts,
            responses.clone(),
        ))?;

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{count_lines, RAW_CALLS_FILE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingClient {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl CountingClient {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CountingClient {
        async fn invoke(
            &self,
            _model: &str,
            _system: Option<&str>,
            user: &str,
            _params: &CallParams,
        ) -> DebateResult<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            if user.contains("fail-me") {
                return Err(DebateError::ProviderTransient("boom".into()));
            }
            Ok(format!("echo: {user}"))
        }
    }

    fn gateway(dir: &std::path::Path, client: Arc<dyn ModelClient>, concurrency: usize) -> ProviderGateway {
        let raw_log = Arc::new(RawCallLog::open(dir).unwrap());
        ProviderGateway::new(client, raw_log, "d-test", concurrency)
    }

    #[tokio::test]
    async fn test_single_call_logged() {
        let dir = tempdir().unwrap();
        let gw = gateway(dir.path(), Arc::new(CountingClient::new()), 4);

        let out = gw
            .invoke(AgentId::Judge, "m", Some("sys"), "analyze", &CallParams::default())
            .await
            .unwrap();
        assert_eq!(out, "echo: analyze");
        assert_eq!(count_lines(&dir.path().join(RAW_CALLS_FILE)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_single_log_entry_order_preserved() {
        let dir = tempdir().unwrap();
        let client = Arc::new(CountingClient::new());
        let gw = gateway(dir.path(), client.clone(), 3);

        let prompts: Vec<String> = (0..10).map(|i| format!("p{i}")).collect();
        let out = gw
            .invoke_batch(AgentId::Crowd, "m", prompts, &CallParams::default())
            .await
            .unwrap();

        assert_eq!(out.len(), 10);
        for (i, response) in out.iter().enumerate() {
            assert_eq!(response, &format!("echo: p{i}"));
        }
        // One log line for ten calls.
        assert_eq!(count_lines(&dir.path().join(RAW_CALLS_FILE)).unwrap(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 10);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_batch_member_failure_yields_empty_response() {
        let dir = tempdir().unwrap();
        let gw = gateway(dir.path(), Arc::new(CountingClient::new()), 2);

        let prompts = vec!["ok".to_string(), "fail-me".to_string(), "ok2".to_string()];
        let out = gw
            .invoke_batch(AgentId::Crowd, "m", prompts, &CallParams::default())
            .await
            .unwrap();
        assert_eq!(out[0], "echo: ok");
        assert_eq!(out[1], "");
        assert_eq!(out[2], "echo: ok2");
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let dir = tempdir().unwrap();
        let gw = gateway(dir.path(), Arc::new(CountingClient::new()), 2);
        assert!(gw
            .invoke_batch(AgentId::Crowd, "m", vec![], &CallParams::default())
            .await
            .is_err());
    }
}
