//! Provider Retry
//!
//! Wraps any `LlmProvider` so that rate limits and transient outages are
//! retried with exponential backoff, while permanent failures (bad key,
//! malformed request) surface immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
};

/// Exponential backoff policy
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Growth factor applied after every retry
    pub multiplier: f64,

    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (zero-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        what,
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Provider decorator applying a `RetryPolicy` to every call
pub struct RetryingProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrap with the default policy
    pub fn with_defaults(inner: Arc<dyn LlmProvider>) -> Self {
        Self::new(inner, RetryPolicy::default())
    }
}

#[async_trait]
impl LlmProvider for RetryingProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        self.inner.info().await
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.policy
            .run("complete", || self.inner.complete(messages, options))
            .await
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        // Only opening the stream is retried; a stream that fails midway surfaces.
        self.policy
            .run("complete_stream", || self.inner.complete_stream(messages, options))
            .await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.inner.list_models().await
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        self.inner.estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::mock::{ScriptedProvider, ScriptedReply};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            attempts: 5,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(300),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retries_rate_limit_then_succeeds() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            ScriptedReply::Fail(AgentError::RateLimited("429".into())),
            ScriptedReply::Text("ok".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let completion = provider
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(completion.content, "ok");
        assert_eq!(inner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            ScriptedReply::Fail(AgentError::Auth("bad key".into())),
            ScriptedReply::Text("never".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), fast_policy(3));

        let result = provider
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(AgentError::Auth(_))));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            ScriptedReply::Fail(AgentError::ProviderUnavailable("503".into())),
            ScriptedReply::Fail(AgentError::ProviderUnavailable("503".into())),
            ScriptedReply::Text("too late".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), fast_policy(2));

        let result = provider
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await;
        assert!(matches!(result, Err(AgentError::ProviderUnavailable(_))));
        assert_eq!(inner.call_count(), 2);
    }
}
