//! Groq LLM Provider
//!
//! Implementation of `LlmProvider` for Groq's hosted inference, which speaks
//! the OpenAI chat-completions protocol.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
        ProviderInfo, StreamChunk, TokenUsage,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Groq provider configuration
#[derive(Clone, Debug)]
pub struct GroqConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GroqConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.groq.com/openai/v1";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.into(),
            timeout_secs: 120,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Groq LLM provider
pub struct GroqProvider {
    client: reqwest::Client,
    config: GroqConfig,
}

impl GroqProvider {
    /// Create from configuration
    pub fn new(config: GroqConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn request_body(messages: &[Message], options: &GenerationOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: options.model.clone(),
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stop: options.stop_sequences.clone(),
            stream,
        }
    }

    async fn post_chat(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        tracing::debug!(model = %body.model, stream = body.stream, "Sending Groq request");

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response).await
    }
}

fn network_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

/// Map non-success HTTP statuses onto agent errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Groq returned error");

    Err(match status.as_u16() {
        429 => AgentError::RateLimited(body),
        401 | 403 => AgentError::Auth("Invalid API key or insufficient permissions".into()),
        s if s >= 500 => AgentError::ProviderUnavailable(format!("HTTP {s}: {body}")),
        s => AgentError::Provider(format!("HTTP {s}: {body}")),
    })
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "Groq".into(),
            models,
            supports_streaming: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Groq health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let body = Self::request_body(messages, options, false);
        let response: ChatResponse = self
            .post_chat(&body)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            model: response.model.unwrap_or_else(|| options.model.clone()),
            usage: response.usage.map(Into::into),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::parse),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let body = Self::request_body(messages, options, true);
        let response = self.post_chat(&body).await?;
        let bytes = Box::pin(response.bytes_stream());

        let stream = futures::stream::unfold(
            (bytes, SseBuffer::default(), false),
            |(mut bytes, mut buffer, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    if let Some(data) = buffer.next_data() {
                        let item = parse_sse_data(&data);
                        let done = matches!(&item, Ok(chunk) if chunk.done) || item.is_err();
                        return Some((item, (bytes, buffer, done)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.push(&chunk),
                        Some(Err(e)) => {
                            return Some((Err(network_error(e)), (bytes, buffer, true)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(network_error)?;

        let list: ModelList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                context_length: m.context_window,
            })
            .collect())
    }
}

/// Accumulates raw SSE bytes and yields complete `data:` payloads
#[derive(Default)]
struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
    }

    fn next_data(&mut self) -> Option<String> {
        loop {
            let newline = self.pending.find('\n')?;
            let line: String = self.pending.drain(..=newline).collect();
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                return Some(data.trim().to_string());
            }
        }
    }
}

fn parse_sse_data(data: &str) -> Result<StreamChunk> {
    if data == "[DONE]" {
        return Ok(StreamChunk {
            delta: String::new(),
            done: true,
            usage: None,
        });
    }

    let chunk: StreamResponse = serde_json::from_str(data)?;
    let delta = chunk
        .choices
        .first()
        .and_then(|c| c.delta.content.clone())
        .unwrap_or_default();
    let usage = chunk
        .usage
        .or_else(|| chunk.x_groq.and_then(|x| x.usage))
        .map(Into::into);

    Ok(StreamChunk {
        delta,
        done: false,
        usage,
    })
}

// Wire types

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for TokenUsage {
    fn from(u: ApiUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
    x_groq: Option<GroqExtra>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct GroqExtra {
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ApiModel>,
}

#[derive(Deserialize)]
struct ApiModel {
    id: String,
    context_window: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> GroqProvider {
        GroqProvider::new(GroqConfig::new("test-key").with_base_url(server.uri())).unwrap()
    }

    fn options() -> GenerationOptions {
        GenerationOptions::default().with_stop(["\nObservation:".to_string()])
    }

    #[tokio::test]
    async fn test_complete_sends_stop_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gemma2-9b-it",
                "stop": ["\nObservation:"],
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gemma2-9b-it",
                "choices": [{
                    "message": {"role": "assistant", "content": "Final Answer: 89"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = provider(&server)
            .await
            .complete(&[Message::user("12 * 7 + 5?")], &options())
            .await
            .unwrap();
        assert_eq!(completion.content, "Final Answer: 89");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 14);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        for (status, check) in [
            (429_u16, (|e: &AgentError| matches!(e, AgentError::RateLimited(_))) as fn(&AgentError) -> bool),
            (401, |e| matches!(e, AgentError::Auth(_))),
            (503, |e| matches!(e, AgentError::ProviderUnavailable(_))),
            (400, |e| matches!(e, AgentError::Provider(_))),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = provider(&server)
                .await
                .complete(&[Message::user("hi")], &options())
                .await
                .unwrap_err();
            assert!(check(&err), "status {status} mapped to {err:?}");
        }
    }

    #[tokio::test]
    async fn test_stream_reassembles_sse() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Mulch \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"helps.\"}}],\"x_groq\":{\"usage\":{\"prompt_tokens\":3,\"completion_tokens\":2,\"total_tokens\":5}}}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = provider(&server)
            .await
            .complete_stream(&[Message::user("mulch?")], &options())
            .await
            .unwrap();

        let mut text = String::new();
        let mut usage = None;
        let mut done = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            text.push_str(&chunk.delta);
            usage = chunk.usage.or(usage);
            done = chunk.done;
        }
        assert_eq!(text, "Mulch helps.");
        assert_eq!(usage.unwrap().total_tokens, 5);
        assert!(done);
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "gemma2-9b-it", "context_window": 8192}]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server).await;
        let models = provider.list_models().await.unwrap();
        assert_eq!(models[0].id, "gemma2-9b-it");
        assert_eq!(models[0].context_length, Some(8192));
        assert!(provider.health_check().await.unwrap());
    }

    #[test]
    fn test_sse_buffer_handles_split_lines() {
        let mut buffer = SseBuffer::default();
        buffer.push(b": keep-alive\ndata: {\"a\"");
        assert!(buffer.next_data().is_none());
        buffer.push(b":1}\n");
        assert_eq!(buffer.next_data().as_deref(), Some("{\"a\":1}"));
    }
}
