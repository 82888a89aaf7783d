//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference, as an
//! alternative to the hosted Groq backend.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionStream, FinishReason, GenerationOptions, LlmProvider,
        ModelInfo, ProviderInfo, StreamChunk, TokenUsage,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use ollama_rs::{
    generation::{
        chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    },
    models::ModelOptions as OllamaOptions,
    Ollama,
};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Connection timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let config = OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        };

        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Create with default localhost settings
    pub fn localhost() -> Self {
        Self::from_config(OllamaConfig::default())
    }

    /// Convert agent messages to Ollama format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    /// Convert Ollama response to agent completion
    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        Completion {
            content: response.message.content,
            model: model.to_string(),
            usage: response.final_data.as_ref().map(|d| usage(d.prompt_eval_count, d.eval_count)),
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
            .stop(opts.stop_sequences.clone())
    }

    fn request(messages: &[Message], options: &GenerationOptions) -> ChatMessageRequest {
        ChatMessageRequest::new(options.model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(options))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        let models = self.list_models().await.unwrap_or_default();

        Ok(ProviderInfo {
            name: "Ollama".into(),
            models,
            supports_streaming: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        tracing::debug!(model = %options.model, host = %self.config.host, "Sending Ollama request");

        let response = self.client
            .send_chat_messages(Self::request(messages, options))
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self::convert_completion(response, &options.model))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let stream = self.client
            .send_chat_messages_stream(Self::request(messages, options))
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        // Transform the stream
        let mapped = stream.map(|result| {
            result
                .map(|chunk| StreamChunk {
                    delta: chunk.message.content,
                    done: chunk.done,
                    usage: chunk.final_data.as_ref().map(|d| usage(d.prompt_eval_count, d.eval_count)),
                })
                .map_err(|_| AgentError::Provider("Ollama stream failed".into()))
        });

        Ok(Box::pin(mapped))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self.client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name,
                context_length: None, // Not exposed by Ollama API
            })
            .collect())
    }
}

fn usage(prompt: u64, completion: u64) -> TokenUsage {
    let clamp = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
    TokenUsage {
        prompt_tokens: clamp(prompt),
        completion_tokens: clamp(completion),
        total_tokens: clamp(prompt.saturating_add(completion)),
    }
}
