//! Scripted Provider
//!
//! For testing and demo purposes. Replays a fixed list of replies, or answers
//! through a closure, and records every request it receives.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{
    Completion, CompletionStream, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
    StreamChunk,
};

/// One scripted reply
#[derive(Debug)]
pub enum ScriptedReply {
    /// Return this text as the completion
    Text(String),
    /// Fail the call with this error
    Fail(AgentError),
}

type Responder = Box<dyn Fn(&[Message]) -> Result<String> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<ScriptedReply>>),
    Func(Responder),
}

/// A request captured by the provider
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

/// Mock LLM provider
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    /// Replay `replies` in order; fails with a provider error once exhausted
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(replies.into())),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replay plain texts in order
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| ScriptedReply::Text(t.into())).collect())
    }

    /// Answer every request through `f`
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            script: Script::Func(Box::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails as unavailable
    pub fn unavailable() -> Self {
        Self::from_fn(|_| Err(AgentError::ProviderUnavailable("scripted outage".into())))
    }

    /// Number of completion calls received
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Copy of every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String> {
        match &self.script {
            Script::Queue(queue) => {
                let reply = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                match reply {
                    Some(ScriptedReply::Text(text)) => Ok(text),
                    Some(ScriptedReply::Fail(err)) => Err(err),
                    None => Err(AgentError::Provider("script exhausted".into())),
                }
            }
            Script::Func(f) => f(messages),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "Scripted".into(),
            models: self.list_models().await?,
            supports_streaming: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                messages: messages.to_vec(),
                options: options.clone(),
            });
        let text = self.next_reply(messages)?;
        Ok(Completion::text(text, options.model.clone()))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<CompletionStream> {
        let completion = self.complete(messages, options).await?;
        let chunks: Vec<Result<StreamChunk>> = completion
            .content
            .split_inclusive(' ')
            .map(|word| {
                Ok(StreamChunk {
                    delta: word.to_string(),
                    done: false,
                    usage: None,
                })
            })
            .chain(std::iter::once(Ok(StreamChunk {
                delta: String::new(),
                done: true,
                usage: None,
            })))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "scripted".into(),
            context_length: None,
        }])
    }
}
