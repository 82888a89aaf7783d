//! Chat Service
//!
//! Ties the agent to sessions. Every accepted user turn is followed by
//! exactly one assistant turn: the answer, a best-effort answer, or an
//! apology when the provider failed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::events::AgentEvent;
use crate::reasoning::{Agent, AgentOutcome, RunContext, RunStatus};
use crate::session::{Session, SessionId, SessionManager};

pub struct ChatService {
    agent: Arc<Agent>,
    sessions: Arc<SessionManager>,
}

impl ChatService {
    pub fn new(agent: Arc<Agent>, sessions: Arc<SessionManager>) -> Self {
        Self { agent, sessions }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Answer `question` within session `id`.
    ///
    /// Holds the session lock for the whole run, so questions of one
    /// session are answered in order. The run owns its session handle in
    /// a task of its own: dropping the returned future does not stop it
    /// from appending the assistant turn.
    pub async fn ask(&self, id: &SessionId, question: &str, ctx: RunContext) -> Result<AgentOutcome> {
        let question = validate_question(question)?.to_string();
        let handle = self.sessions.get(id).await?;
        let agent = self.agent.clone();

        tokio::spawn(async move {
            let mut session = handle.lock().await;
            answer_in(&agent, &mut session, &question, ctx).await
        })
        .await
        .map_err(|e| AgentError::Other(format!("Answer task failed: {e}")))
    }

    /// Like [`ChatService::ask`], streaming step events as they happen.
    ///
    /// Fails only if the question is empty or the session is unknown; the
    /// run itself always ends with a `FinalAnswer` event.
    pub async fn ask_streaming(
        &self,
        id: &SessionId,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<UnboundedReceiverStream<AgentEvent>> {
        let question = validate_question(question)?.to_string();
        let handle = self.sessions.get(id).await?;
        let agent = self.agent.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut session = handle.lock().await;
            let ctx = RunContext::new().with_cancel(cancel).with_events(tx.clone());
            let outcome = answer_in(&agent, &mut session, &question, ctx).await;
            if outcome.status == RunStatus::Failed {
                let _ = tx.send(AgentEvent::FinalAnswer {
                    answer: outcome.answer,
                    status: outcome.status,
                    iterations: outcome.iterations,
                    tool_calls: outcome.tool_calls,
                });
            }
        });

        Ok(UnboundedReceiverStream::new(rx))
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AgentError::Session("Question must not be empty".into()));
    }
    Ok(question)
}

/// Append the user turn, run the agent, append one assistant turn
async fn answer_in(agent: &Agent, session: &mut Session, question: &str, ctx: RunContext) -> AgentOutcome {
    session.conversation.push_user(question);

    let outcome = match agent.run(&session.conversation, ctx).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(session = %session.id, error = %e, "Agent run failed");
            AgentOutcome {
                answer: e.user_message(),
                status: RunStatus::Failed,
                steps: Vec::new(),
                iterations: 0,
                tool_calls: 0,
            }
        }
    };

    session.conversation.push_assistant(outcome.answer.clone());
    session.touch();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::mock::ScriptedProvider;
    use crate::reasoning::AgentBuilder;
    use crate::tool::{Tool, ToolResult, ToolSchema};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::time::Duration;

    fn service(provider: ScriptedProvider) -> ChatService {
        let agent = AgentBuilder::new().provider(Arc::new(provider)).build().unwrap();
        ChatService::new(Arc::new(agent), Arc::new(SessionManager::new()))
    }

    /// Takes ten seconds per call
    struct SlowLookup;

    #[async_trait]
    impl Tool for SlowLookup {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "lookup".into(),
                description: "slow lookup".into(),
                category: None,
            }
        }

        async fn execute(&self, input: &str) -> Result<ToolResult> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolResult::success("lookup", format!("notes on {input}")))
        }
    }

    /// Looks the question up once, then answers it by name
    fn slow_service() -> ChatService {
        let provider = ScriptedProvider::from_fn(|messages| {
            let prompt = &messages[1].content;
            let question = prompt
                .lines()
                .find_map(|l| l.strip_prefix("Question: "))
                .unwrap_or_default()
                .to_string();
            if prompt.contains("Observation: notes on") {
                Ok(format!("Final Answer: answer to {question}"))
            } else {
                Ok(format!("Thought: look it up\nAction: lookup\nAction Input: {question}"))
            }
        });
        let agent = AgentBuilder::new()
            .provider(Arc::new(provider))
            .tool(SlowLookup)
            .build()
            .unwrap();
        ChatService::new(Arc::new(agent), Arc::new(SessionManager::new()))
    }

    fn transcript(session: &Session) -> Vec<(Role, String)> {
        session
            .conversation
            .messages()
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_one_assistant_turn_per_question() {
        let chat = service(ScriptedProvider::texts([
            "Final Answer: first",
            "Final Answer: second",
        ]));
        let id = chat.sessions().create().await.lock().await.id.clone();

        chat.ask(&id, "q1", RunContext::new()).await.unwrap();
        chat.ask(&id, "q2", RunContext::new()).await.unwrap();

        let handle = chat.sessions().get(&id).await.unwrap();
        let session = handle.lock().await;
        let roles: Vec<Role> = session.conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(session.conversation.last().unwrap().content, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_still_gets_answer_appended() {
        let chat = slow_service();
        let id = chat.sessions().create().await.lock().await.id.clone();

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            chat.ask(&id, "soil pH", RunContext::new()),
        )
        .await;
        assert!(abandoned.is_err());

        // the lock is released only once the run has finished
        let handle = chat.sessions().get(&id).await.unwrap();
        let session = handle.lock().await;
        let turns = transcript(&session);
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], (Role::User, "soil pH".to_string()));
        assert_eq!(turns[2], (Role::Assistant, "answer to soil pH".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_questions_are_serialized() {
        let chat = slow_service();
        let id = chat.sessions().create().await.lock().await.id.clone();

        let (first, second) = tokio::join!(
            chat.ask(&id, "mulch", RunContext::new()),
            chat.ask(&id, "cover crops", RunContext::new()),
        );
        assert_eq!(first.unwrap().answer, "answer to mulch");
        assert_eq!(second.unwrap().answer, "answer to cover crops");

        let handle = chat.sessions().get(&id).await.unwrap();
        let turns = transcript(&*handle.lock().await);
        assert_eq!(turns.len(), 5);
        assert_eq!(turns[0].0, Role::Assistant);
        for pair in turns[1..].chunks(2) {
            let (Role::User, question) = &pair[0] else { panic!("expected a user turn: {pair:?}") };
            assert_eq!(pair[1], (Role::Assistant, format!("answer to {question}")));
        }
    }

    #[tokio::test]
    async fn test_provider_failure_appends_apology() {
        let chat = service(ScriptedProvider::unavailable());
        let id = chat.sessions().create().await.lock().await.id.clone();

        let outcome = chat.ask(&id, "hello?", RunContext::new()).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Failed);

        let handle = chat.sessions().get(&id).await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.message_count(), 3);
        assert!(session.conversation.last().unwrap().content.starts_with("Sorry"));
    }

    #[tokio::test]
    async fn test_rejects_empty_question_and_unknown_session() {
        let chat = service(ScriptedProvider::texts(["Final Answer: x"]));
        let id = chat.sessions().create().await.lock().await.id.clone();

        assert!(chat.ask(&id, "   ", RunContext::new()).await.is_err());
        assert!(chat
            .ask(&SessionId::from_string("nope"), "hi", RunContext::new())
            .await
            .is_err());
        let handle = chat.sessions().get(&id).await.unwrap();
        assert_eq!(handle.lock().await.message_count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_appends_answer() {
        let chat = service(ScriptedProvider::texts(["Thought: easy\nFinal Answer: done"]));
        let id = chat.sessions().create().await.lock().await.id.clone();

        let events: Vec<AgentEvent> = chat
            .ask_streaming(&id, "go", CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.last().is_some_and(AgentEvent::is_final));

        let handle = chat.sessions().get(&id).await.unwrap();
        assert_eq!(handle.lock().await.conversation.last().unwrap().content, "done");
    }

    #[tokio::test]
    async fn test_streaming_failure_ends_with_final_event() {
        let chat = service(ScriptedProvider::unavailable());
        let id = chat.sessions().create().await.lock().await.id.clone();

        let events: Vec<AgentEvent> = chat
            .ask_streaming(&id, "go", CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(
            events.last(),
            Some(AgentEvent::FinalAnswer { status: RunStatus::Failed, .. })
        ));
    }
}
