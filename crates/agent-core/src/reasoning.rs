//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior:
//!
//! ```text
//! Thinking ──► Acting ──► Observing ──► Thinking ...
//!    │
//!    └──────► Answering ──► Done
//! ```
//!
//! The model sees the transcript, the tool menu and the scratchpad of
//! earlier steps, and answers with either an action or a final answer.
//! Malformed output, unknown tools and failing tools never abort the run;
//! they become observations for the next step.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::events::AgentEvent;
use crate::message::{Conversation, Message};
use crate::parser::{self, ModelOutput, OBSERVATION};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{Tool, ToolCall, ToolRegistry};

/// What to do when the model output matches neither an action nor a final answer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseRecovery {
    /// Feed the format error back as an observation and think again.
    /// After more than `max_retries` consecutive failures the raw text
    /// becomes the final answer.
    Reprompt { max_retries: usize },

    /// Treat the raw text as the final answer straight away
    AcceptRawText,
}

impl Default for ParseRecovery {
    fn default() -> Self {
        ParseRecovery::Reprompt { max_retries: 2 }
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Preamble placed before the tool menu
    pub system_prompt: String,

    /// Maximum reasoning iterations before giving up
    pub max_iterations: usize,

    /// Extra iterations charged for every failed tool backend call
    pub failure_penalty: usize,

    /// Malformed-output policy
    pub parse_recovery: ParseRecovery,

    /// Wall-clock limit for one run, if the caller gives no deadline
    pub time_limit: Option<Duration>,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 10,
            failure_penalty: 1,
            parse_recovery: ParseRecovery::default(),
            time_limit: None,
            generation: GenerationOptions::default(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "Answer the following questions as best you can. You have access to the following tools:";

const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

If no tool is needed, go straight to the Final Answer.

Begin!";

/// Answer used when the loop stops without anything better to say
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

/// Answer used when the run is cancelled before any thought was produced
pub const CANCELLED_MESSAGE: &str = "The request was cancelled before an answer was ready.";

/// Answer used when the model never produced usable text
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I could not work out an answer to that. Could you rephrase the question?";

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The model gave a final answer
    Completed,
    /// The model never followed the format; its raw text was used
    RecoveredFromParse,
    /// The iteration cap was hit; the answer is best-effort
    IterationLimit,
    /// Cancelled or past the deadline; the answer is partial
    Cancelled,
    /// The provider failed; the answer is an apology
    Failed,
}

/// One reasoning iteration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentStep {
    pub thought: String,
    pub tool: Option<String>,
    pub tool_input: Option<String>,
    pub observation: Option<String>,
}

/// Result of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub answer: String,
    pub status: RunStatus,
    pub steps: Vec<AgentStep>,
    pub iterations: usize,
    pub tool_calls: usize,
}

impl AgentOutcome {
    /// Why the run stopped short of a final answer, if it did
    pub fn interruption(&self) -> Option<AgentError> {
        match self.status {
            RunStatus::IterationLimit => Some(AgentError::MaxIterations(self.iterations)),
            RunStatus::Cancelled => Some(AgentError::Cancelled),
            _ => None,
        }
    }
}

/// Per-run cancellation, deadline and event sink
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    events: Option<UnboundedSender<AgentEvent>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn expired(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver must not affect the run.
            let _ = tx.send(event);
        }
    }

    /// Run `fut` unless the token fires or the deadline passes first
    async fn guard<F: Future>(&self, fut: F) -> Option<F::Output> {
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            () = deadline => None,
            out = fut => Some(out),
        }
    }
}

enum State {
    Thinking,
    Acting { step: AgentStep, log: String, tool: String, input: String },
    Observing { step: AgentStep, log: String, observation: String },
    Answering { answer: String, status: RunStatus },
}

#[derive(Default)]
struct Scratch {
    pad: String,
    steps: Vec<AgentStep>,
    iterations: usize,
    tool_calls: usize,
    tool_failures: usize,
    parse_failures: usize,
}

impl Scratch {
    fn last_thought(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .map(|s| s.thought.trim())
            .find(|t| !t.is_empty())
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// System prompt with the tool menu and the ReAct format
    fn build_system_prompt(&self) -> String {
        let names = self.tools.names().join(", ");
        format!(
            "{}\n\n{}\n\n{}",
            self.config.system_prompt,
            self.tools.render_menu(),
            FORMAT_INSTRUCTIONS.replace("{tool_names}", &names),
        )
    }

    fn build_user_prompt(history: &str, question: &str, scratchpad: &str) -> String {
        let mut prompt = String::new();
        if !history.is_empty() {
            prompt.push_str("Conversation so far:\n");
            prompt.push_str(history);
            prompt.push_str("\n\n");
        }
        prompt.push_str("Question: ");
        prompt.push_str(question);
        prompt.push_str("\nThought:");
        prompt.push_str(scratchpad);
        prompt
    }

    /// Every turn before the latest user question
    fn render_history(conversation: &Conversation) -> String {
        let messages = conversation.messages();
        let cut = messages
            .iter()
            .rposition(|m| m.role == crate::message::Role::User)
            .unwrap_or(messages.len());
        messages[..cut]
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run the agent on the latest user turn of `conversation`.
    ///
    /// The conversation is read, never modified; appending the answer is the
    /// caller's job.
    pub async fn run(&self, conversation: &Conversation, ctx: RunContext) -> Result<AgentOutcome> {
        let question = conversation
            .last_user()
            .map(|m| m.content.clone())
            .ok_or_else(|| AgentError::Session("Conversation has no user question".into()))?;

        let ctx = match (ctx.deadline, self.config.time_limit) {
            (None, Some(limit)) => ctx.with_timeout(limit),
            _ => ctx,
        };

        let history = Self::render_history(conversation);
        let system = self.build_system_prompt();
        let options = self
            .config
            .generation
            .clone()
            .with_stop([format!("\n{OBSERVATION}")]);

        let mut scratch = Scratch::default();
        let mut state = State::Thinking;

        loop {
            state = match state {
                State::Thinking => {
                    if ctx.expired() {
                        let answer = scratch.last_thought().unwrap_or(CANCELLED_MESSAGE).to_string();
                        State::Answering { answer, status: RunStatus::Cancelled }
                    } else if scratch.iterations >= self.config.max_iterations {
                        tracing::warn!(
                            max = self.config.max_iterations,
                            tool_failures = scratch.tool_failures,
                            "Iteration limit reached"
                        );
                        let answer = scratch
                            .last_thought()
                            .unwrap_or(ITERATION_LIMIT_MESSAGE)
                            .to_string();
                        State::Answering { answer, status: RunStatus::IterationLimit }
                    } else {
                        scratch.iterations += 1;
                        tracing::debug!(iteration = scratch.iterations, "Thinking");

                        let messages = [
                            Message::system(system.as_str()),
                            Message::user(Self::build_user_prompt(&history, &question, &scratch.pad)),
                        ];
                        match ctx.guard(self.provider.complete(&messages, &options)).await {
                            None => {
                                let answer =
                                    scratch.last_thought().unwrap_or(CANCELLED_MESSAGE).to_string();
                                State::Answering { answer, status: RunStatus::Cancelled }
                            }
                            Some(completion) => {
                                let raw = completion?.content;
                                self.decide(&ctx, &mut scratch, raw)
                            }
                        }
                    }
                }

                State::Acting { mut step, log, tool, input } => {
                    step.tool = Some(tool.clone());
                    step.tool_input = Some(input.clone());

                    match self.tools.resolve_id(&tool) {
                        Err(_) => {
                            tracing::warn!(tool = %tool, "Model named an unknown tool");
                            let observation = format!(
                                "{} is not a valid tool, try one of [{}].",
                                tool,
                                self.tools.names().join(", ")
                            );
                            ctx.emit(AgentEvent::Observation {
                                iteration: scratch.iterations,
                                tool,
                                output: observation.clone(),
                                success: false,
                            });
                            State::Observing { step, log, observation }
                        }
                        Ok(id) => {
                            let call = ToolCall::new(id, self.tools.schema(id).name.clone(), input);
                            ctx.emit(AgentEvent::Action {
                                iteration: scratch.iterations,
                                tool: call.name.clone(),
                                input: call.input.clone(),
                            });
                            scratch.tool_calls += 1;
                            tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");

                            match ctx.guard(self.tools.execute(&call)).await {
                                None => {
                                    let answer = Some(step.thought.trim())
                                        .filter(|t| !t.is_empty())
                                        .or_else(|| scratch.last_thought())
                                        .unwrap_or(CANCELLED_MESSAGE)
                                        .to_string();
                                    scratch.steps.push(step);
                                    State::Answering { answer, status: RunStatus::Cancelled }
                                }
                                Some(result) => {
                                    let (observation, success) = match result {
                                        Ok(result) => (result.output, result.success),
                                        Err(e) => {
                                            scratch.tool_failures += 1;
                                            scratch.iterations += self.config.failure_penalty;
                                            tracing::warn!(
                                                tool = %call.name,
                                                failures = scratch.tool_failures,
                                                error = %e,
                                                "Tool execution failed"
                                            );
                                            (format!("Error: {e}"), false)
                                        }
                                    };
                                    ctx.emit(AgentEvent::Observation {
                                        iteration: scratch.iterations,
                                        tool: call.name,
                                        output: observation.clone(),
                                        success,
                                    });
                                    State::Observing { step, log, observation }
                                }
                            }
                        }
                    }
                }

                State::Observing { mut step, log, observation } => {
                    scratch.pad.push_str(&format!(
                        "{}\n{} {}\nThought:",
                        log.trim_end(),
                        OBSERVATION,
                        observation
                    ));
                    step.observation = Some(observation);
                    scratch.steps.push(step);
                    State::Thinking
                }

                State::Answering { answer, status } => {
                    let outcome = AgentOutcome {
                        answer,
                        status,
                        steps: scratch.steps,
                        iterations: scratch.iterations,
                        tool_calls: scratch.tool_calls,
                    };
                    match outcome.interruption() {
                        Some(reason) => tracing::warn!(
                            iterations = outcome.iterations,
                            tool_calls = outcome.tool_calls,
                            reason = %reason,
                            "Agent run ended with a best-effort answer"
                        ),
                        None => tracing::info!(
                            iterations = outcome.iterations,
                            tool_calls = outcome.tool_calls,
                            status = ?status,
                            "Agent run finished"
                        ),
                    }
                    ctx.emit(AgentEvent::FinalAnswer {
                        answer: outcome.answer.clone(),
                        status,
                        iterations: outcome.iterations,
                        tool_calls: outcome.tool_calls,
                    });
                    return Ok(outcome);
                }
            };
        }
    }

    /// Turn one model completion into the next state
    fn decide(&self, ctx: &RunContext, scratch: &mut Scratch, raw: String) -> State {
        match parser::parse(&raw) {
            Ok(output) => {
                scratch.parse_failures = 0;
                if !output.thought().is_empty() {
                    ctx.emit(AgentEvent::Thought {
                        iteration: scratch.iterations,
                        content: output.thought().to_string(),
                    });
                }
                match output {
                    ModelOutput::Action { thought, tool, input } => State::Acting {
                        step: AgentStep {
                            thought,
                            ..AgentStep::default()
                        },
                        log: raw,
                        tool,
                        input,
                    },
                    ModelOutput::Finish { thought, answer } => {
                        scratch.steps.push(AgentStep {
                            thought,
                            ..AgentStep::default()
                        });
                        State::Answering { answer, status: RunStatus::Completed }
                    }
                }
            }
            Err(e) => {
                scratch.parse_failures += 1;
                tracing::warn!(
                    failures = scratch.parse_failures,
                    error = %e,
                    "Could not parse model output"
                );
                ctx.emit(AgentEvent::ParseError {
                    iteration: scratch.iterations,
                    message: e.to_string(),
                });

                let give_up = match self.config.parse_recovery {
                    ParseRecovery::AcceptRawText => true,
                    ParseRecovery::Reprompt { max_retries } => scratch.parse_failures > max_retries,
                };

                if give_up {
                    let text = raw.trim();
                    let answer = if text.is_empty() { FALLBACK_MESSAGE } else { text };
                    State::Answering {
                        answer: answer.to_string(),
                        status: RunStatus::RecoveredFromParse,
                    }
                } else {
                    let reason = match e {
                        AgentError::Parse(reason) => reason,
                        other => other.to_string(),
                    };
                    State::Observing {
                        step: AgentStep::default(),
                        log: raw,
                        observation: format!("Invalid Format: {reason}"),
                    }
                }
            }
        }
    }

    /// Run with a single question (creates a temporary conversation)
    pub async fn ask(&self, question: &str) -> Result<AgentOutcome> {
        let mut conversation = Conversation::empty();
        conversation.push_user(question);
        self.run(&conversation, RunContext::new()).await
    }

    /// Run in the background and stream step events.
    ///
    /// The last event is always `FinalAnswer`; provider failures become an
    /// apology with `RunStatus::Failed`.
    pub fn stream(
        self: Arc<Self>,
        conversation: Conversation,
        cancel: CancellationToken,
    ) -> UnboundedReceiverStream<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let ctx = RunContext::new().with_cancel(cancel).with_events(tx.clone());
            if let Err(e) = self.run(&conversation, ctx).await {
                tracing::error!(error = %e, "Agent run failed");
                let _ = tx.send(AgentEvent::FinalAnswer {
                    answer: e.user_message(),
                    status: RunStatus::Failed,
                    iterations: 0,
                    tool_calls: 0,
                });
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    shared_tools: Option<Arc<ToolRegistry>>,
    config: AgentConfig,
    error: Option<AgentError>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            shared_tools: None,
            config: AgentConfig::default(),
            error: None,
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        if let Err(e) = self.tools.register(tool) {
            self.error.get_or_insert(e);
        }
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.shared_tools = Some(tools);
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn failure_penalty(mut self, penalty: usize) -> Self {
        self.config.failure_penalty = penalty;
        self
    }

    pub fn parse_recovery(mut self, policy: ParseRecovery) -> Self {
        self.config.parse_recovery = policy;
        self
    }

    pub fn time_limit(mut self, limit: Duration) -> Self {
        self.config.time_limit = Some(limit);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let tools = self.shared_tools.unwrap_or_else(|| Arc::new(self.tools));

        Ok(Agent::new(provider, tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ScriptedProvider, ScriptedReply};
    use crate::tool::{ToolResult, ToolSchema};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTool {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CountingTool {
        fn ok(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Self { name, calls: calls.clone(), fail: false }, calls)
        }

        fn failing(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Self { name, calls: calls.clone(), fail: true }, calls)
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.into(),
                description: "test tool".into(),
                category: None,
            }
        }

        async fn execute(&self, input: &str) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AgentError::tool_execution(self.name, "backend down"))
            } else {
                Ok(ToolResult::success(self.name, format!("result for {input}")))
            }
        }
    }

    fn agent(provider: Arc<ScriptedProvider>, tools: Vec<CountingTool>) -> Agent {
        let mut builder = AgentBuilder::new().provider(provider);
        for tool in tools {
            builder = builder.tool(tool);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_direct_final_answer() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Thought: I know this.\nFinal Answer: Rotation breaks pest cycles.",
        ]));
        let agent = agent(provider.clone(), vec![]);

        let outcome = agent.ask("Why rotate crops?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.answer, "Rotation breaks pest cycles.");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls, 0);

        let request = &provider.requests()[0];
        assert!(request.options.stop_sequences.contains(&"\nObservation:".to_string()));
        assert!(request.messages[1].content.contains("Question: Why rotate crops?"));
    }

    #[tokio::test]
    async fn test_tool_then_answer_builds_scratchpad() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Thought: look it up\nAction: wikipedia\nAction Input: photosynthesis",
            "Thought: I now know the final answer\nFinal Answer: Plants make sugar from light.",
        ]));
        let (tool, calls) = CountingTool::ok("wikipedia");
        let agent = agent(provider.clone(), vec![tool]);

        let outcome = agent.ask("What is photosynthesis?").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(outcome.steps[0].tool.as_deref(), Some("wikipedia"));
        assert_eq!(
            outcome.steps[0].observation.as_deref(),
            Some("result for photosynthesis")
        );

        let second = &provider.requests()[1].messages[1].content;
        assert!(second.contains("Action Input: photosynthesis\nObservation: result for photosynthesis\nThought:"));
    }

    #[tokio::test]
    async fn test_system_prompt_lists_tools_in_order() {
        let provider = Arc::new(ScriptedProvider::texts(["Final Answer: ok"]));
        let (a, _) = CountingTool::ok("wikipedia");
        let (b, _) = CountingTool::ok("calculator");
        let agent = agent(provider.clone(), vec![a, b]);

        agent.ask("hi").await.unwrap();
        let system = &provider.requests()[0].messages[0].content;
        let wiki = system.find("wikipedia: test tool").unwrap();
        let calc = system.find("calculator: test tool").unwrap();
        assert!(wiki < calc);
        assert!(system.contains("should be one of [wikipedia, calculator]"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Action: search\nAction Input: soil",
            "Final Answer: done",
        ]));
        let (tool, calls) = CountingTool::ok("wikipedia");
        let agent = agent(provider.clone(), vec![tool]);

        let outcome = agent.ask("soil?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.tool_calls, 0);
        let observation = outcome.steps[0].observation.as_deref().unwrap();
        assert!(observation.contains("search is not a valid tool"));
        assert!(observation.contains("[wikipedia]"));
    }

    #[tokio::test]
    async fn test_parse_error_reprompts_then_recovers() {
        let provider = Arc::new(ScriptedProvider::texts([
            "I think mulching helps.",
            "Thought: right format now\nFinal Answer: Mulch keeps moisture in.",
        ]));
        let agent = agent(provider.clone(), vec![]);

        let outcome = agent.ask("Does mulch help?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.answer, "Mulch keeps moisture in.");
        let second = &provider.requests()[1].messages[1].content;
        assert!(second.contains("Observation: Invalid Format:"));
    }

    #[tokio::test]
    async fn test_parse_errors_exhaust_to_raw_text() {
        let provider = Arc::new(ScriptedProvider::texts(["first", "second", "third"]));
        let agent = AgentBuilder::new()
            .provider(provider.clone())
            .parse_recovery(ParseRecovery::Reprompt { max_retries: 2 })
            .build()
            .unwrap();

        let outcome = agent.ask("?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::RecoveredFromParse);
        assert_eq!(outcome.answer, "third");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_accept_raw_text_policy() {
        let provider = Arc::new(ScriptedProvider::texts(["Cover crops reduce erosion."]));
        let agent = AgentBuilder::new()
            .provider(provider)
            .parse_recovery(ParseRecovery::AcceptRawText)
            .build()
            .unwrap();

        let outcome = agent.ask("cover crops?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::RecoveredFromParse);
        assert_eq!(outcome.answer, "Cover crops reduce erosion.");
    }

    #[tokio::test]
    async fn test_failing_tool_trips_cap_with_best_effort_answer() {
        let provider = Arc::new(ScriptedProvider::from_fn(|_| {
            Ok("Thought: try the lookup again\nAction: wikipedia\nAction Input: drought".into())
        }));
        let (tool, calls) = CountingTool::failing("wikipedia");
        let agent = AgentBuilder::new()
            .provider(provider)
            .tool(tool)
            .max_iterations(6)
            .build()
            .unwrap();

        let outcome = agent.ask("drought?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::IterationLimit);
        assert_eq!(outcome.answer, "try the lookup again");
        assert!(matches!(outcome.interruption(), Some(AgentError::MaxIterations(6))));
        // penalty of 1 per failure: 3 calls use up 6 iterations
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.steps[0]
            .observation
            .as_deref()
            .unwrap()
            .starts_with("Error: Tool 'wikipedia' failed"));
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedReply::Fail(
            AgentError::Auth("bad key".into()),
        )]));
        let agent = agent(provider, vec![]);
        assert!(matches!(agent.ask("hi").await, Err(AgentError::Auth(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let provider = Arc::new(ScriptedProvider::texts(["Final Answer: never"]));
        let agent = agent(provider.clone(), vec![]);
        let token = CancellationToken::new();
        token.cancel();

        let mut conversation = Conversation::default();
        conversation.push_user("hi");
        let outcome = agent
            .run(&conversation, RunContext::new().with_cancel(token))
            .await
            .unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.answer, CANCELLED_MESSAGE);
        assert!(matches!(outcome.interruption(), Some(AgentError::Cancelled)));
        assert_eq!(provider.call_count(), 0);
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "wikipedia".into(),
                description: "never returns in time".into(),
                category: None,
            }
        }

        async fn execute(&self, input: &str) -> Result<ToolResult> {
            if input == "quick" {
                return Ok(ToolResult::success("wikipedia", "in time"));
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolResult::success("wikipedia", "too late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_tool_call() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Thought: searching soils\nAction: wikipedia\nAction Input: loam",
        ]));
        let agent = AgentBuilder::new()
            .provider(provider)
            .tool(SlowTool)
            .time_limit(Duration::from_secs(5))
            .build()
            .unwrap();

        let outcome = agent.ask("What is loam?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.answer, "searching soils");
        assert_eq!(outcome.tool_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_answer_is_newest_thought() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Thought: first thought\nAction: wikipedia\nAction Input: quick",
            "Thought: newest thought\nAction: wikipedia\nAction Input: loam",
        ]));
        let agent = AgentBuilder::new()
            .provider(provider)
            .tool(SlowTool)
            .time_limit(Duration::from_secs(5))
            .build()
            .unwrap();

        let outcome = agent.ask("What is loam?").await.unwrap();
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.answer, "newest thought");
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(outcome.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_question_is_error() {
        let provider = Arc::new(ScriptedProvider::texts(["Final Answer: x"]));
        let agent = agent(provider, vec![]);
        let result = agent.run(&Conversation::default(), RunContext::new()).await;
        assert!(matches!(result, Err(AgentError::Session(_))));
    }

    #[tokio::test]
    async fn test_history_is_rendered_without_latest_question() {
        let provider = Arc::new(ScriptedProvider::texts(["Final Answer: ok"]));
        let agent = agent(provider.clone(), vec![]);

        let mut conversation = Conversation::with_greeting("Hello farmer");
        conversation.push_user("first question");
        conversation.push_assistant("first answer");
        conversation.push_user("second question");
        agent.run(&conversation, RunContext::new()).await.unwrap();

        let prompt = &provider.requests()[0].messages[1].content;
        assert!(prompt.contains("assistant: Hello farmer\nuser: first question\nassistant: first answer"));
        assert!(prompt.contains("Question: second question\nThought:"));
        assert!(!prompt.contains("user: second question"));
    }

    #[tokio::test]
    async fn test_stream_ends_with_final_answer() {
        let provider = Arc::new(ScriptedProvider::texts([
            "Thought: compute\nAction: calculator\nAction Input: 2+2",
            "Thought: I now know the final answer\nFinal Answer: 4",
        ]));
        let (tool, _) = CountingTool::ok("calculator");
        let agent = Arc::new(agent(provider, vec![tool]));

        let mut conversation = Conversation::default();
        conversation.push_user("2+2?");
        let events: Vec<AgentEvent> = agent
            .stream(conversation, CancellationToken::new())
            .collect()
            .await;

        let kinds: Vec<&str> = events.iter().map(AgentEvent::event_type).collect();
        assert_eq!(
            kinds,
            vec!["thought", "action", "observation", "thought", "final_answer"]
        );
        assert!(matches!(
            events.last(),
            Some(AgentEvent::FinalAnswer { answer, status: RunStatus::Completed, .. }) if answer == "4"
        ));
    }

    #[tokio::test]
    async fn test_stream_reports_provider_failure() {
        let agent = Arc::new(AgentBuilder::new()
            .provider(Arc::new(ScriptedProvider::unavailable()))
            .build()
            .unwrap());
        let mut conversation = Conversation::default();
        conversation.push_user("hi");

        let events: Vec<AgentEvent> = agent
            .stream(conversation, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AgentEvent::FinalAnswer { status: RunStatus::Failed, .. }
        ));
    }

    #[test]
    fn test_duplicate_tool_fails_build() {
        let (a, _) = CountingTool::ok("calculator");
        let (b, _) = CountingTool::ok("calculator");
        let result = AgentBuilder::new()
            .provider(Arc::new(ScriptedProvider::texts(Vec::<String>::new())))
            .tool(a)
            .tool(b)
            .build();
        assert!(matches!(result, Err(AgentError::DuplicateTool(_))));
    }
}
