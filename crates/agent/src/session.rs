//! The orchestration loop.
//!
//! A [`Session`] owns one conversation: it sends the full message log to the
//! completion client, dispatches the tool calls the model makes, appends
//! their results, and asks again until the model answers without tools, says
//! the sentinel, or runs out of budget.
//!
//! ```text
//! AwaitingUserInput ──user()──▶ ModelThinking ──calls──▶ ToolDispatch ─┐
//!        ▲                         │    ▲                              │
//!        └───── content-only ──────┘    └──────── results in ◀─────────┘
//!                                  │
//!                       sentinel / budget ──▶ Terminal
//! ```
//!
//! Every mutating operation takes `&mut self`; a session is strictly
//! sequential. Independent sessions share only the `Arc`'d client and
//! handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_config::SessionConfig;
use parley_core::error::{Error, ProtocolError, ProviderError};
use parley_core::event::{EventBus, SessionEvent};
use parley_core::message::{ContentPart, Message, MessageToolCall, Role, SessionId};
use parley_core::provider::{
    Candidate, CompletionClient, CompletionRequest, CompletionResponse, ResponseFormat, Usage,
};
use parley_core::store::MessageStore;
use parley_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatched, ToolDispatcher};
use crate::termination::{TerminationDetector, Verdict};

/// Where a session is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingUserInput,
    ModelThinking,
    ToolDispatch,
    Terminal,
}

/// The result of one [`Session::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The model called tools and every result has been appended.
    ToolsDispatched {
        calls: Vec<MessageToolCall>,
        alternates: Vec<Candidate>,
    },
    /// Some calls have no handler; submit their results, then step again.
    AwaitingToolResults { calls: Vec<MessageToolCall> },
    /// A content-only answer without the sentinel.
    Reply {
        text: String,
        alternates: Vec<Candidate>,
    },
    /// The sentinel appeared.
    Finished {
        text: String,
        alternates: Vec<Candidate>,
    },
    /// The iteration budget is spent; no further request is issued.
    Exhausted { iterations: u32, last_text: String },
}

/// How a driven turn ([`Session::user`], [`Session::run`]) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sentinel appeared in this text.
    Completed { text: String },
    /// The model answered without tools and without the sentinel.
    Reply { text: String },
    /// The budget ran out first.
    NotConverged { iterations: u32, last_text: String },
    /// Calls to handler-less tools need results from the caller.
    AwaitingToolResults { calls: Vec<MessageToolCall> },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Completed { .. } => "completed",
            Outcome::Reply { .. } => "reply",
            Outcome::NotConverged { .. } => "not_converged",
            Outcome::AwaitingToolResults { .. } => "awaiting_tool_results",
        }
    }

    /// The final assistant text, if the outcome carries one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Completed { text } | Outcome::Reply { text } => Some(text),
            Outcome::NotConverged { last_text, .. } => Some(last_text),
            Outcome::AwaitingToolResults { .. } => None,
        }
    }
}

/// A long-lived conversation bound to one task.
pub struct Session {
    id: SessionId,
    client: Arc<dyn CompletionClient>,
    dispatcher: ToolDispatcher,
    store: MessageStore,
    termination: TerminationDetector,

    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
    response_format: ResponseFormat,
    candidates: u32,
    parallel_tool_calls: bool,
    request_timeout: Option<Duration>,

    state: SessionState,
    /// Completion requests since the last `user()` / `run()`
    iterations: u32,
    usage: Usage,
    event_bus: Option<Arc<EventBus>>,
}

impl Session {
    /// Create a session with default settings and no system prompt.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        dispatcher: ToolDispatcher,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            client,
            dispatcher,
            store: MessageStore::new(),
            termination: TerminationDetector::default(),
            model: model.into(),
            max_tokens: None,
            temperature: 0.0,
            response_format: ResponseFormat::Text,
            candidates: 1,
            parallel_tool_calls: false,
            request_timeout: None,
            state: SessionState::AwaitingUserInput,
            iterations: 0,
            usage: Usage::default(),
            event_bus: None,
        }
    }

    /// Create a session from the `[session]` config table.
    pub fn from_config(
        client: Arc<dyn CompletionClient>,
        dispatcher: ToolDispatcher,
        config: &SessionConfig,
    ) -> Self {
        Self::new(client, dispatcher, config.model.clone())
            .with_system_prompt(config.system_prompt.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
            .with_response_format(config.response_format)
            .with_candidates(config.candidates)
            .with_parallel_tool_calls(config.parallel_tool_calls)
            .with_termination(TerminationDetector::new(
                config.sentinel.clone(),
                config.max_iterations,
            ))
    }

    /// Set the system prompt. Only takes effect before the first message.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        if self.store.is_empty() {
            self.store = MessageStore::with_system_prompt(prompt);
        }
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    /// Request several candidates per completion. Only the first is used.
    pub fn with_candidates(mut self, n: u32) -> Self {
        self.candidates = n.max(1);
        self
    }

    /// Run the handlers of one turn concurrently.
    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_termination(mut self, termination: TerminationDetector) -> Self {
        self.termination = termination;
        self
    }

    /// Bound every completion call; expiry is reported as a timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Tokens used by every completion of this session so far.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn messages(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn pending_tool_calls(&self) -> Vec<MessageToolCall> {
        self.store.pending_tool_calls().into_iter().cloned().collect()
    }

    /// Numbered dump of the conversation.
    pub fn transcript(&self) -> String {
        self.store.transcript()
    }

    /// Send a text message and drive the loop until the model answers
    /// without tools, says the sentinel, or the budget runs out.
    pub async fn user(&mut self, text: impl Into<String>) -> Result<Outcome, Error> {
        self.user_with_parts(text, Vec::new()).await
    }

    /// Like [`Session::user`], with extra content parts such as images.
    pub async fn user_with_parts(
        &mut self,
        text: impl Into<String>,
        parts: Vec<ContentPart>,
    ) -> Result<Outcome, Error> {
        self.push_user(Message::user_with_parts(text, parts))?;
        self.iterations = 0;
        self.drive().await
    }

    /// Work on `task` until the sentinel appears or the budget is spent,
    /// answering every content-only reply with `continue_prompt`.
    pub async fn run(
        &mut self,
        task: impl Into<String>,
        continue_prompt: &str,
    ) -> Result<Outcome, Error> {
        let task = task.into();
        info!(session_id = %self.id, budget = self.termination.max_iterations(), "Starting task");

        self.push_user(Message::user(task))?;
        self.iterations = 0;

        loop {
            match self.drive().await? {
                Outcome::Reply { text } if !self.termination.budget_left(self.iterations) => {
                    self.exhaust();
                    return Ok(Outcome::NotConverged {
                        iterations: self.iterations,
                        last_text: text,
                    });
                }
                Outcome::Reply { text } => {
                    debug!(session_id = %self.id, iteration = self.iterations, reply = %text, "No sentinel yet, continuing");
                    self.push_user(Message::user(continue_prompt))?;
                }
                other => return Ok(other),
            }
        }
    }

    /// Keep driving after manual tool results were submitted.
    pub async fn resume(&mut self) -> Result<Outcome, Error> {
        self.drive().await
    }

    /// Record the result of a call to a handler-less tool.
    pub fn submit_tool_result(
        &mut self,
        call_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        let call_id = call_id.into();
        self.store.append(Message::tool_result(call_id.clone(), text))?;
        debug!(session_id = %self.id, call_id = %call_id, "Manual tool result recorded");

        if self.store.pending_tool_calls().is_empty() {
            self.state = SessionState::ModelThinking;
        }
        Ok(())
    }

    /// One completion request plus dispatch of the tool calls it returns.
    pub async fn step(&mut self) -> Result<Step, Error> {
        self.ensure_nothing_pending()?;

        match self.store.last().map(|m| m.role) {
            Some(Role::User) | Some(Role::Tool) => {}
            _ => return Err(ProtocolError::NothingToSend.into()),
        }

        if !self.termination.budget_left(self.iterations) {
            self.exhaust();
            return Ok(Step::Exhausted {
                iterations: self.iterations,
                last_text: self.last_assistant_text(),
            });
        }

        let resume_state = self.state;
        self.state = SessionState::ModelThinking;

        let response = match self.complete().await {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Completion failed");
                self.state = resume_state;
                self.publish(SessionEvent::CompletionFailed {
                    session_id: self.id.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
        };

        // Tokens were spent even if the response is rejected below
        if let Some(usage) = response.usage {
            self.usage.add(usage);
        }

        let mut candidates = response.candidates.into_iter();
        let Some(chosen) = candidates.next() else {
            self.state = resume_state;
            return Err(ProviderError::EmptyResponse.into());
        };
        let alternates: Vec<Candidate> = candidates.collect();
        if !alternates.is_empty() {
            debug!(session_id = %self.id, alternates = ?alternates, "Ignoring alternate candidates");
        }

        for call in &chosen.tool_calls {
            if let Err(e) = self.dispatcher.ensure_declared(call) {
                self.state = resume_state;
                return Err(e.into());
            }
        }

        self.iterations += 1;
        let usage = response.usage.unwrap_or_default();
        info!(
            session_id = %self.id,
            iteration = self.iterations,
            model = %response.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            tool_calls = chosen.tool_calls.len(),
            "Completion received"
        );
        self.publish(SessionEvent::CompletionReceived {
            session_id: self.id.to_string(),
            model: response.model,
            iteration: self.iterations,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            tool_calls: chosen.tool_calls.len(),
            timestamp: Utc::now(),
        });

        let text = chosen.text.clone();
        let calls = chosen.tool_calls.clone();
        self.store.append(chosen.into_message())?;

        if !calls.is_empty() {
            self.state = SessionState::ToolDispatch;
            let manual = self.dispatch_all(&calls).await?;
            if !manual.is_empty() {
                return Ok(Step::AwaitingToolResults { calls: manual });
            }
        }

        match self.termination.evaluate(&text, self.iterations) {
            Verdict::Done => {
                info!(session_id = %self.id, iterations = self.iterations, "Sentinel received");
                self.state = SessionState::Terminal;
                self.publish_finished("completed");
                Ok(Step::Finished { text, alternates })
            }
            // A content-only answer hands control back; no request is pending
            _ if calls.is_empty() => {
                self.state = SessionState::AwaitingUserInput;
                Ok(Step::Reply { text, alternates })
            }
            Verdict::Exhausted => {
                self.exhaust();
                Ok(Step::Exhausted {
                    iterations: self.iterations,
                    last_text: text,
                })
            }
            Verdict::Continue => {
                self.state = SessionState::ModelThinking;
                Ok(Step::ToolsDispatched { calls, alternates })
            }
        }
    }

    /// End the task at the iteration budget.
    fn exhaust(&mut self) {
        warn!(session_id = %self.id, iterations = self.iterations, "Iteration budget spent");
        self.state = SessionState::Terminal;
        self.publish_finished("not_converged");
    }

    async fn drive(&mut self) -> Result<Outcome, Error> {
        loop {
            let outcome = match self.step().await? {
                Step::ToolsDispatched { .. } => continue,
                Step::AwaitingToolResults { calls } => Outcome::AwaitingToolResults { calls },
                Step::Reply { text, .. } => Outcome::Reply { text },
                Step::Finished { text, .. } => Outcome::Completed { text },
                Step::Exhausted {
                    iterations,
                    last_text,
                } => Outcome::NotConverged {
                    iterations,
                    last_text,
                },
            };
            return Ok(outcome);
        }
    }

    async fn complete(&self) -> Result<CompletionResponse, ProviderError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: self.store.snapshot().to_vec(),
            tools: self.dispatcher.registry().describe_all(),
            response_format: self.response_format,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            candidates: self.candidates,
        };

        debug!(
            session_id = %self.id,
            iteration = self.iterations + 1,
            messages = request.messages.len(),
            "Requesting completion"
        );

        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.client.complete(request))
                .await
                .map_err(|_| ProviderError::Timeout(format!("no response within {}s", limit.as_secs())))?,
            None => self.client.complete(request).await,
        }
    }

    /// Dispatch every call of one turn and append the results in call
    /// order. Returns the calls left for the caller to answer.
    async fn dispatch_all(&mut self, calls: &[MessageToolCall]) -> Result<Vec<MessageToolCall>, Error> {
        let outcomes = if self.parallel_tool_calls {
            futures::future::join_all(calls.iter().map(|call| self.dispatcher.dispatch(call))).await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(self.dispatcher.dispatch(call).await);
            }
            out
        };

        let mut manual = Vec::new();
        for (call, outcome) in calls.iter().zip(outcomes) {
            match outcome? {
                Dispatched::Completed {
                    result,
                    duration_ms,
                } => {
                    self.publish(SessionEvent::ToolDispatched {
                        session_id: self.id.to_string(),
                        tool_name: call.name.clone(),
                        call_id: call.id.clone(),
                        success: result.success,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    self.store
                        .append(Message::tool_result(result.call_id, result.output))?;
                }
                Dispatched::Manual => manual.push(call.clone()),
            }
        }
        Ok(manual)
    }

    fn push_user(&mut self, message: Message) -> Result<(), ProtocolError> {
        self.ensure_nothing_pending()?;
        self.store.append(message)?;
        self.state = SessionState::ModelThinking;
        Ok(())
    }

    fn ensure_nothing_pending(&self) -> Result<(), ProtocolError> {
        let pending = self.store.pending_tool_calls();
        if pending.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::PendingToolResults {
            count: pending.len(),
            ids: pending
                .iter()
                .map(|tc| tc.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn last_assistant_text(&self) -> String {
        self.store
            .snapshot()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
            .unwrap_or_default()
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn publish_finished(&self, outcome: &str) {
        self.publish(SessionEvent::Finished {
            session_id: self.id.to_string(),
            outcome: outcome.into(),
            iterations: self.iterations,
            timestamp: Utc::now(),
        });
    }
}
