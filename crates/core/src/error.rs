//! Error types for the Parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The taxonomy follows the
//! way a caller should react:
//!
//! - [`ProviderError`]: the completion backend failed. Fatal to the current
//!   turn, the session stays usable and the turn can be retried.
//! - [`ProtocolError`]: the conversation history would become invalid.
//!   A programming or prompt-design defect; never retried.
//! - [`ToolError`]: a tool handler failed. Recoverable, the loop turns it
//!   into tool-result text for the model.
//!
//! Non-convergence is not an error at all, it is an outcome value.

use thiserror::Error;

/// The top-level error type for all Parley operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

impl Error {
    /// Whether re-invoking the failed operation may succeed.
    ///
    /// Only backend failures qualify; protocol violations would fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Model returned no candidates")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("tool result for '{0}' matches no prior tool call")]
    UnmatchedToolResult(String),

    #[error("tool call '{0}' already has a result")]
    DuplicateToolResult(String),

    #[error("tool message is missing its tool_call_id")]
    MissingToolCallId,

    #[error("the system prompt is set once at session creation")]
    SystemPromptImmutable,

    #[error("model called undeclared tool '{name}' (call {call_id})")]
    UndeclaredTool { name: String, call_id: String },

    #[error("{count} tool call(s) still await results: {ids}")]
    PendingToolResults { count: usize, ids: String },

    #[error("nothing to send: add a user message or tool results first")]
    NothingToSend,
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool already declared: {0}")]
    DuplicateName(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid arguments for tool '{tool_name}': {reason}")]
    InvalidArguments { tool_name: String, reason: String },
}
