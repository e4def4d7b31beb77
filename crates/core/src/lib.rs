//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley tool-calling
//! chat engine. This crate has **no HTTP or runtime dependencies**: it defines
//! the conversation model that every other crate builds on.
//!
//! ## Layout
//!
//! - [`message`]: roles, content parts, messages and assistant tool calls
//! - [`store`]: the ordered message log with tool-result placement rules
//! - [`tool`]: typed tool declarations, the registry, argument validation and
//!   the handler trait
//! - [`provider`]: the completion client boundary
//! - [`event`]: broadcast bus for session events
//!
//! Nothing in here reads the process environment. Collaborators receive
//! their configuration explicitly.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProtocolError, ProviderError, Result, ToolError};
pub use event::{EventBus, SessionEvent};
pub use message::{ContentPart, Message, MessageToolCall, Role, SessionId};
pub use provider::{
    Candidate, CompletionClient, CompletionRequest, CompletionResponse, ResponseFormat,
    ToolDefinition, Usage,
};
pub use store::MessageStore;
pub use tool::{
    ArgValue, ParamType, ToolArguments, ToolDeclaration, ToolHandler, ToolParameter,
    ToolRegistry, ToolResult, tool_fn,
};
