//! The message store: the ordered conversation log sent on every request.
//!
//! The store is append-only with one exception: a tool result is placed
//! directly after the assistant message that issued the matching call, next to
//! the results of that message's other calls and ordered like the calls
//! themselves. Backends require results to follow their call, and callers may
//! have appended other messages in between.

use tracing::debug;

use crate::error::ProtocolError;
use crate::message::{Message, MessageToolCall, Role};

/// Ordered log of conversation messages.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    /// An empty store (no system prompt).
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose first message is the given system prompt.
    ///
    /// An empty prompt is not recorded.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let mut messages = Vec::new();
        if !prompt.is_empty() {
            messages.push(Message::system(prompt));
        }
        Self { messages }
    }

    /// Append a message, enforcing the protocol rules.
    ///
    /// On error the store is left untouched.
    pub fn append(&mut self, message: Message) -> Result<(), ProtocolError> {
        match message.role {
            Role::System => Err(ProtocolError::SystemPromptImmutable),
            Role::Tool => self.insert_tool_result(message),
            Role::User | Role::Assistant => {
                debug!(role = %message.role, position = self.messages.len(), "Appending message");
                self.messages.push(message);
                Ok(())
            }
        }
    }

    fn insert_tool_result(&mut self, message: Message) -> Result<(), ProtocolError> {
        let call_id = message
            .tool_call_id
            .clone()
            .ok_or(ProtocolError::MissingToolCallId)?;

        let origin = self
            .messages
            .iter()
            .rposition(|m| m.issued_call(&call_id))
            .ok_or_else(|| ProtocolError::UnmatchedToolResult(call_id.clone()))?;

        if self.is_answered(origin, &call_id) {
            return Err(ProtocolError::DuplicateToolResult(call_id));
        }

        let calls = &self.messages[origin].tool_calls;
        let call_index = |id: &str| calls.iter().position(|tc| tc.id == id);
        let own_index = call_index(&call_id);

        // Walk the run of sibling results and stop before the first one that
        // answers a later call.
        let mut position = origin + 1;
        while let Some(next) = self.messages.get(position) {
            let sibling = next
                .tool_call_id
                .as_deref()
                .filter(|_| next.role == Role::Tool)
                .and_then(call_index);
            match sibling {
                Some(index) if Some(index) < own_index => position += 1,
                _ => break,
            }
        }

        debug!(call_id = %call_id, origin, position, "Placing tool result");
        self.messages.insert(position, message);
        Ok(())
    }

    /// Whether the assistant message at `origin` already has a result for
    /// `call_id`. Results always sit in the run of tool messages right after
    /// their origin, so a reused id in a later turn is a separate call.
    fn is_answered(&self, origin: usize, call_id: &str) -> bool {
        self.messages[origin + 1..]
            .iter()
            .take_while(|m| m.role == Role::Tool)
            .any(|m| m.tool_call_id.as_deref() == Some(call_id))
    }

    /// Read-only ordered view of every message.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Assistant tool calls that have no recorded result yet, oldest first.
    pub fn pending_tool_calls(&self) -> Vec<&MessageToolCall> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::Assistant)
            .flat_map(|(i, m)| m.tool_calls.iter().map(move |tc| (i, tc)))
            .filter(|(i, tc)| !self.is_answered(*i, &tc.id))
            .map(|(_, tc)| tc)
            .collect()
    }

    /// The system prompt, if one was set.
    pub fn system_prompt(&self) -> Option<String> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Numbered, human-readable dump of the whole conversation.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for (i, message) in self.messages.iter().enumerate() {
            out.push_str(&format!("{i}.\n"));
            out.push_str(&message.render());
        }
        out
    }
}
