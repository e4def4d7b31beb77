//! Message domain types.
//!
//! A [`Message`] is one conversational turn. Its content is an ordered list of
//! [`ContentPart`]s so a single user turn can carry text and several images.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix used when raw image bytes are inlined as a data URI.
pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Unique identifier for a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions, always first
    System,
    /// The caller
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// An image given by URL or `data:` URI.
    ImageUrl {
        url: String,
        /// Resolution hint: `low`, `high` or `auto`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            url: url.into(),
            detail: None,
        }
    }

    /// Inline raw JPEG bytes as a base64 data URI.
    pub fn image_from_bytes(bytes: &[u8]) -> Self {
        Self::image_url(format!("{JPEG_DATA_URI_PREFIX}{}", STANDARD.encode(bytes)))
    }

    /// Read an image file and inline it as a data URI.
    pub fn image_from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::image_from_bytes(&bytes))
    }

    pub fn with_detail(self, level: impl Into<String>) -> Self {
        match self {
            ContentPart::ImageUrl { url, .. } => ContentPart::ImageUrl {
                url,
                detail: Some(level.into()),
            },
            other => other,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::ImageUrl { .. } => None,
        }
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Correlation id assigned by the model
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string, exactly as the model produced them
    pub arguments: String,
}

impl MessageToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Ordered content parts
    #[serde(default)]
    pub content: Vec<ContentPart>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_parts(Role::System, vec![ContentPart::text(text)])
    }

    /// Create a new user message. Empty text yields no content part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::user_with_parts(text, Vec::new())
    }

    /// Create a user message carrying text followed by extra parts (images).
    pub fn user_with_parts(text: impl Into<String>, parts: Vec<ContentPart>) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(parts.len() + 1);
        if !text.is_empty() {
            content.push(ContentPart::text(text));
        }
        content.extend(parts);
        Self::with_parts(Role::User, content)
    }

    /// Create a new assistant message. Empty text yields no content part.
    pub fn assistant(text: impl Into<String>) -> Self {
        let text = text.into();
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentPart::text(text)]
        };
        Self::with_parts(Role::Assistant, content)
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::assistant(text);
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut msg = Self::with_parts(Role::Tool, vec![ContentPart::text(text)]);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// All text parts joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether this assistant message issued a call with the given id.
    pub fn issued_call(&self, call_id: &str) -> bool {
        self.role == Role::Assistant && self.tool_calls.iter().any(|tc| tc.id == call_id)
    }

    /// Render the message the way conversation dumps show it.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for tc in &self.tool_calls {
            out.push_str(&format!(
                "{}: [Tool Call {}] {} with arguments {}\n",
                self.role, tc.id, tc.name, tc.arguments
            ));
        }
        for part in &self.content {
            match part {
                ContentPart::Text { text } if text.is_empty() => {}
                ContentPart::Text { text } => out.push_str(&format!("{}: {}\n", self.role, text)),
                ContentPart::ImageUrl { url, .. } => {
                    out.push_str(&format!("{}: [Image] {}\n", self.role, url))
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn user_message_with_images_keeps_part_order() {
        let msg = Message::user_with_parts(
            "what is on the pictures?",
            vec![
                ContentPart::image_url("https://img.example/a.png"),
                ContentPart::image_url("https://img.example/b.png").with_detail("low"),
            ],
        );
        assert_eq!(msg.content.len(), 3);
        assert!(matches!(msg.content[0], ContentPart::Text { .. }));
        assert_eq!(
            msg.content[2],
            ContentPart::ImageUrl {
                url: "https://img.example/b.png".into(),
                detail: Some("low".into()),
            }
        );
    }

    #[test]
    fn image_only_user_message_has_no_text_part() {
        let msg = Message::user_with_parts("", vec![ContentPart::image_url("u")]);
        assert_eq!(msg.content.len(), 1);
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn image_from_bytes_builds_data_uri() {
        let part = ContentPart::image_from_bytes(b"abc");
        match part {
            ContentPart::ImageUrl { url, .. } => {
                assert_eq!(url, "data:image/jpeg;base64,YWJj");
            }
            _ => panic!("expected image part"),
        }
    }

    #[test]
    fn image_from_file_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.jpg");
        std::fs::write(&path, b"abc").unwrap();
        let part = ContentPart::image_from_file(&path).unwrap();
        assert_eq!(part, ContentPart::image_from_bytes(b"abc"));
        assert!(ContentPart::image_from_file(dir.path().join("missing.jpg")).is_err());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.text(), "42");
    }

    #[test]
    fn issued_call_only_matches_assistant() {
        let call = MessageToolCall::new("call_1", "lookup", r#"{"key":"x"}"#);
        let msg = Message::assistant_with_calls("", vec![call]);
        assert!(msg.issued_call("call_1"));
        assert!(!msg.issued_call("call_2"));
        assert!(!Message::tool_result("call_1", "x").issued_call("call_1"));
    }

    #[test]
    fn render_shows_calls_text_and_images() {
        let call = MessageToolCall::new("call_1", "lookup", r#"{"key":"x"}"#);
        let msg = Message::assistant_with_calls("checking", vec![call]);
        let rendered = msg.render();
        assert!(rendered.contains("assistant: [Tool Call call_1] lookup with arguments {\"key\":\"x\"}"));
        assert!(rendered.contains("assistant: checking"));

        let img = Message::user_with_parts("", vec![ContentPart::image_url("https://x/y.png")]);
        assert_eq!(img.render(), "user: [Image] https://x/y.png\n");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::user_with_parts("Test", vec![ContentPart::image_url("u")]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"image_url""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::User);
        assert_eq!(back.content, msg.content);
    }
}
