//! OpenAI-compatible completion client.
//!
//! Works with: OpenAI, OpenRouter, Groq, DeepSeek, Together AI, vLLM, and any
//! endpoint exposing `/chat/completions`.
//!
//! Supports:
//! - Text and image content parts
//! - Tool use / function calling with `tool_choice: "auto"`
//! - JSON response format and multiple candidates (`n`)
//! - Model listing

use std::time::Duration;

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::message::{ContentPart, Message, MessageToolCall, Role};
use parley_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible completion client.
///
/// This handles the vast majority of hosted backends since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new client. `timeout` bounds every request.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI client (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Build the JSON request body.
    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "temperature": request.temperature,
            "n": request.candidates,
            "response_format": { "type": request.response_format.as_str() },
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Parse a 200 response body into candidates.
fn parse_response(raw: &str) -> Result<CompletionResponse, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;

    // Some compatible servers report failures in a 200 body
    if let Some(error) = value.get("error") {
        let message = error["message"]
            .as_str()
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Err(ProviderError::ApiError {
            status_code: 200,
            message,
        });
    }

    let api_response: ApiResponse = serde_json::from_value(value)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

    if api_response.choices.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let candidates = api_response
        .choices
        .into_iter()
        .map(|choice| {
            let message = from_api_message(choice.message);
            Candidate::with_calls(message.text(), message.tool_calls)
        })
        .collect();

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });

    Ok(CompletionResponse {
        candidates,
        usage,
        model: api_response.model,
    })
}

/// Convert our messages to the OpenAI wire format.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| {
            let has_images = m
                .content
                .iter()
                .any(|p| matches!(p, ContentPart::ImageUrl { .. }));

            let content = if has_images {
                Some(ApiContent::Parts(m.content.iter().map(ApiContentPart::from).collect()))
            } else if m.content.is_empty() && !m.tool_calls.is_empty() {
                None
            } else {
                Some(ApiContent::Text(m.text()))
            };

            ApiMessage {
                role: m.role.as_str().into(),
                content,
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            }
        })
        .collect()
}

/// Convert a wire message back into ours.
fn from_api_message(api: ApiMessage) -> Message {
    let role = match api.role.as_str() {
        "system" => Role::System,
        "user" => Role::User,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    };

    let content = match api.content {
        None => Vec::new(),
        Some(ApiContent::Text(text)) if text.is_empty() => Vec::new(),
        Some(ApiContent::Text(text)) => vec![ContentPart::text(text)],
        Some(ApiContent::Parts(parts)) => parts.into_iter().map(ContentPart::from).collect(),
    };

    let tool_calls = api
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| MessageToolCall::new(tc.id, tc.function.name, tc.function.arguments))
        .collect();

    let mut message = Message::assistant_with_calls("", tool_calls);
    message.role = role;
    message.content = content;
    message.tool_call_id = api.tool_call_id;
    message
}

/// Convert tool definitions to OpenAI API format.
fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let raw = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            warn!(status, body = %raw, "Provider returned error");
            return Err(status_error(status, raw));
        }

        parse_response(&raw)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(status_error(status, raw));
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(models)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Plain string for text-only messages, a part array otherwise.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiImageUrl {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl From<&ContentPart> for ApiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => ApiContentPart::Text { text: text.clone() },
            ContentPart::ImageUrl { url, detail } => ApiContentPart::ImageUrl {
                image_url: ApiImageUrl {
                    url: url.clone(),
                    detail: detail.clone(),
                },
            },
        }
    }
}

impl From<ApiContentPart> for ContentPart {
    fn from(part: ApiContentPart) -> Self {
        match part {
            ApiContentPart::Text { text } => ContentPart::Text { text },
            ApiContentPart::ImageUrl { image_url } => ContentPart::ImageUrl {
                url: image_url.url,
                detail: image_url.detail,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
