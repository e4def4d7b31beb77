//! Native Ollama client (`/api/chat`).
//!
//! Ollama's native endpoint differs from the OpenAI shape in a few ways that
//! matter here: images travel as raw base64 in an `images` array, tool call
//! arguments are JSON objects rather than strings, tool calls carry no id,
//! and sampling settings live under `options`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parley_core::error::ProviderError;
use parley_core::message::{ContentPart, Message, MessageToolCall};
use parley_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
    /// Source of synthesized tool call ids; never reset, so ids stay unique
    /// across every turn this client answers.
    next_call_id: AtomicU64,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/');
        // Accept the OpenAI-style base too
        let base_url = base_url.strip_suffix("/v1").unwrap_or(base_url).to_string();

        Ok(Self {
            base_url,
            client,
            next_call_id: AtomicU64::new(0),
        })
    }

    /// Resolve an image part to the raw base64 Ollama expects.
    async fn image_payload(&self, url: &str) -> Result<String, ProviderError> {
        if let Some(encoded) = strip_data_uri(url) {
            return Ok(encoded.to_string());
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: format!("failed to fetch image {url}"),
            });
        }
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(STANDARD.encode(&bytes))
    }

    async fn to_ollama_messages(&self, messages: &[Message]) -> Result<Vec<OllamaMessage>, ProviderError> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let mut images = Vec::new();
            for part in &m.content {
                if let ContentPart::ImageUrl { url, .. } = part {
                    images.push(self.image_payload(url).await?);
                }
            }

            let tool_calls = m
                .tool_calls
                .iter()
                .map(|tc| OllamaToolCall {
                    function: OllamaFunction {
                        name: tc.name.clone(),
                        arguments: serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::Value::String(tc.arguments.clone())),
                    },
                })
                .collect();

            out.push(OllamaMessage {
                role: m.role.as_str().into(),
                content: m.text(),
                images,
                tool_calls,
            });
        }
        Ok(out)
    }

    async fn request_body(&self, request: &CompletionRequest) -> Result<serde_json::Value, ProviderError> {
        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = serde_json::json!(max_tokens);
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": self.to_ollama_messages(&request.messages).await?,
            "options": options,
            "stream": false,
        });

        if request.response_format == ResponseFormat::JsonObject {
            body["format"] = serde_json::json!("json");
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        Ok(body)
    }
}

fn strip_data_uri(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("data:")?;
    rest.split_once(";base64,").map(|(_, data)| data)
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Parse an `/api/chat` response body, numbering tool calls from `next_id`.
fn parse_response(raw: &str, next_id: &AtomicU64) -> Result<CompletionResponse, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;

    if let Some(error) = value.get("error") {
        return Err(ProviderError::ApiError {
            status_code: 200,
            message: error.as_str().map(String::from).unwrap_or_else(|| error.to_string()),
        });
    }

    let resp: OllamaResponse = serde_json::from_value(value)
        .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

    let Some(message) = resp.message else {
        return Err(ProviderError::EmptyResponse);
    };

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|tc| {
            let arguments = match tc.function.arguments {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            let n = next_id.fetch_add(1, Ordering::Relaxed);
            MessageToolCall::new(format!("call_{n}"), tc.function.name, arguments)
        })
        .collect();

    Ok(CompletionResponse {
        candidates: vec![Candidate::with_calls(message.content, tool_calls)],
        usage: Some(Usage {
            prompt_tokens: resp.prompt_eval_count.unwrap_or(0),
            completion_tokens: resp.eval_count.unwrap_or(0),
        }),
        model: resp.model,
    })
}

#[async_trait]
impl CompletionClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        if request.candidates > 1 {
            debug!(requested = request.candidates, "Ollama returns a single candidate");
        }

        let url = format!("{}/api/chat", self.base_url);
        let body = self.request_body(&request).await?;

        debug!(model = %request.model, messages = request.messages.len(), "Sending Ollama chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let raw = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            warn!(status, body = %raw, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: raw,
            });
        }

        parse_response(&raw, &self.next_call_id)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: "failed to list models".into(),
            });
        }

        let body: serde_json::Value = response.json().await.map_err(transport_error)?;
        Ok(body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default())
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    message: Option<OllamaResponseMessage>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}
