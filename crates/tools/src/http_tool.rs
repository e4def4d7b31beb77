//! HTTP-backed tools.
//!
//! A tool declared in `[[tools]]` answers a call by POSTing a JSON body to
//! its URL: the configured static `fields` (task name, API key, ...) merged
//! with the validated call arguments. The response body becomes the tool
//! result text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_config::HttpToolConfig;
use parley_core::error::ToolError;
use parley_core::tool::{ToolArguments, ToolDeclaration, ToolHandler};
use tracing::debug;

pub struct HttpTool {
    client: reqwest::Client,
    url: String,
    fields: serde_json::Map<String, serde_json::Value>,
    max_output_chars: usize,
}

impl HttpTool {
    pub fn new(client: reqwest::Client, config: &HttpToolConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            fields: config.fields.clone(),
            max_output_chars: config.max_output_chars,
        }
    }

    /// Static fields first, call arguments on top.
    fn request_body(&self, arguments: &ToolArguments) -> serde_json::Value {
        let mut body = self.fields.clone();
        if let serde_json::Value::Object(args) = serde_json::Value::from(arguments) {
            body.extend(args);
        }
        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl ToolHandler for HttpTool {
    async fn handle(&self, tool_name: &str, arguments: &ToolArguments) -> Result<String, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason,
        };

        debug!(tool = %tool_name, url = %self.url, "POSTing tool call");

        let response = self
            .client
            .post(&self.url)
            .json(&self.request_body(arguments))
            .send()
            .await
            .map_err(|e| failed(format!("request to {} failed: {e}", self.url)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| failed(format!("reading response failed: {e}")))?;

        if !status.is_success() {
            return Err(failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&text, self.max_output_chars)
            )));
        }

        Ok(truncate(&text, self.max_output_chars))
    }
}

/// Cut `text` to at most `max_chars` characters, noting the original size.
fn truncate(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n... (truncated, {total} chars total)")
}

/// Build the declaration and handler for every configured HTTP tool.
///
/// All tools share one HTTP client bounded by `timeout`.
pub fn build_http_tools(
    configs: &[HttpToolConfig],
    timeout: Duration,
) -> Result<Vec<(ToolDeclaration, Arc<dyn ToolHandler>)>, ToolError> {
    if configs.is_empty() {
        return Ok(Vec::new());
    }

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "http".into(),
            reason: format!("HTTP client: {e}"),
        })?;

    Ok(configs
        .iter()
        .map(|config| {
            let handler: Arc<dyn ToolHandler> = Arc::new(HttpTool::new(client.clone(), config));
            (config.declaration(), handler)
        })
        .collect())
}
