//! Scripted completion client shared by the agent tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use parley_core::error::ProviderError;
use parley_core::message::MessageToolCall;
use parley_core::provider::{
    Candidate, CompletionClient, CompletionRequest, CompletionResponse, Usage,
};

/// Returns scripted responses in order and records every request.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    repeat: Option<CompletionResponse>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(results.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same response.
    pub fn repeating(response: CompletionResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `i`-th request received (0-based).
    pub fn request(&self, i: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(response) => Ok(response.clone()),
            None => panic!("ScriptedClient: no more responses (call #{n})"),
        }
    }
}

fn response(candidate: Candidate) -> CompletionResponse {
    CompletionResponse {
        candidates: vec![candidate],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
        }),
        model: "test-model".into(),
    }
}

/// A content-only response.
pub fn text_response(text: &str) -> CompletionResponse {
    response(Candidate::text(text))
}

/// A response that only calls tools.
pub fn calls_response(calls: Vec<MessageToolCall>) -> CompletionResponse {
    response(Candidate::with_calls("", calls))
}

pub fn call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall::new(id, name, arguments)
}
