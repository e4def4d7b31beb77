//! Client router: builds completion clients from config and looks them up
//! by name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::provider::CompletionClient;
use tracing::debug;

use crate::ollama::OllamaClient;
use crate::openai_compat::OpenAiCompatClient;

/// Routes completion requests to the correct backend.
pub struct ClientRouter {
    clients: HashMap<String, Arc<dyn CompletionClient>>,
    default_client: String,
}

impl ClientRouter {
    /// Create a new router with a default client name.
    pub fn new(default_client: impl Into<String>) -> Self {
        Self {
            clients: HashMap::new(),
            default_client: default_client.into(),
        }
    }

    /// Register a client.
    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn CompletionClient>) {
        self.clients.insert(name.into(), client);
    }

    /// Get the default client.
    pub fn default_client(&self) -> Option<Arc<dyn CompletionClient>> {
        self.clients.get(&self.default_client).cloned()
    }

    /// Get a specific client by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CompletionClient>> {
        self.clients.get(name).cloned()
    }

    /// List all registered client names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build clients from configuration.
///
/// Every `[providers.*]` table gets a client; the default provider is always
/// present. A hosted default provider without an API key is an error.
pub fn build_from_config(config: &AppConfig) -> Result<ClientRouter, ProviderError> {
    let timeout = Duration::from_secs(config.session.request_timeout_secs);
    let mut router = ClientRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));
        let api_key = config.api_key_for(name).unwrap_or_default();
        router.register(name.clone(), build_client(name, &base_url, &api_key, timeout)?);
    }

    if router.get(&config.default_provider).is_none() {
        let name = &config.default_provider;
        let api_key = config.api_key_for(name);
        if api_key.is_none() && !is_local(name) {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for '{name}'; set PARLEY_API_KEY or api_key in config.toml"
            )));
        }
        router.register(
            name.clone(),
            build_client(name, &default_base_url(name), &api_key.unwrap_or_default(), timeout)?,
        );
    }

    debug!(clients = ?router.list(), default = %config.default_provider, "Built completion clients");
    Ok(router)
}

fn build_client(
    name: &str,
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<Arc<dyn CompletionClient>, ProviderError> {
    Ok(if name == "ollama" {
        Arc::new(OllamaClient::new(base_url, timeout)?)
    } else {
        Arc::new(OpenAiCompatClient::new(name, base_url, api_key, timeout)?)
    })
}

fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => crate::ollama::DEFAULT_OLLAMA_URL.into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::ProviderConfig;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ClientRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatClient::openai("sk-test").unwrap()));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default_client().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
        assert!(default_base_url("groq").contains("api.groq.com"));
    }

    #[test]
    fn hosted_default_without_key_fails() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn build_with_key() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.default_client().unwrap().name(), "openai");
    }

    #[test]
    fn local_default_needs_no_key() {
        let config = AppConfig {
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.default_client().unwrap().name(), "ollama");
    }

    #[test]
    fn configured_providers_registered() {
        let mut config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "groq".into(),
            ProviderConfig {
                api_key: Some("gsk".into()),
                ..ProviderConfig::default()
            },
        );
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.list(), vec!["groq", "openai"]);
    }
}
