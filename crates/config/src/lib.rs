//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup. This is the only
//! place that reads the process environment; everything downstream receives
//! plain config values.

use parley_core::provider::ResponseFormat;
use parley_core::tool::{ToolDeclaration, ToolParameter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Session defaults
    #[serde(default)]
    pub session: SessionConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// HTTP-backed tools offered to the model
    #[serde(default)]
    pub tools: Vec<HttpToolConfig>,
}

fn default_provider() -> String {
    "openai".into()
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("session", &self.session)
            .field("providers", &self.providers)
            .field("tools", &self.tools)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Defaults for every session the CLI opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Max output tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default)]
    pub response_format: ResponseFormat,

    /// Completion requests allowed per task
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Completion marker; `sentinel = false` (`None`) disables detection
    #[serde(default = "default_sentinel", with = "sentinel_setting")]
    pub sentinel: Option<String>,

    /// Prompt sent when the model stops without the sentinel
    #[serde(default = "default_continue_prompt")]
    pub continue_prompt: String,

    /// Candidates requested per completion
    #[serde(default = "default_candidates")]
    pub candidates: u32,

    #[serde(default)]
    pub parallel_tool_calls: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_system_prompt() -> String {
    "Solve the task using available tools. Reply with [FINISHED] when the task is solved.".into()
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_max_iterations() -> u32 {
    10
}
fn default_sentinel() -> Option<String> {
    Some("[FINISHED]".into())
}

/// `sentinel = "[DONE]"` sets the marker, `sentinel = false` turns detection
/// off. TOML has no null, so a missing key means the default marker.
mod sentinel_setting {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Setting {
        Marker(String),
        Enabled(bool),
    }

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(marker) => serializer.serialize_str(marker),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        match Setting::deserialize(deserializer)? {
            Setting::Marker(marker) => Ok(Some(marker)),
            Setting::Enabled(false) => Ok(None),
            Setting::Enabled(true) => Err(D::Error::custom(
                "sentinel = true is not a marker; give the marker text or false",
            )),
        }
    }
}

fn default_continue_prompt() -> String {
    "continue".into()
}
fn default_candidates() -> u32 {
    1
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            response_format: ResponseFormat::Text,
            max_iterations: default_max_iterations(),
            sentinel: default_sentinel(),
            continue_prompt: default_continue_prompt(),
            candidates: default_candidates(),
            parallel_tool_calls: false,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// A tool answered by POSTing its arguments to an HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpToolConfig {
    pub name: String,

    pub description: String,

    pub url: String,

    /// Static fields merged into every request body (e.g. task name, key)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,

    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

fn default_max_output_chars() -> usize {
    8000
}

impl HttpToolConfig {
    /// The declaration offered to the model.
    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment overrides:
    /// - `PARLEY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `PARLEY_PROVIDER`
    /// - `PARLEY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PARLEY_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("PARLEY_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("PARLEY_MODEL") {
            self.session.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if !(0.0..=2.0).contains(&session.temperature) {
            return Err(ConfigError::ValidationError(
                "session.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if session.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_iterations must be > 0".into(),
            ));
        }
        if session.candidates == 0 {
            return Err(ConfigError::ValidationError(
                "session.candidates must be > 0".into(),
            ));
        }
        if session.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_tokens must be > 0".into(),
            ));
        }
        if session.sentinel.as_deref() == Some("") {
            return Err(ConfigError::ValidationError(
                "session.sentinel must not be empty (set `sentinel = false` to disable)".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("tool name must not be empty".into()));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' is declared more than once",
                    tool.name
                )));
            }
            if !tool.url.starts_with("http://") && !tool.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' url must start with http:// or https://",
                    tool.name
                )));
            }
            if let Some(clash) = tool.parameters.iter().find(|p| tool.fields.contains_key(&p.name)) {
                return Err(ConfigError::ValidationError(format!(
                    "tool '{}' parameter '{}' collides with a static field",
                    tool.name, clash.name
                )));
            }
        }

        Ok(())
    }

    /// API key for a provider: its own key first, then the global one.
    pub fn api_key_for(&self, provider: &str) -> Option<String> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key.clone())
            .or_else(|| self.api_key.clone())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            session: SessionConfig::default(),
            providers: HashMap::new(),
            tools: vec![],
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATABASE_AGENT: &str = r#"
default_provider = "openai"

[session]
model = "gpt-4o"
max_iterations = 6
sentinel = "[DONE]"
response_format = "json_object"

[[tools]]
name = "exec_sql_statement"
description = "Executes the given SQL statement"
url = "https://db.example.com/api"
[tools.fields]
task = "database"

[[tools.parameters]]
name = "query"
type = "string"
description = "SQL statement to execute, e.g. 'select * from users'"
"#;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.session.max_tokens, 1000);
        assert!(config.session.temperature.abs() < f32::EPSILON);
        assert_eq!(config.session.sentinel.as_deref(), Some("[FINISHED]"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.session.max_iterations, config.session.max_iterations);
    }

    #[test]
    fn parses_session_and_http_tools() {
        let config: AppConfig = toml::from_str(DATABASE_AGENT).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.model, "gpt-4o");
        assert_eq!(config.session.response_format, ResponseFormat::JsonObject);
        assert_eq!(config.tools.len(), 1);

        let tool = &config.tools[0];
        assert_eq!(tool.fields["task"], "database");
        assert_eq!(tool.max_output_chars, 8000);
        let decl = tool.declaration();
        assert_eq!(decl.parameters.len(), 1);
        assert!(decl.parameters[0].required);
        assert_eq!(decl.parameters_schema()["properties"]["query"]["type"], "string");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.session.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iteration_budget_rejected() {
        let mut config = AppConfig::default();
        config.session.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_tool_names_rejected() {
        let mut config: AppConfig = toml::from_str(DATABASE_AGENT).unwrap();
        config.tools.push(config.tools[0].clone());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn bad_tool_url_and_field_clash_rejected() {
        let mut config: AppConfig = toml::from_str(DATABASE_AGENT).unwrap();
        config.tools[0].url = "ftp://db".into();
        assert!(config.validate().is_err());

        let mut config: AppConfig = toml::from_str(DATABASE_AGENT).unwrap();
        config.tools[0]
            .fields
            .insert("query".into(), serde_json::json!("fixed"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("PARLEY_PROVIDER", "ollama"),
            ("PARLEY_MODEL", "llama3.2"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.default_provider, "ollama");
        assert_eq!(config.session.model, "llama3.2");
    }

    #[test]
    fn configured_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|_| Some("sk-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn provider_key_preferred_over_global() {
        let mut config = AppConfig {
            api_key: Some("global".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "groq".into(),
            ProviderConfig {
                api_key: Some("groq-key".into()),
                ..ProviderConfig::default()
            },
        );
        assert_eq!(config.api_key_for("groq").as_deref(), Some("groq-key"));
        assert_eq!(config.api_key_for("openai").as_deref(), Some("global"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file_and_report_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.toml");
        std::fs::write(&good, DATABASE_AGENT).unwrap();
        let config = AppConfig::load_from(&good).unwrap();
        assert_eq!(config.session.sentinel.as_deref(), Some("[DONE]"));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "session = 3").unwrap();
        assert!(matches!(
            AppConfig::load_from(&bad),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn sentinel_can_be_disabled_explicitly() {
        let config: AppConfig = toml::from_str("[session]\nsentinel = false\n").unwrap();
        assert_eq!(config.session.sentinel, None);
        assert!(config.validate().is_ok());

        // Survives a trip through `config show`
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(rendered.contains("sentinel = false"));
        let reparsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.session.sentinel, None);

        let omitted: AppConfig = toml::from_str("[session]\nmodel = \"m\"\n").unwrap();
        assert_eq!(omitted.session.sentinel.as_deref(), Some("[FINISHED]"));

        assert!(toml::from_str::<AppConfig>("[session]\nsentinel = true\n").is_err());
    }

    #[test]
    fn empty_sentinel_points_at_the_disable_form() {
        let mut config = AppConfig::default();
        config.session.sentinel = Some(String::new());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sentinel = false"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[FINISHED]"));
    }
}
