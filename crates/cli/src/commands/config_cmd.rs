//! `parley config`: configuration management commands.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use parley_config::AppConfig;

use super::{CmdResult, load_config};

/// The config file in use.
pub fn config_file(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn validate(config_path: Option<&Path>) -> CmdResult<ExitCode> {
    println!("Validating {}...", config_file(config_path).display());

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    println!("   Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:    {}", config.default_provider);
    println!("   Model:       {}", config.session.model);
    println!("   Budget:      {} requests", config.session.max_iterations);
    println!(
        "   Sentinel:    {}",
        config.session.sentinel.as_deref().unwrap_or("(disabled)")
    );
    println!("   Tools:       {}", config.tools.len());

    Ok(ExitCode::SUCCESS)
}

/// Settings that are valid but probably not what the user wants.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let local = matches!(config.default_provider.as_str(), "ollama" | "vllm" | "llamacpp");
    if config.api_key_for(&config.default_provider).is_none() && !local {
        warnings.push("No API key set (set PARLEY_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if config.session.sentinel.is_none() {
        warnings.push("No sentinel: `run` can only stop at the iteration budget".to_string());
    }
    if config.session.candidates > 1 && config.default_provider == "ollama" {
        warnings.push("Ollama returns a single candidate; `candidates` is ignored".to_string());
    }
    warnings
}

pub fn show(config_path: Option<&Path>) -> CmdResult<ExitCode> {
    let mut config = load_config(config_path)?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}

pub fn path(config_path: Option<&Path>) -> ExitCode {
    println!("{}", config_file(config_path).display());
    ExitCode::SUCCESS
}

pub fn init() -> ExitCode {
    print!("{}", AppConfig::default_toml());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        assert_eq!(
            config_file(Some(Path::new("/tmp/p.toml"))),
            PathBuf::from("/tmp/p.toml")
        );
        assert!(config_file(None).ends_with(".parley/config.toml"));
    }

    #[test]
    fn warns_about_missing_key_and_sentinel() {
        let mut config = AppConfig::default();
        config.session.sentinel = None;
        let w = warnings(&config);
        assert_eq!(w.len(), 2);

        let config = AppConfig {
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        assert!(warnings(&config).is_empty());
    }
}
