//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
pub mod models;
pub mod run;
pub mod tools;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parley_agent::{Outcome, Session, ToolDispatcher};
use parley_config::AppConfig;
use parley_core::CompletionClient;

pub type CmdResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load config from `path` (or the default location) with env overrides.
pub fn load_config(path: Option<&Path>) -> CmdResult<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

/// The default completion client for this config.
pub fn default_client(config: &AppConfig) -> CmdResult<Arc<dyn CompletionClient>> {
    let router = parley_providers::build_from_config(config)?;
    router
        .default_client()
        .ok_or_else(|| "No default provider configured".into())
}

/// Declarations and handlers for every configured tool.
pub fn build_dispatcher(config: &AppConfig) -> CmdResult<ToolDispatcher> {
    let timeout = Duration::from_secs(config.session.request_timeout_secs);
    let mut dispatcher = ToolDispatcher::new();
    for (declaration, handler) in parley_tools::build_http_tools(&config.tools, timeout)? {
        dispatcher.register(declaration, handler)?;
    }
    Ok(dispatcher)
}

pub fn build_session(config: &AppConfig) -> CmdResult<Session> {
    let client = default_client(config)?;
    let dispatcher = build_dispatcher(config)?;
    Ok(Session::from_config(client, dispatcher, &config.session))
}

/// Print the text of an outcome; the caller maps it to an exit code.
pub fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Completed { text } | Outcome::Reply { text } => println!("{text}"),
        Outcome::NotConverged {
            iterations,
            last_text,
        } => {
            eprintln!("  Not finished after {iterations} completion requests.");
            if !last_text.is_empty() {
                println!("{last_text}");
            }
        }
        Outcome::AwaitingToolResults { calls } => {
            for call in calls {
                eprintln!(
                    "  Tool call {} ({}) has no handler: {}",
                    call.id, call.name, call.arguments
                );
            }
        }
    }
}
