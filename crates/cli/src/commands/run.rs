//! `parley run`: work a task until the model reports it finished.

use std::path::Path;
use std::process::ExitCode;

use parley_config::AppConfig;

use super::chat::exit_status;
use super::{CmdResult, build_session, load_config, print_outcome};

/// Command-line overrides of the `[session]` table.
#[derive(Debug, Default)]
pub struct Overrides {
    pub continue_prompt: Option<String>,
    pub max_iterations: Option<u32>,
    pub sentinel: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut AppConfig) -> CmdResult<()> {
        let session = &mut config.session;
        if let Some(prompt) = self.continue_prompt {
            session.continue_prompt = prompt;
        }
        if let Some(max) = self.max_iterations {
            session.max_iterations = max;
        }
        if let Some(sentinel) = self.sentinel {
            session.sentinel = Some(sentinel);
        }
        config.validate()?;
        Ok(())
    }
}

pub async fn run(
    config_path: Option<&Path>,
    task: String,
    overrides: Overrides,
    transcript: bool,
) -> CmdResult<ExitCode> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config)?;

    let mut session = build_session(&config)?;
    tracing::info!(
        session_id = %session.id(),
        model = %config.session.model,
        tools = session.tools().len(),
        max_iterations = config.session.max_iterations,
        "Running task"
    );

    let outcome = session.run(task, &config.session.continue_prompt).await;

    if transcript {
        println!("{}", session.transcript());
    }
    let outcome = outcome?;
    print_outcome(&outcome);

    let usage = session.usage();
    tracing::info!(
        outcome = outcome.kind(),
        iterations = session.iterations(),
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "Task ended"
    );

    Ok(ExitCode::from(exit_status(&outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_session_settings() {
        let mut config = AppConfig::default();
        Overrides {
            continue_prompt: Some("go on".into()),
            max_iterations: Some(4),
            sentinel: Some("<<DONE>>".into()),
        }
        .apply(&mut config)
        .unwrap();

        assert_eq!(config.session.continue_prompt, "go on");
        assert_eq!(config.session.max_iterations, 4);
        assert_eq!(config.session.sentinel.as_deref(), Some("<<DONE>>"));
    }

    #[test]
    fn zero_budget_override_rejected() {
        let mut config = AppConfig::default();
        let overrides = Overrides {
            max_iterations: Some(0),
            ..Overrides::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }
}
