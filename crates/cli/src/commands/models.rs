//! `parley models`: list models offered by the configured backend.

use std::path::Path;
use std::process::ExitCode;

use super::{CmdResult, default_client, load_config};

pub async fn run(config_path: Option<&Path>) -> CmdResult<ExitCode> {
    let config = load_config(config_path)?;
    let client = default_client(&config)?;

    let mut models = client.list_models().await?;
    models.sort();

    println!("Models available from {}:", client.name());
    for model in &models {
        let marker = if *model == config.session.model { " (default)" } else { "" };
        println!("  {model}{marker}");
    }
    if models.is_empty() {
        println!("  (the backend did not report any)");
    }

    Ok(ExitCode::SUCCESS)
}
