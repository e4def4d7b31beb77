//! `parley chat`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use parley_agent::{Outcome, Session};
use parley_core::ContentPart;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CmdResult, build_session, load_config, print_outcome};

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    images: Vec<String>,
    transcript: bool,
) -> CmdResult<ExitCode> {
    let config = load_config(config_path)?;
    let mut session = build_session(&config)?;
    let parts = images
        .iter()
        .map(String::as_str)
        .map(image_part)
        .collect::<CmdResult<Vec<_>>>()?;

    let code = if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = session.user_with_parts(msg, parts).await;
        eprint!("\r              \r");
        let outcome = outcome?;
        print_outcome(&outcome);
        ExitCode::from(exit_status(&outcome))
    } else {
        interactive(&mut session, &config.default_provider, &config.session.model, parts).await?
    };

    if transcript {
        println!();
        println!("{}", session.transcript());
    }

    let usage = session.usage();
    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "Session usage"
    );

    Ok(code)
}

async fn interactive(
    session: &mut Session,
    provider: &str,
    model: &str,
    mut first_parts: Vec<ContentPart>,
) -> CmdResult<ExitCode> {
    println!();
    println!("  Parley: interactive mode");
    println!();
    println!("  Provider:  {provider}");
    println!("  Model:     {model}");
    println!("  Tools:     {}", session.tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut code = ExitCode::SUCCESS;

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if line.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        eprint!("  ...");
        let result = session
            .user_with_parts(line, std::mem::take(&mut first_parts))
            .await;
        eprint!("\r     \r");

        match result {
            Ok(outcome) => {
                println!();
                if let Some(text) = outcome.text() {
                    for l in text.lines() {
                        println!("  Assistant > {l}");
                    }
                } else {
                    print_outcome(&outcome);
                }
                println!();
                code = ExitCode::from(exit_status(&outcome));
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    Ok(code)
}

/// A `--image` argument: a URL, a data URI, or a local file.
fn image_part(src: &str) -> CmdResult<ContentPart> {
    if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("data:") {
        Ok(ContentPart::image_url(src))
    } else {
        ContentPart::image_from_file(src)
            .map_err(|e| format!("Failed to read image {src}: {e}").into())
    }
}

/// 0 for an answer, 2 when the budget ran out, 1 otherwise.
pub fn exit_status(outcome: &Outcome) -> u8 {
    match outcome {
        Outcome::Completed { .. } | Outcome::Reply { .. } => 0,
        Outcome::NotConverged { .. } => 2,
        Outcome::AwaitingToolResults { .. } => 1,
    }
}
