//! Parley CLI: the main entry point.
//!
//! Commands:
//! - `chat`    Interactive or single-message chat with tools
//! - `run`     Work a task until the model says the sentinel
//! - `tools`   List configured tools
//! - `models`  List models offered by the configured backend
//! - `config`  Show, locate or validate the configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: tool-calling conversations with language models",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.parley/config.toml
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Attach an image (file path or URL) to the message; repeatable
        #[arg(long = "image")]
        images: Vec<String>,

        /// Print the whole conversation when done
        #[arg(long)]
        transcript: bool,
    },

    /// Work a task until the model reports it finished
    Run {
        /// The task description
        task: String,

        /// Prompt sent whenever the model stops short of the sentinel
        #[arg(long)]
        continue_prompt: Option<String>,

        /// Completion requests allowed for the task
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Completion marker to look for
        #[arg(long)]
        sentinel: Option<String>,

        /// Print the whole conversation when done
        #[arg(long)]
        transcript: bool,
    },

    /// List configured tools
    Tools,

    /// List models offered by the configured backend
    Models,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    let code = match cli.command {
        Commands::Chat {
            message,
            images,
            transcript,
        } => commands::chat::run(config_path, message, images, transcript).await?,
        Commands::Run {
            task,
            continue_prompt,
            max_iterations,
            sentinel,
            transcript,
        } => {
            let overrides = commands::run::Overrides {
                continue_prompt,
                max_iterations,
                sentinel,
            };
            commands::run::run(config_path, task, overrides, transcript).await?
        }
        Commands::Tools => commands::tools::run(config_path)?,
        Commands::Models => commands::models::run(config_path).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Init => commands::config_cmd::init(),
        },
    };

    Ok(code)
}
