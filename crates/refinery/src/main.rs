mod api;
mod app;
mod commands;
mod config;
mod rate_limit;
mod serve;
mod validation;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use refinery_logging::LogFormat;

use crate::app::{App, Overrides};
use crate::commands::{handle_command, Command};
use crate::config::ProjectConfig;

#[derive(Parser, Debug)]
#[command(
    name = "refinery",
    about = "Iterative requirement analysis with LLM refinement",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// LLM provider (gemini, openai)
    #[arg(long, global = true, env = "REFINERY_PROVIDER")]
    provider: Option<String>,

    /// Model to use (provider default if omitted)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Diagnostic log level (overridden by RUST_LOG)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let log_format: LogFormat = cli.log_format.into();
    let log_file = config.engine.log_file.as_ref().map(|p| working_dir.join(p));
    let _log_guard = refinery_logging::init_tracing(&cli.log_level, log_format, log_file.as_deref());

    let overrides = Overrides {
        provider: cli.provider,
        model: cli.model,
    };
    let app = App::open(&config, &overrides, log_format, &working_dir)?;

    handle_command(cli.command, &app, &config, &working_dir).await
}
