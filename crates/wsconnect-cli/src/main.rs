//! wsconnect CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use wsconnect_core::{TracingConfig, TracingOutputFormat, init_tracing};

use wsconnect_cli::cli::{Cli, Command, ConfigAction};
use wsconnect_cli::config::CliConfig;
use wsconnect_cli::error::{CliError, CliResult};
use wsconnect_cli::{commands, signals};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let mut config = match cli.config {
        Some(ref path) => CliConfig::load_from(path)?,
        None => CliConfig::load()?,
    };
    config.apply_overrides(&cli);

    init_tracing(tracing_config(&cli, &config)?)?;

    match cli.command {
        Command::Poll(args) => {
            let cancel = CancellationToken::new();
            signals::cancel_on_interrupt(cancel.clone());
            let result = commands::poll::run(args, &config, cancel.clone()).await;
            cancel.cancel();
            result
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}

fn tracing_config(cli: &Cli, config: &CliConfig) -> CliResult<TracingConfig> {
    let mut tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };

    if let Some(ref name) = config.logging.format {
        let format = TracingOutputFormat::from_name(name)
            .ok_or_else(|| CliError::Config(format!("unknown log format {name:?}")))?;
        tracing = tracing.with_format(format);
    }
    if let Some(ref filter) = config.logging.filter {
        tracing = tracing.with_env_filter(filter);
    }
    Ok(tracing)
}
