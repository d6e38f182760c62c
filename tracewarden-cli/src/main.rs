//! Tracewarden CLI entry point
//!
//! Parses arguments, loads configuration, initializes logging and
//! dispatches to the subcommand handlers. Errors are printed to stderr and
//! mapped to the exit codes documented on [`CliError::exit_code`].

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use clap::Parser;

use tracewarden_core::config::TracewardenConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // `config validate` reports a broken file itself, so it must still get a logger
    let loaded = commands::load_config(&cli.config).await;
    let general = match &loaded {
        Ok(config) => config.general.clone(),
        Err(_) => TracewardenConfig::default().general,
    };
    logging::init_tracing(&general, cli.log_level.as_deref())
        .map_err(|e| CliError::Config(e.to_string()))?;

    tracewarden_core::metrics::describe_all();
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Run(args) => commands::run::execute(args, &loaded?, &writer).await,
        Commands::Analyze(args) => commands::analyze::execute(args, &loaded?, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &loaded?, &writer).await,
    }
}
