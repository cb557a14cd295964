//! Conductor CLI entry point.

use clap::Parser;

use conductor::cli::{commands, handle_error, Cli, Commands};
use conductor::infrastructure::{ConfigLoader, LogConfig, LoggerImpl};

/// Logging follows the project configuration. Stdout output is only enabled
/// with `--verbose` so command output stays machine readable.
fn init_logging(verbose: bool) -> Option<LoggerImpl> {
    let settings = ConfigLoader::load().map(|c| c.logging).unwrap_or_default();
    let mut log_config = LogConfig::try_from(&settings).unwrap_or_default();
    log_config.enable_stdout = verbose;

    if !verbose && log_config.log_dir.is_none() {
        return None;
    }
    match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let _logger = init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Config(args) => commands::config::execute(args, cli.json).await,
        Commands::Simulate(args) => commands::simulate::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
