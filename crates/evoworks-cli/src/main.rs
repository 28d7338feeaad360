mod cli;
mod commands;
mod config;
mod dialogs;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use evoworks::core::io::keywords::Dialect;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!(
        "🚀 evoworks CLI v{} starting up.",
        env!("CARGO_PKG_VERSION")
    );
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let quiet = cli.quiet;
    let command_result = match cli.command {
        Commands::Pick(args) => {
            info!("Dispatching to 'pick' command.");
            commands::convert::run(args, Dialect::Picking, quiet)
        }
        Commands::Distribute(args) => {
            info!("Dispatching to 'distribute' command.");
            commands::convert::run(args, Dialect::Distribution, quiet)
        }
        Commands::Formats(args) => {
            info!("Dispatching to 'formats' command.");
            commands::formats::run(args)
        }
    };

    match &command_result {
        Ok(_) => info!("✅ Command completed successfully."),
        Err(e) => error!("❌ Command failed: {}", e),
    }

    command_result
}
