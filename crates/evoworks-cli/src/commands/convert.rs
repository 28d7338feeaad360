use crate::cli::ConvertArgs;
use crate::config::PartialConversionConfig;
use crate::dialogs::TerminalDialogs;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use evoworks::core::io::keywords::Dialect;
use evoworks::engine::progress::ProgressReporter;
use evoworks::workflows::convert::{self, ConversionSummary, Session};
use tracing::{info, warn};

pub fn run(args: ConvertArgs, dialect: Dialect, quiet: bool) -> Result<()> {
    let partial_config = PartialConversionConfig::load(args.config.as_deref())?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args, dialect)?;

    let progress_handler = if quiet {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let dialogs = TerminalDialogs::new();
    let mut session = Session::new();

    info!("Invoking the {} conversion workflow...", dialect);
    let summary = convert::run_interactive(&mut session, &config, &dialogs, &reporter)?;

    report(&summary);
    Ok(())
}

fn report(summary: &ConversionSummary) {
    info!(
        "Workflow finished: {} operation(s), {} line(s).",
        summary.operations, summary.lines
    );

    if summary.lines == 0 {
        warn!("Conversion produced an empty worklist.");
        println!("Warning: the layout describes no transfers; the worklist is empty.");
    }
    println!(
        "✓ Worklist written to: {} ({} line(s): {} aspirate, {} dispense, {} wash)",
        summary.output.display(),
        summary.lines,
        summary.counts.aspirates,
        summary.counts.dispenses,
        summary.counts.washes
    );
    if summary.skipped > 0 {
        println!("  {} zero-volume transfer(s) skipped.", summary.skipped);
    }
    if !summary.warnings.is_empty() {
        println!("  {} warning(s) raised:", summary.warnings.len());
        for warning in &summary.warnings {
            println!("    - {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use crate::error::CliError;
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    const PLATES: &str = "[[plates]]\nid = \"R01\"\n\n[[plates]]\nid = \"T01\"\n";

    fn convert_args(args: &[&str]) -> ConvertArgs {
        let mut argv = vec!["evoworks", "pick"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Pick(args) => args,
            _ => panic!("Expected 'pick' subcommand"),
        }
    }

    #[test]
    fn picking_layout_is_written_with_configured_plates() {
        let dir = tempdir().unwrap();
        let config = dir.path().join("evoworks.toml");
        fs::write(&config, PLATES).unwrap();
        let input = dir.path().join("pick.csv");
        fs::write(
            &input,
            "source plate,source pos,target plate,target pos,volume\nR01,A1,T01,B1,12.5\n",
        )
        .unwrap();
        let output = dir.path().join("pick.gwl");

        let args = convert_args(&[
            "-c",
            config.to_str().unwrap(),
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--decimals",
            "1",
            "--no-wash",
        ]);
        run(args, Dialect::Picking, true).unwrap();

        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["A;R01;;;1;;12.5;;;", "D;T01;;;2;;12.5;;;"]);
    }

    #[test]
    fn unknown_plate_fails_without_writing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("pick.csv");
        fs::write(
            &input,
            "source plate,source pos,target plate,target pos,volume\nR01,A1,T01,B1,10\n",
        )
        .unwrap();
        let output = dir.path().join("pick.gwl");

        let args = convert_args(&["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()]);
        let result = run(args, Dialect::Picking, true);

        assert!(matches!(result, Err(CliError::Core(_))));
        assert!(!output.exists());
    }
}
