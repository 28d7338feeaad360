use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "evoworks CLI - Converts spreadsheet plate layouts into Tecan Freedom EVOware worklists (.gwl).",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a picking layout (one transfer per row) into a worklist.
    Pick(ConvertArgs),
    /// Convert a distribution layout (one source per row, destination wells as columns).
    Distribute(ConvertArgs),
    /// List the plate formats known to a run.
    Formats(FormatsArgs),
}

/// Arguments shared by the `pick` and `distribute` subcommands.
#[derive(Args, Debug, Default)]
pub struct ConvertArgs {
    // --- Files ---
    /// Layout spreadsheet (.xls, .xlsx, .ods, .csv or .tsv).
    /// Asked for on the terminal when neither given here nor in the config file.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Worklist file to write (.gwl).
    /// Asked for on the terminal when neither given here nor in the config file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name of the workbook sheet holding the layout (defaults to the first sheet).
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Sample list registered before the layout is converted. Can be repeated.
    #[arg(long = "source", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    // --- Plates and Samples ---
    /// Plate format used for plates created on the fly (e.g. '96', '384').
    #[arg(long, value_name = "FORMAT")]
    pub default_format: Option<String>,

    /// Register unknown plates with the default format instead of failing.
    #[arg(long)]
    pub auto_create_plates: bool,

    /// Let a source identifier without '#sub-id' match a unique sub-identified sample.
    #[arg(long)]
    pub relaxed_ids: bool,

    /// Warn instead of failing when a reaction receives more than its target volume.
    #[arg(long)]
    pub allow_overfill: bool,

    /// Volume used for picking rows without a volume column.
    #[arg(long, value_name = "FLOAT")]
    pub default_volume: Option<f64>,

    /// Destination plate for distribution headers that name only a well.
    #[arg(long, value_name = "PLATE")]
    pub destination_plate: Option<String>,

    // --- Worklist Output ---
    /// Number of decimals written for volumes.
    #[arg(long, value_name = "NUM")]
    pub decimals: Option<u8>,

    /// Largest volume a single tip holds; larger groups are split.
    #[arg(long, value_name = "FLOAT")]
    pub max_tip_volume: Option<f64>,

    /// Write transfers grouped by source instead of in sheet order.
    #[arg(long)]
    pub by_source: bool,

    /// Write a comment line before every aspirate.
    #[arg(long)]
    pub annotate: bool,

    /// Do not write a wash command after each dispense group.
    #[arg(long)]
    pub no_wash: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S worklist.volume-decimals=1
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `formats` subcommand.
#[derive(Args, Debug)]
pub struct FormatsArgs {
    /// Configuration file whose custom formats are listed as well.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}
