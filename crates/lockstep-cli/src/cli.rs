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
    author = "Lockstep Developers",
    version,
    about = "Lockstep CLI - Runs lock-step simulation and analysis workflows on a pool of cooperating workers.",
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
    /// Generate configurations and iterate the module layer described by a run file.
    Run(RunArgs),
    /// List the registered module types with their target policy and keywords.
    Modules(ModulesArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the run file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Number of in-process workers. Overrides `run.processes`.
    #[arg(short = 'n', long, value_name = "NUM")]
    pub processes: Option<usize>,

    /// Number of iterations to perform. Overrides `run.iterations`.
    #[arg(short, long, value_name = "NUM")]
    pub iterations: Option<usize>,

    /// Skip the item-store consistency check after each broadcast.
    #[arg(long)]
    pub no_consistency_check: bool,

    /// Directory to write tabulated results (one CSV file per data set) into.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Override a module keyword from the run file.
    /// Format: INSTANCE.KEYWORD=VALUE (e.g., rdf01.BinWidth=0.1).
    /// Can be specified multiple times.
    #[arg(short = 'S', long = "set", value_name = "INSTANCE.KEYWORD=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `modules` subcommand.
#[derive(Args, Debug)]
pub struct ModulesArgs {
    /// Show the keywords of this module type only.
    #[arg(value_name = "TYPE")]
    pub module_type: Option<String>,
}
