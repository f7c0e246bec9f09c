use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod run;
pub mod split;
pub mod verify;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the producer/consumer pairs of a config file.
    Run(RunArgs),
    /// Check every frame of a record file against its declared pattern.
    Verify(VerifyArgs),
    /// Distribute the records of one file round-robin over N part files.
    Split(SplitArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Verify(args) => verify::run(args, format),
        Command::Split(args) => split::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON run configuration.
    pub config: PathBuf,
    /// Drive file-backed producers round-robin on a single task.
    #[arg(long)]
    pub cooperative: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Record file written by a file sink or a splitter.
    pub path: PathBuf,
    /// Largest frame accepted, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_len: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Record file to split.
    pub path: PathBuf,
    /// Number of part files.
    #[arg(long, short = 'n')]
    pub parts: usize,
    /// Directory for the part files. Default: next to the input file.
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
