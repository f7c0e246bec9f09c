mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "framepipe", version, about = "Synthetic frame producer/consumer harness")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "FRAMEPIPE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cooperative_run() {
        let cli = Cli::try_parse_from(["framepipe", "run", "/tmp/run.json", "--cooperative"])
            .expect("run args should parse");

        match cli.command {
            Command::Run(args) => {
                assert!(args.cooperative);
                assert_eq!(args.config, std::path::PathBuf::from("/tmp/run.json"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn split_requires_parts() {
        let err = Cli::try_parse_from(["framepipe", "split", "/tmp/hits.dat"])
            .expect_err("missing --parts should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "framepipe",
            "verify",
            "/tmp/out.dat",
            "--format",
            "pretty",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after the subcommand");

        assert_eq!(cli.format, Some(OutputFormat::Pretty));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Command::Verify(_)));
    }
}
