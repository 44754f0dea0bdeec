//! CLI argument parsing
//!
//! Defines the built-in command-line interface using clap. The derived
//! command is handed to extensions and layers as a plain [`Command`] so
//! they can add their own arguments before parsing.

use anyhow::Result;
use clap::{ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use std::path::PathBuf;

/// Test execution orchestrator
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "seismograph")]
#[command(version)]
#[command(about = "Run test suites sequentially, on threads, in worker processes or cooperatively")]
#[command(long_about = None)]
pub struct Args {
    /// Run suites as cooperative tasks on a single thread
    #[arg(long, alias = "gevent")]
    pub cooperative: bool,

    /// Run each suite on its own OS thread
    #[arg(long)]
    pub threading: bool,

    /// Run each suite in a worker process
    #[arg(long)]
    pub multiprocessing: bool,

    /// Maximum concurrent worker processes
    #[arg(long)]
    pub workers: Option<usize>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Decimal places for reported runtimes
    #[arg(long)]
    pub round_runtime: Option<u32>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Suite module to run
    #[arg(short, long)]
    pub module: Option<String>,

    /// Suite manifest to run
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Args {
    /// Extract the built-in arguments from matches of a possibly extended command
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        Ok(Self::from_arg_matches(matches)?)
    }
}

/// Build the base option parser for a program
pub fn command(bin_name: &str) -> Command {
    Args::command().bin_name(bin_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;

    #[test]
    fn test_gevent_alias() {
        let args = Args::parse_from(["seismograph", "--gevent", "--workers", "3"]);
        assert!(args.cooperative);
        assert_eq!(args.workers, Some(3));
        assert!(!args.threading);
    }

    #[test]
    fn test_extended_command_parses() {
        let cmd = command("suite-runner").arg(Arg::new("seed").long("seed"));
        let matches = cmd
            .try_get_matches_from(["suite-runner", "--seed", "42", "--threading"])
            .unwrap();

        let args = Args::from_matches(&matches).unwrap();
        assert!(args.threading);
        assert_eq!(matches.get_one::<String>("seed").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(command("seismograph")
            .try_get_matches_from(["seismograph", "--nope"])
            .is_err());
    }
}
