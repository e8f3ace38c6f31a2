//! Command-line interface for scribed
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batch transcription service for uploaded voice audio
#[derive(Parser, Debug)]
#[command(
    name = "scribed",
    version,
    about = "Batch transcription service for uploaded voice audio"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Silence gap that separates sessions (default: 30s). Examples: 45s, 2m
    #[arg(long, value_name = "DURATION", value_parser = parse_secs)]
    pub max_gap: Option<u64>,

    /// Session length at which a batch is force-closed (default: 2m)
    #[arg(long, value_name = "DURATION", value_parser = parse_secs)]
    pub batch_timeout: Option<u64>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration and exit
    Config,
}

impl Cli {
    /// Default log filter from the quiet/verbose flags; `RUST_LOG` wins.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers
/// (seconds), single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`).
fn parse_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_secs_accepts_bare_numbers() {
        assert_eq!(parse_secs("45"), Ok(45));
    }

    #[test]
    fn parse_secs_accepts_humantime_formats() {
        assert_eq!(parse_secs("30s"), Ok(30));
        assert_eq!(parse_secs("2m"), Ok(120));
        assert_eq!(parse_secs("1h30m"), Ok(5400));
    }

    #[test]
    fn parse_secs_rejects_garbage() {
        assert!(parse_secs("soon").is_err());
    }

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from(["scribed", "--max-gap", "45s", "--batch-timeout", "3m"]);
        assert_eq!(cli.max_gap, Some(45));
        assert_eq!(cli.batch_timeout, Some(180));
        assert!(cli.command.is_none());
    }

    #[test]
    fn verbosity_maps_to_log_level() {
        assert_eq!(Cli::parse_from(["scribed"]).log_level(), "info");
        assert_eq!(Cli::parse_from(["scribed", "-v"]).log_level(), "debug");
        assert_eq!(Cli::parse_from(["scribed", "-vv"]).log_level(), "trace");
        assert_eq!(Cli::parse_from(["scribed", "--quiet"]).log_level(), "warn");
    }
}
