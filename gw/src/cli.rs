//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// genwatch - follow generation progress for a session
#[derive(Parser)]
#[command(
    name = "gw",
    about = "Start generation runs and follow their per-slot progress",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start generation for a session and follow it to completion
    Generate {
        /// Session id
        session: String,

        /// Record raw stream messages to this JSONL file
        #[arg(short, long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Record to a timestamped file under the data directory
        #[arg(long, conflicts_with = "record")]
        auto_record: bool,
    },

    /// Follow a generation that is already running
    Watch {
        /// Session id
        session: String,

        /// Record raw stream messages to this JSONL file
        #[arg(short, long, value_name = "FILE")]
        record: Option<PathBuf>,

        /// Record to a timestamped file under the data directory
        #[arg(long, conflicts_with = "record")]
        auto_record: bool,
    },

    /// Fold a recorded stream offline and print the final projection
    Replay {
        /// Recording produced by --record
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Print every change while replaying, not just the final projection
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Command {
    /// Recording target requested on the command line, if any
    pub fn recording(&self) -> Option<RecordTarget> {
        match self {
            Command::Generate { record, auto_record, .. } | Command::Watch { record, auto_record, .. } => {
                match (record, auto_record) {
                    (Some(path), _) => Some(RecordTarget::File(path.clone())),
                    (None, true) => Some(RecordTarget::Auto),
                    (None, false) => None,
                }
            }
            Command::Replay { .. } => None,
        }
    }
}

/// Where a live stream is recorded
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordTarget {
    File(PathBuf),
    Auto,
}

/// Output format for replay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genwatch")
        .join("logs")
        .join("genwatch.log");
    debug!(?path, "get_log_path: returning path");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate_with_record() {
        let cli = Cli::try_parse_from(["gw", "generate", "s1", "--record", "out.jsonl"]).unwrap();
        assert_eq!(cli.command.recording(), Some(RecordTarget::File(PathBuf::from("out.jsonl"))));
        assert!(matches!(cli.command, Command::Generate { ref session, .. } if session == "s1"));
    }

    #[test]
    fn test_parse_watch_auto_record_and_global_flags() {
        let cli = Cli::try_parse_from(["gw", "watch", "s2", "--auto-record", "-l", "debug"]).unwrap();
        assert_eq!(cli.command.recording(), Some(RecordTarget::Auto));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_record_flags_conflict() {
        assert!(Cli::try_parse_from(["gw", "watch", "s2", "--auto-record", "--record", "x"]).is_err());
    }

    #[test]
    fn test_parse_replay_format() {
        let cli = Cli::try_parse_from(["gw", "replay", "cap.jsonl", "--format", "JSON"]).unwrap();
        match cli.command {
            Command::Replay { file, format, verbose } => {
                assert_eq!(file, PathBuf::from("cap.jsonl"));
                assert_eq!(format, OutputFormat::Json);
                assert!(!verbose);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["gw", "replay", "cap.jsonl", "--format", "yaml"]).is_err());
    }
}
