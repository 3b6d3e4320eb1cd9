//! Command-line argument structures.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::backup_cmd::BackupCommand;
use crate::hosts_cmd::HostsCommand;
use crate::run_cmd::RunCommand;
use crate::scp_cmd::ScpCommand;
use crate::ssh_cmd::SshCommand;

/// Log verbosity level for CLI output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Only show errors
    Error,
    /// Show warnings and errors (default)
    #[default]
    Warn,
    /// Show informational messages, warnings, and errors
    Info,
    /// Show debug messages and above
    Debug,
    /// Show all messages including trace-level details
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<LogLevel> {
        match s.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Run commands, ssh and scp under a hard timeout.
///
/// Every command is started non-interactively and killed, together with
/// anything it spawned, when its deadline passes.
#[derive(Debug, Parser)]
#[command(name = "tether")]
#[command(author, version)]
#[command(about = "Run commands, ssh and scp under a hard timeout", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $TETHER_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics on stderr
    #[arg(long = "log-level", global = true, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,

    /// Enable verbose output (same as --log-level debug)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Print a JSON report instead of relaying raw output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a local program with a timeout
    #[command(display_order = 1)]
    Run(RunCommand),

    /// Run a command on a remote host over ssh
    #[command(display_order = 2)]
    Ssh(SshCommand),

    /// Copy files to or from a remote host over scp
    #[command(display_order = 3)]
    Scp(ScpCommand),

    /// Commit and optionally push everything in a git repository
    #[command(display_order = 4)]
    Backup(BackupCommand),

    /// List host profiles from the configuration file
    #[command(display_order = 5)]
    Hosts(HostsCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::time::Duration;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_level_from_str_loose() {
        assert_eq!(LogLevel::from_str_loose("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str_loose(" debug "), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str_loose("loud"), None);
    }

    #[test]
    fn test_run_collects_trailing_command() {
        let cli = Cli::try_parse_from([
            "tether", "--json", "run", "--timeout", "5s", "--", "sh", "-c", "echo hi",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Run(run) => {
                assert_eq!(run.timeout, Duration::from_secs(5));
                assert_eq!(run.command, vec!["sh", "-c", "echo hi"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_a_command() {
        assert!(Cli::try_parse_from(["tether", "run", "--timeout", "5s"]).is_err());
    }

    #[test]
    fn test_zero_timeout_is_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["tether", "run", "--timeout", "0", "--", "true"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tether", "hosts", "-v", "--config", "/tmp/t.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }
}
