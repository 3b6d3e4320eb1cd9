//! tether - main entry point.
//!
//! Parses arguments, installs logging on stderr and hands off to
//! [`dispatch_command`]. The process exit code comes from the command.

use clap::Parser;

use tether_cli::cli::{Cli, LogLevel, dispatch_command};
use tether_cli::utils::{EXIT_FAILURE, EXIT_OK, TermColor};

/// Log level from flags, then `TETHER_LOG_LEVEL`, then `--log-level`.
fn effective_log_level(cli: &Cli) -> LogLevel {
    if cli.verbose {
        LogLevel::Debug
    } else if let Ok(env_level) = std::env::var("TETHER_LOG_LEVEL") {
        LogLevel::from_str_loose(&env_level).unwrap_or(cli.log_level)
    } else {
        cli.log_level
    }
}

fn init_logging(level: LogLevel) {
    // RUST_LOG wins when set; otherwise our crates log at `level` and
    // everything else only reports errors.
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        let level = level.as_filter_str();
        format!("error,tether={level},tether_cli={level},tether_exec={level},tether_remote={level}")
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Usage errors exit 1; 2 is reserved for timeouts.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() { EXIT_FAILURE } else { EXIT_OK });
        }
    };
    init_logging(effective_log_level(&cli));

    let code = match dispatch_command(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", TermColor::Red.format_stderr("error:"));
            EXIT_FAILURE
        }
    };

    std::process::exit(code);
}
