//! `tether scp` - copy files to or from a remote host.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_exec::Invocation;
use tether_remote::{RemoteConfig, ScpRequest};

use crate::cli::CommandContext;
use crate::cli::handlers::retry_policy;
use crate::ssh_cmd::print_dry_run;
use crate::utils::{EXIT_OK, parse_timeout};

/// Which way the copy goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// Local SOURCE to remote DESTINATION
    Upload,
    /// Remote SOURCE to local DESTINATION
    Download,
}

/// Copy files to or from a remote host over scp.
#[derive(Debug, Parser)]
pub struct ScpCommand {
    /// Host profile name or [user@]host[:port]
    pub host: String,

    #[arg(value_enum)]
    pub direction: Direction,

    pub source: String,

    pub destination: String,

    /// Copy directories recursively
    #[arg(long, short = 'r')]
    pub recursive: bool,

    /// Preserve modification times and modes
    #[arg(long, short = 'p')]
    pub preserve: bool,

    /// Deadline for the whole transfer (default: profile or config timeout)
    #[arg(long, short = 't', value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Print the scp command line instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Retry this many times on timeout, doubling the deadline each time
    #[arg(long)]
    pub retries: Option<u32>,
}

impl ScpCommand {
    pub fn invocation(&self, config: &RemoteConfig) -> Result<Invocation> {
        let resolved = config
            .resolve_target(&self.host)
            .with_context(|| format!("Unknown host '{}'", self.host))?;

        let request = match self.direction {
            Direction::Upload => ScpRequest::upload(PathBuf::from(&self.source), self.destination.clone()),
            Direction::Download => ScpRequest::download(self.source.clone(), PathBuf::from(&self.destination)),
        };

        request
            .recursive(self.recursive)
            .preserve(self.preserve)
            .timeout(self.timeout.unwrap_or(resolved.timeout))
            .kill_grace(config.defaults.kill_grace())
            .program(config.defaults.scp_program.clone())
            .invocation(&resolved.target)
            .context("Invalid scp transfer")
    }

    pub async fn run(self, ctx: &CommandContext) -> Result<i32> {
        let config = ctx.load_config()?;
        let invocation = self.invocation(&config)?;

        if self.dry_run {
            print_dry_run(&invocation, ctx.json)?;
            return Ok(EXIT_OK);
        }

        let policy = retry_policy(&config.retry, self.retries);
        ctx.execute_and_report(&invocation, &policy).await
    }
}
