//! `tether ssh` - run a command on a remote host.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_exec::Invocation;
use tether_remote::{RemoteConfig, SshRequest};

use crate::cli::CommandContext;
use crate::cli::handlers::retry_policy;
use crate::utils::{EXIT_OK, parse_timeout};

/// Run a command on a remote host over ssh.
#[derive(Debug, Parser)]
pub struct SshCommand {
    /// Host profile name or [user@]host[:port]
    pub host: String,

    /// Deadline for the whole session (default: profile or config timeout)
    #[arg(long, short = 't', value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Force a UTF-8 locale on the remote side
    #[arg(long)]
    pub utf8: bool,

    /// Print the ssh command line instead of running it
    #[arg(long)]
    pub dry_run: bool,

    /// Retry this many times on timeout, doubling the deadline each time
    #[arg(long)]
    pub retries: Option<u32>,

    /// Remote command
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl SshCommand {
    pub fn invocation(&self, config: &RemoteConfig) -> Result<Invocation> {
        let resolved = config
            .resolve_target(&self.host)
            .with_context(|| format!("Unknown host '{}'", self.host))?;

        let request = SshRequest::new(self.command.iter().cloned())
            .timeout(self.timeout.unwrap_or(resolved.timeout))
            .utf8(self.utf8 || resolved.utf8)
            .kill_grace(config.defaults.kill_grace())
            .program(config.defaults.ssh_program.clone());

        request
            .invocation(&resolved.target)
            .context("Invalid ssh command")
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

/// Show what would run, for `--dry-run`.
pub fn print_dry_run(invocation: &Invocation, json: bool) -> Result<()> {
    if json {
        crate::utils::print_json(&serde_json::json!({
            "command": invocation.command_line(),
            "program": invocation.program(),
            "args": invocation.args(),
            "timeout_ms": invocation.timeout().as_millis() as u64,
        }))
    } else {
        let line = format!("{}\n", invocation.command_line());
        crate::utils::safe_write_stdout(line.as_bytes()).context("failed to write command line")
    }
}
