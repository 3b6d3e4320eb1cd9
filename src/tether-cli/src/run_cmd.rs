//! `tether run` - run a local program under a deadline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tether_exec::Invocation;
use tether_remote::RetryPolicy;

use crate::cli::CommandContext;
use crate::cli::handlers::retry_policy;
use crate::utils::{parse_grace, parse_timeout};

/// Run a local program with a timeout.
#[derive(Debug, Parser)]
pub struct RunCommand {
    /// Deadline, e.g. 500ms, 30s, 5m (bare numbers are seconds)
    #[arg(long, short = 't', value_parser = parse_timeout, default_value = "30s")]
    pub timeout: Duration,

    /// Working directory for the program
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable (repeatable)
    #[arg(long = "env", short = 'e', value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Ask politely (SIGTERM) and wait this long before killing
    #[arg(long, value_name = "DURATION", value_parser = parse_grace)]
    pub kill_grace: Option<Duration>,

    /// Retry this many times on timeout, doubling the deadline each time
    #[arg(long)]
    pub retries: Option<u32>,

    /// Program and its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunCommand {
    pub fn invocation(&self) -> Result<Invocation> {
        let Some((program, args)) = self.command.split_first() else {
            bail!("No command given");
        };

        let mut builder = Invocation::builder(program)
            .args(args.iter().cloned())
            .envs(self.env.iter().cloned())
            .timeout(self.timeout);
        if let Some(dir) = &self.cwd {
            builder = builder.current_dir(dir);
        }
        if let Some(grace) = self.kill_grace {
            builder = builder.kill_grace(grace);
        }

        builder.build().context("Invalid command")
    }

    pub async fn run(self, ctx: &CommandContext) -> Result<i32> {
        let invocation = self.invocation()?;
        let policy = retry_policy(&RetryPolicy::default(), self.retries);
        ctx.execute_and_report(&invocation, &policy).await
    }
}

/// Parse `KEY=VALUE`; the value may be empty or contain `=`.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
