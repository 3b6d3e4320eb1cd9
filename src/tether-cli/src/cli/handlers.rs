//! Command dispatch and the context shared by all handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tether_exec::{BoundedRunner, Invocation};
use tether_remote::{RemoteConfig, RetryOutcome, RetryPolicy, run_with_retry};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::args::{Cli, Commands};

/// State every subcommand needs.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config_path: Option<PathBuf>,
    pub json: bool,
    pub runner: BoundedRunner,
    /// Cancelled on Ctrl+C.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(config_path: Option<PathBuf>, json: bool) -> Self {
        Self {
            config_path,
            json,
            runner: BoundedRunner::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn load_config(&self) -> Result<RemoteConfig> {
        RemoteConfig::load(self.config_path.as_deref()).context("Failed to load configuration")
    }

    /// Run `invocation`, retrying timeouts per `policy`.
    pub async fn execute(&self, invocation: &Invocation, policy: &RetryPolicy) -> RetryOutcome {
        run_with_retry(&self.runner, invocation, policy, Some(self.cancel.clone())).await
    }

    /// Run `invocation` and relay its outcome; returns the process exit code.
    pub async fn execute_and_report(&self, invocation: &Invocation, policy: &RetryPolicy) -> Result<i32> {
        let result = self.execute(invocation, policy).await;
        crate::utils::emit(&result.last, &result.outcome, result.attempts, self.json)
    }
}

/// `--retries N` means N extra attempts; without it `base` applies.
pub fn retry_policy(base: &RetryPolicy, retries: Option<u32>) -> RetryPolicy {
    match retries {
        Some(retries) => base.clone().attempts(retries.saturating_add(1)),
        None => base.clone(),
    }
}

/// Dispatch a CLI command to its handler and return the exit code.
pub async fn dispatch_command(cli: Cli) -> Result<i32> {
    let ctx = CommandContext::new(cli.config, cli.json);
    spawn_interrupt_listener(ctx.cancel.clone());

    match cli.command {
        Commands::Run(cmd) => cmd.run(&ctx).await,
        Commands::Ssh(cmd) => cmd.run(&ctx).await,
        Commands::Scp(cmd) => cmd.run(&ctx).await,
        Commands::Backup(cmd) => cmd.run(&ctx).await,
        Commands::Hosts(cmd) => cmd.run(&ctx),
    }
}

/// Turn the first Ctrl+C into cancellation of whatever is running.
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}
