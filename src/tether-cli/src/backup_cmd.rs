//! `tether backup` - commit everything in a repository and optionally push it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_remote::{BackupError, BackupPlan, BackupReport, BackupStatus, RemoteConfig, run_backup};

use crate::cli::CommandContext;
use crate::utils::{
    EXIT_CANCELLED, EXIT_FAILURE, EXIT_OK, EXIT_TIMED_OUT, TermColor, parse_timeout, print_json,
    safe_write_stderr, safe_write_stdout,
};

/// Commit and optionally push everything in a git repository.
#[derive(Debug, Parser)]
pub struct BackupCommand {
    /// Repository to back up (default: [backup].repo, then the current directory)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Push after committing
    #[arg(long)]
    pub push: bool,

    /// Remote to push to
    #[arg(long)]
    pub remote: Option<String>,

    /// Branch to push (requires --remote or [backup].remote)
    #[arg(long)]
    pub branch: Option<String>,

    /// Commit message (default: "<prefix> <timestamp>")
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Deadline for each git step
    #[arg(long, short = 't', value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
}

impl BackupCommand {
    /// Merge flags over the `[backup]` table.
    pub fn plan(&self, config: &RemoteConfig) -> Result<BackupPlan> {
        let repo = match (&self.repo, config.backup.repo_path()) {
            (Some(repo), _) => repo.clone(),
            (None, Some(repo)) => repo,
            (None, None) => std::env::current_dir().context("Failed to read current directory")?,
        };

        let mut plan = BackupPlan::from_settings(repo, &config.backup, &config.defaults);
        if self.push {
            plan = plan.push(true);
        }
        if self.remote.is_some() {
            plan = plan.remote(self.remote.clone());
        }
        if self.branch.is_some() {
            plan = plan.branch(self.branch.clone());
        }
        if let Some(message) = &self.message {
            plan = plan.message(message.clone());
        }
        if let Some(timeout) = self.timeout {
            plan = plan.step_timeout(timeout);
        }
        Ok(plan)
    }

    pub async fn run(self, ctx: &CommandContext) -> Result<i32> {
        let config = ctx.load_config()?;
        let plan = self.plan(&config)?;

        match run_backup(&ctx.runner, &plan, Some(ctx.cancel.clone())).await {
            Ok(report) => {
                if ctx.json {
                    print_json(&report)?;
                } else {
                    let line = format!("{}\n", summary(&plan, &report));
                    safe_write_stdout(line.as_bytes()).context("failed to write summary")?;
                }
                Ok(EXIT_OK)
            }
            Err(BackupError::Invocation(err)) => Err(err).context("Invalid backup settings"),
            Err(err) => {
                let (code, color) = exit_code_for_error(&err);
                let line = format!("{}\n", color.format_stderr(&format!("tether: backup failed: {err}")));
                safe_write_stderr(line.as_bytes()).context("failed to write notice")?;
                Ok(code)
            }
        }
    }
}

fn summary(plan: &BackupPlan, report: &BackupReport) -> String {
    let repo = plan.repo.display();
    match report.status {
        BackupStatus::NothingToCommit => format!("Nothing to commit in {repo}"),
        BackupStatus::Committed => format!("Committed in {repo}: {}", plan.message),
        BackupStatus::Pushed => format!("Committed and pushed from {repo}: {}", plan.message),
    }
}

fn exit_code_for_error(err: &BackupError) -> (i32, TermColor) {
    match err {
        BackupError::StepTimedOut { .. } => (EXIT_TIMED_OUT, TermColor::Yellow),
        BackupError::StepCancelled { .. } => (EXIT_CANCELLED, TermColor::Yellow),
        _ => (EXIT_FAILURE, TermColor::Red),
    }
}
