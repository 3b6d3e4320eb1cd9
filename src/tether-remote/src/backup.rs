//! Git auto-backup: stage everything, commit with a timestamp, optionally push.
//!
//! Each git step is its own bounded invocation, so a hung credential helper
//! or a stalled push can never wedge a cron job.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tether_exec::{BoundedRunner, CancellationToken, Invocation, InvocationError, Outcome, OutcomeKind};
use thiserror::Error;
use tracing::{debug, info};

use super::config::{BackupSettings, Defaults};

/// Environment that keeps git and its ssh transport from prompting.
const NON_INTERACTIVE_ENV: &[(&str, &str)] = &[
    ("GIT_TERMINAL_PROMPT", "0"),
    ("GIT_SSH_COMMAND", "ssh -o BatchMode=yes"),
    ("GCM_INTERACTIVE", "never"),
];

/// Errors for a backup run.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A git step exited non-zero.
    #[error("git {step} failed with exit code {exit_code}: {stderr}")]
    StepFailed {
        step: &'static str,
        exit_code: i32,
        stderr: String,
    },

    /// A git step hit its deadline.
    #[error("git {step} timed out after {timeout:?}")]
    StepTimedOut {
        step: &'static str,
        timeout: Duration,
    },

    /// A git step was cancelled.
    #[error("git {step} was cancelled")]
    StepCancelled { step: &'static str },

    /// git could not be launched.
    #[error("git {step} could not start: {reason}")]
    StepNotStarted { step: &'static str, reason: String },

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

/// What the backup ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    NothingToCommit,
    Committed,
    Pushed,
}

/// One executed git step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: &'static str,
    pub command: String,
    pub outcome: OutcomeKind,
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
}

/// Steps run and the final status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub status: BackupStatus,
    pub steps: Vec<StepRecord>,
}

/// Everything needed to back up one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub repo: PathBuf,
    pub git_program: String,
    pub message: String,
    pub push: bool,
    pub remote: Option<String>,
    pub branch: Option<String>,
    pub step_timeout: Duration,
    pub kill_grace: Option<Duration>,
}

impl BackupPlan {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            git_program: "git".to_string(),
            message: timestamped_message("Auto backup"),
            push: false,
            remote: None,
            branch: None,
            step_timeout: Duration::from_secs(super::config::DEFAULT_BACKUP_TIMEOUT_SECS),
            kill_grace: None,
        }
    }

    /// Plan from the `[backup]` table and `[defaults]`.
    pub fn from_settings(repo: impl Into<PathBuf>, settings: &BackupSettings, defaults: &Defaults) -> Self {
        Self {
            repo: repo.into(),
            git_program: defaults.git_program.clone(),
            message: timestamped_message(&settings.message_prefix),
            push: settings.push,
            remote: settings.remote.clone(),
            branch: settings.branch.clone(),
            step_timeout: settings.timeout(),
            kill_grace: defaults.kill_grace(),
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    pub fn remote(mut self, remote: Option<String>) -> Self {
        self.remote = remote;
        self
    }

    pub fn branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn git_program(mut self, program: impl Into<String>) -> Self {
        self.git_program = program.into();
        self
    }

    /// Invocation of `git <args>` inside the repository.
    fn git<I, S>(&self, args: I) -> Result<Invocation, InvocationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut builder = Invocation::builder(&self.git_program)
            .args(args)
            .current_dir(&self.repo)
            .envs(NON_INTERACTIVE_ENV.iter().copied())
            .timeout(self.step_timeout);
        if let Some(grace) = self.kill_grace {
            builder = builder.kill_grace(grace);
        }
        builder.build()
    }

    fn push_args(&self) -> Vec<String> {
        let mut args = vec!["push".to_string()];
        if let Some(remote) = &self.remote {
            args.push(remote.clone());
            if let Some(branch) = &self.branch {
                args.push(branch.clone());
            }
        }
        args
    }
}

/// `"<prefix> YYYY-MM-DD HH:MM:SS"` in local time.
pub fn timestamped_message(prefix: &str) -> String {
    format!("{prefix} {}", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

struct StepRunner<'a> {
    runner: &'a BoundedRunner,
    cancel: Option<CancellationToken>,
    steps: Vec<StepRecord>,
}

impl StepRunner<'_> {
    /// Run one step; anything but `Completed` ends the backup.
    async fn run(&mut self, step: &'static str, invocation: Invocation) -> Result<Outcome, BackupError> {
        debug!(step, command = %invocation.command_line(), "Running backup step");
        let outcome = match &self.cancel {
            Some(token) => {
                self.runner
                    .run_with_cancellation(&invocation, token.clone())
                    .await
            }
            None => self.runner.run(&invocation).await,
        };

        self.steps.push(StepRecord {
            step,
            command: invocation.command_line(),
            outcome: outcome.kind(),
            exit_code: outcome.exit_code(),
            elapsed_ms: outcome.elapsed().as_millis() as u64,
        });

        match outcome {
            Outcome::Completed { .. } => Ok(outcome),
            Outcome::TimedOut { .. } => Err(BackupError::StepTimedOut {
                step,
                timeout: invocation.timeout(),
            }),
            Outcome::Cancelled { .. } => Err(BackupError::StepCancelled { step }),
            Outcome::FailedToStart { reason } => Err(BackupError::StepNotStarted { step, reason }),
        }
    }

    async fn run_ok(&mut self, step: &'static str, invocation: Invocation) -> Result<Outcome, BackupError> {
        let outcome = self.run(step, invocation).await?;
        require_success(step, &outcome)?;
        Ok(outcome)
    }
}

fn require_success(step: &'static str, outcome: &Outcome) -> Result<(), BackupError> {
    match outcome.exit_code() {
        Some(0) | None => Ok(()),
        Some(exit_code) => Err(BackupError::StepFailed {
            step,
            exit_code,
            stderr: outcome.stderr_lossy().trim().to_string(),
        }),
    }
}

/// Back up `plan.repo`.
///
/// `cancel`, if given, stops whichever step is running.
pub async fn run_backup(
    runner: &BoundedRunner,
    plan: &BackupPlan,
    cancel: Option<CancellationToken>,
) -> Result<BackupReport, BackupError> {
    let mut steps = StepRunner {
        runner,
        cancel,
        steps: Vec::new(),
    };

    steps
        .run_ok("verify", plan.git(["rev-parse", "--is-inside-work-tree"])?)
        .await?;
    steps.run_ok("stage", plan.git(["add", "-A"])?).await?;

    // Exit 0: index matches HEAD. Exit 1: staged changes.
    let diff = steps
        .run("detect", plan.git(["diff", "--cached", "--quiet"])?)
        .await?;
    match diff.exit_code() {
        Some(0) => {
            info!(repo = %plan.repo.display(), "Nothing to back up");
            return Ok(BackupReport {
                status: BackupStatus::NothingToCommit,
                steps: steps.steps,
            });
        }
        Some(1) => {}
        _ => require_success("detect", &diff)?,
    }

    steps
        .run_ok("commit", plan.git(["commit", "-m", plan.message.as_str()])?)
        .await?;

    let status = if plan.push {
        steps.run_ok("push", plan.git(plan.push_args())?).await?;
        BackupStatus::Pushed
    } else {
        BackupStatus::Committed
    };

    info!(repo = %plan.repo.display(), ?status, "Backup finished");
    Ok(BackupReport {
        status,
        steps: steps.steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_has_prefix_and_timestamp() {
        let message = timestamped_message("Auto backup");
        assert!(message.starts_with("Auto backup 20"));
        assert_eq!(message.len(), "Auto backup ".len() + "YYYY-MM-DD HH:MM:SS".len());
    }

    #[test]
    fn test_push_args() {
        let plan = BackupPlan::new("/repo");
        assert_eq!(plan.push_args(), vec!["push".to_string()]);

        let plan = plan
            .remote(Some("origin".to_string()))
            .branch(Some("main".to_string()));
        assert_eq!(plan.push_args(), vec!["push", "origin", "main"]);

        // A branch without a remote cannot be expressed to git push.
        let plan = BackupPlan::new("/repo").branch(Some("main".to_string()));
        assert_eq!(plan.push_args(), vec!["push".to_string()]);
    }

    #[test]
    fn test_git_invocation_is_non_interactive() {
        let plan = BackupPlan::new("/repo").step_timeout(Duration::from_secs(9));
        let invocation = plan.git(["status"]).unwrap();

        assert_eq!(invocation.program(), "git");
        assert_eq!(invocation.cwd(), Some(std::path::Path::new("/repo")));
        assert_eq!(invocation.timeout(), Duration::from_secs(9));
        assert_eq!(
            invocation.env().get("GIT_TERMINAL_PROMPT").map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = BackupSettings {
            remote: Some("backup".to_string()),
            push: true,
            message_prefix: "Nightly".to_string(),
            timeout_secs: 15,
            ..Default::default()
        };
        let defaults = Defaults {
            git_program: "/usr/local/bin/git".to_string(),
            ..Default::default()
        };

        let plan = BackupPlan::from_settings("/notes", &settings, &defaults);
        assert!(plan.push);
        assert_eq!(plan.git_program, "/usr/local/bin/git");
        assert_eq!(plan.step_timeout, Duration::from_secs(15));
        assert!(plan.message.starts_with("Nightly "));
    }

    #[test]
    fn test_require_success() {
        let failed = Outcome::Completed {
            exit_code: 128,
            stdout: Vec::new(),
            stderr: b"fatal: not a git repository\n".to_vec(),
            elapsed: Duration::ZERO,
        };
        match require_success("verify", &failed) {
            Err(BackupError::StepFailed {
                step,
                exit_code,
                stderr,
            }) => {
                assert_eq!(step, "verify");
                assert_eq!(exit_code, 128);
                assert_eq!(stderr, "fatal: not a git repository");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    mod fake_git_tests {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::os::unix::fs::PermissionsExt;

        /// Write a stand-in `git` that logs its arguments and answers `diff`
        /// with `diff_exit`. `push_body` runs for `git push`.
        fn fake_git(dir: &std::path::Path, diff_exit: i32, push_body: &str) -> (PathBuf, PathBuf) {
            let log = dir.join("git.log");
            let script = dir.join("fake-git");
            let body = format!(
                "#!/bin/sh\necho \"$@\" >> '{log}'\ncase \"$1\" in\n  diff) exit {diff_exit} ;;\n  push) {push_body} ;;\nesac\nexit 0\n",
                log = log.display(),
            );
            std::fs::write(&script, body).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            (script, log)
        }

        fn logged(log: &std::path::Path) -> Vec<String> {
            std::fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }

        #[tokio::test]
        async fn test_clean_tree_commits_nothing() {
            let dir = tempfile::tempdir().unwrap();
            let (git, log) = fake_git(dir.path(), 0, "true");
            let plan = BackupPlan::new(dir.path()).git_program(git.to_string_lossy());

            let report = run_backup(&BoundedRunner::default(), &plan, None)
                .await
                .unwrap();

            assert_eq!(report.status, BackupStatus::NothingToCommit);
            assert_eq!(report.steps.len(), 3);
            assert_eq!(
                logged(&log),
                vec![
                    "rev-parse --is-inside-work-tree",
                    "add -A",
                    "diff --cached --quiet"
                ]
            );
        }

        #[tokio::test]
        async fn test_changes_are_committed_and_pushed() {
            let dir = tempfile::tempdir().unwrap();
            let (git, log) = fake_git(dir.path(), 1, "true");
            let plan = BackupPlan::new(dir.path())
                .git_program(git.to_string_lossy())
                .message("snapshot")
                .push(true)
                .remote(Some("origin".to_string()))
                .branch(Some("main".to_string()));

            let report = run_backup(&BoundedRunner::default(), &plan, None)
                .await
                .unwrap();

            assert_eq!(report.status, BackupStatus::Pushed);
            let steps: Vec<&str> = report.steps.iter().map(|s| s.step).collect();
            assert_eq!(steps, vec!["verify", "stage", "detect", "commit", "push"]);

            let log = logged(&log);
            assert!(log.contains(&"commit -m snapshot".to_string()));
            assert!(log.contains(&"push origin main".to_string()));
        }

        #[tokio::test]
        async fn test_hung_push_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let (git, _log) = fake_git(dir.path(), 1, "sleep 30");
            let plan = BackupPlan::new(dir.path())
                .git_program(git.to_string_lossy())
                .push(true)
                .step_timeout(Duration::from_millis(500));

            let err = run_backup(&BoundedRunner::default(), &plan, None)
                .await
                .unwrap_err();

            assert!(matches!(err, BackupError::StepTimedOut { step: "push", .. }));
        }

        #[tokio::test]
        async fn test_failing_diff_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let (git, _log) = fake_git(dir.path(), 128, "true");
            let plan = BackupPlan::new(dir.path()).git_program(git.to_string_lossy());

            let err = run_backup(&BoundedRunner::default(), &plan, None)
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                BackupError::StepFailed {
                    step: "detect",
                    exit_code: 128,
                    ..
                }
            ));
        }

        #[tokio::test]
        async fn test_missing_git_does_not_start() {
            let dir = tempfile::tempdir().unwrap();
            let plan = BackupPlan::new(dir.path()).git_program("/nonexistent/git");

            let err = run_backup(&BoundedRunner::default(), &plan, None)
                .await
                .unwrap_err();

            assert!(matches!(err, BackupError::StepNotStarted { step: "verify", .. }));
        }

        #[tokio::test]
        async fn test_cancelled_before_start() {
            let dir = tempfile::tempdir().unwrap();
            let (git, _log) = fake_git(dir.path(), 1, "true");
            let plan = BackupPlan::new(dir.path()).git_program(git.to_string_lossy());
            let token = CancellationToken::new();
            token.cancel();

            let result = run_backup(&BoundedRunner::default(), &plan, Some(token)).await;

            // The first step may finish before the runner sees the token.
            match result {
                Err(BackupError::StepCancelled { .. }) => {}
                Ok(report) => assert!(!report.steps.is_empty()),
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
    }
}
