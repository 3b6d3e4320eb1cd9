//! Remote-operation invocations for Tether.
//!
//! Everything here is a caller of the bounded runner in `tether-exec`: it
//! knows which flags keep `ssh`, `scp` and `git` from ever prompting, and
//! turns configuration profiles into ready-to-run invocations.
//!
//! # Modules
//!
//! - [`config`] - TOML profiles for hosts, defaults and backups
//! - [`target`] - SSH destinations and shared non-interactive options
//! - [`ssh`] / [`scp`] - command and copy invocations
//! - [`backup`] - stage, commit and optionally push a Git work tree
//! - [`retry`] - re-run timed-out invocations with a longer deadline

pub mod backup;
pub mod config;
pub mod retry;
pub mod scp;
pub mod ssh;
pub mod target;

pub use backup::{BackupError, BackupPlan, BackupReport, BackupStatus, StepRecord, run_backup};
pub use config::{BackupSettings, ConfigError, Defaults, HostProfile, RemoteConfig, ResolvedHost};
pub use retry::{RetryOutcome, RetryPolicy, run_with_retry};
pub use scp::{ScpRequest, Transfer};
pub use ssh::SshRequest;
pub use target::SshTarget;

use tether_exec::InvocationError;
use thiserror::Error;

/// Errors while turning a request into an invocation.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// SSH without a command would open an interactive login.
    #[error("Remote command must not be empty")]
    EmptyRemoteCommand,

    /// A path argument was empty.
    #[error("Path must not be empty: {0}")]
    EmptyPath(&'static str),

    /// Host specification could not be parsed.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The assembled invocation broke a runner precondition.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

pub type Result<T> = std::result::Result<T, RemoteError>;
