//! Outcome of one invocation.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of running one [`Invocation`](crate::Invocation).
///
/// `Completed` says nothing about success: a non-zero `exit_code` is the
/// wrapped program's own failure signal and is relayed untouched. Check
/// [`Outcome::is_success`] or `exit_code` explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited on its own before the deadline.
    Completed {
        exit_code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        elapsed: Duration,
    },
    /// The deadline fired first; the process was terminated.
    TimedOut {
        partial_stdout: Vec<u8>,
        partial_stderr: Vec<u8>,
        elapsed: Duration,
    },
    /// The caller's cancellation token fired first; the process was terminated.
    Cancelled {
        partial_stdout: Vec<u8>,
        partial_stderr: Vec<u8>,
        elapsed: Duration,
    },
    /// The process could not be launched.
    FailedToStart { reason: String },
}

/// Discriminant of an [`Outcome`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    TimedOut,
    Cancelled,
    FailedToStart,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Completed => "completed",
            OutcomeKind::TimedOut => "timed_out",
            OutcomeKind::Cancelled => "cancelled",
            OutcomeKind::FailedToStart => "failed_to_start",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Completed { .. } => OutcomeKind::Completed,
            Outcome::TimedOut { .. } => OutcomeKind::TimedOut,
            Outcome::Cancelled { .. } => OutcomeKind::Cancelled,
            Outcome::FailedToStart { .. } => OutcomeKind::FailedToStart,
        }
    }

    /// `Completed` with exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed { exit_code: 0, .. })
    }

    /// Exit code, only for `Completed`.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Outcome::Completed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Captured stdout (partial for `TimedOut` and `Cancelled`).
    pub fn stdout(&self) -> &[u8] {
        match self {
            Outcome::Completed { stdout, .. } => stdout,
            Outcome::TimedOut { partial_stdout, .. } | Outcome::Cancelled { partial_stdout, .. } => {
                partial_stdout
            }
            Outcome::FailedToStart { .. } => &[],
        }
    }

    /// Captured stderr (partial for `TimedOut` and `Cancelled`).
    pub fn stderr(&self) -> &[u8] {
        match self {
            Outcome::Completed { stderr, .. } => stderr,
            Outcome::TimedOut { partial_stderr, .. } | Outcome::Cancelled { partial_stderr, .. } => {
                partial_stderr
            }
            Outcome::FailedToStart { .. } => &[],
        }
    }

    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(self.stdout()).into_owned()
    }

    /// Stderr decoded lossily as UTF-8.
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(self.stderr()).into_owned()
    }

    /// Time from spawn until the outcome was decided.
    ///
    /// For `Completed` that is the exit. For `TimedOut` and `Cancelled` it
    /// stops when the deadline fired or the token was cancelled, before
    /// termination and draining, so the `run` call itself can take longer.
    /// Zero when the process never started.
    pub fn elapsed(&self) -> Duration {
        match self {
            Outcome::Completed { elapsed, .. }
            | Outcome::TimedOut { elapsed, .. }
            | Outcome::Cancelled { elapsed, .. } => *elapsed,
            Outcome::FailedToStart { .. } => Duration::ZERO,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed {
                exit_code, elapsed, ..
            } => write!(f, "completed with exit code {exit_code} in {elapsed:.2?}"),
            Outcome::TimedOut { elapsed, .. } => write!(f, "timed out after {elapsed:.2?}"),
            Outcome::Cancelled { elapsed, .. } => write!(f, "cancelled after {elapsed:.2?}"),
            Outcome::FailedToStart { reason } => write!(f, "failed to start: {reason}"),
        }
    }
}
