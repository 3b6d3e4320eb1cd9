//! Relaying an [`Outcome`] to the terminal and mapping it to an exit code.

use anyhow::{Context, Result};
use serde::Serialize;
use tether_exec::{Invocation, Outcome, OutcomeKind};

use super::duration::format_timeout;
use super::terminal::{TermColor, safe_write_stderr, safe_write_stdout};

/// Completed with exit code 0.
pub const EXIT_OK: i32 = 0;
/// Completed with a non-zero exit code, failed to start, or a usage error.
pub const EXIT_FAILURE: i32 = 1;
/// Deadline passed; the process was killed.
pub const EXIT_TIMED_OUT: i32 = 2;
/// Interrupted with Ctrl+C.
pub const EXIT_CANCELLED: i32 = 130;

pub fn exit_code_for(outcome: &Outcome) -> i32 {
    match outcome {
        Outcome::Completed { exit_code: 0, .. } => EXIT_OK,
        Outcome::Completed { .. } | Outcome::FailedToStart { .. } => EXIT_FAILURE,
        Outcome::TimedOut { .. } => EXIT_TIMED_OUT,
        Outcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

/// Machine-readable summary printed with `--json`.
#[derive(Debug, Serialize)]
pub struct OutcomeReport {
    pub outcome: OutcomeKind,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timeout_ms: u64,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OutcomeReport {
    pub fn new(invocation: &Invocation, outcome: &Outcome, attempts: u32) -> Self {
        let reason = match outcome {
            Outcome::FailedToStart { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            outcome: outcome.kind(),
            command: invocation.command_line(),
            exit_code: outcome.exit_code(),
            timeout_ms: invocation.timeout().as_millis() as u64,
            elapsed_ms: outcome.elapsed().as_millis() as u64,
            attempts,
            stdout: outcome.stdout_lossy(),
            stderr: outcome.stderr_lossy(),
            reason,
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    text.push('\n');
    safe_write_stdout(text.as_bytes()).context("failed to write report")
}

/// Relay the captured output (or a JSON report) and return the exit code.
///
/// `invocation` is the one that produced `outcome`, so after retries its
/// timeout is the grown one.
///
/// Timeouts, interruptions and launch failures get a notice on stderr so a
/// slow command is never mistaken for a failing one.
pub fn emit(invocation: &Invocation, outcome: &Outcome, attempts: u32, json: bool) -> Result<i32> {
    if json {
        print_json(&OutcomeReport::new(invocation, outcome, attempts))?;
    } else {
        safe_write_stdout(outcome.stdout()).context("failed to relay stdout")?;
        safe_write_stderr(outcome.stderr()).context("failed to relay stderr")?;
    }

    if let Some(notice) = notice_for(invocation, outcome, attempts) {
        let color = match outcome {
            Outcome::FailedToStart { .. } => TermColor::Red,
            _ => TermColor::Yellow,
        };
        let line = format!("{}\n", color.format_stderr(&notice));
        safe_write_stderr(line.as_bytes()).context("failed to write notice")?;
    }

    Ok(exit_code_for(outcome))
}

fn notice_for(invocation: &Invocation, outcome: &Outcome, attempts: u32) -> Option<String> {
    let command = invocation.command_line();
    match outcome {
        Outcome::Completed { .. } => None,
        Outcome::TimedOut { .. } if attempts > 1 => Some(format!(
            "tether: timed out on all {attempts} attempts: {command}"
        )),
        Outcome::TimedOut { .. } => Some(format!(
            "tether: timed out after {}: {command}",
            format_timeout(invocation.timeout())
        )),
        Outcome::Cancelled { .. } => Some(format!("tether: interrupted: {command}")),
        Outcome::FailedToStart { reason } => Some(format!("tether: {reason}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn invocation() -> Invocation {
        Invocation::builder("sleep")
            .arg("10")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    fn timed_out() -> Outcome {
        Outcome::TimedOut {
            partial_stdout: b"part".to_vec(),
            partial_stderr: Vec::new(),
            elapsed: Duration::from_millis(2003),
        }
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let completed = |exit_code| Outcome::Completed {
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
            elapsed: Duration::ZERO,
        };

        assert_eq!(exit_code_for(&completed(0)), EXIT_OK);
        assert_eq!(exit_code_for(&completed(7)), EXIT_FAILURE);
        assert_eq!(
            exit_code_for(&Outcome::FailedToStart {
                reason: "executable not found: x".to_string()
            }),
            EXIT_FAILURE
        );
        assert_eq!(exit_code_for(&timed_out()), EXIT_TIMED_OUT);
        assert_eq!(
            exit_code_for(&Outcome::Cancelled {
                partial_stdout: Vec::new(),
                partial_stderr: Vec::new(),
                elapsed: Duration::ZERO,
            }),
            EXIT_CANCELLED
        );
    }

    #[test]
    fn test_timeout_notice() {
        assert_eq!(
            notice_for(&invocation(), &timed_out(), 1).as_deref(),
            Some("tether: timed out after 2s: sleep 10")
        );
        assert_eq!(
            notice_for(&invocation(), &timed_out(), 3).as_deref(),
            Some("tether: timed out on all 3 attempts: sleep 10")
        );
    }

    #[test]
    fn test_report_serializes_snake_case_kind() {
        let report = OutcomeReport::new(&invocation(), &timed_out(), 1);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["outcome"], "timed_out");
        assert_eq!(value["stdout"], "part");
        assert_eq!(value["timeout_ms"], 2000);
        assert!(value.get("exit_code").is_none());
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn test_report_uses_deadline_of_final_attempt() {
        let retimed = invocation().with_timeout(Duration::from_secs(8)).unwrap();
        let outcome = Outcome::TimedOut {
            partial_stdout: Vec::new(),
            partial_stderr: Vec::new(),
            elapsed: Duration::from_millis(8004),
        };
        let value = serde_json::to_value(OutcomeReport::new(&retimed, &outcome, 3)).unwrap();

        assert_eq!(value["timeout_ms"], 8000);
        assert_eq!(value["attempts"], 3);
        assert!(value["elapsed_ms"].as_u64().unwrap() >= value["timeout_ms"].as_u64().unwrap());
    }
}
