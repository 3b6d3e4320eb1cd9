//! Retrying timed-out commands with a longer deadline.
//!
//! A slow network hop often succeeds on a second try if it is given more
//! time. Only `TimedOut` outcomes are retried: a non-zero exit is an answer,
//! and a launch failure will fail the same way again.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_exec::{BoundedRunner, CancellationToken, Invocation, Outcome};
use tracing::{debug, info};

fn default_max_attempts() -> u32 {
    1
}

fn default_timeout_factor() -> f64 {
    2.0
}

fn default_max_timeout_secs() -> u64 {
    600
}

fn default_backoff_ms() -> u64 {
    1000
}

/// How many times to try and how the deadline grows between tries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Multiplier applied to the timeout after each timed-out attempt.
    #[serde(default = "default_timeout_factor")]
    pub timeout_factor: f64,

    /// Ceiling for the grown timeout.
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Pause between attempts.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_factor: default_timeout_factor(),
            max_timeout_secs: default_max_timeout_secs(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn once() -> Self {
        Self::default()
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn timeout_factor(mut self, factor: f64) -> Self {
        self.timeout_factor = factor;
        self
    }

    pub fn max_timeout(mut self, max: Duration) -> Self {
        self.max_timeout_secs = max.as_secs();
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn backoff_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Timeout for the attempt after one that ran with `current`.
    ///
    /// Never shorter than `current`, never longer than the ceiling unless
    /// `current` already exceeds it.
    pub fn next_timeout(&self, current: Duration) -> Duration {
        let factor = if self.timeout_factor.is_finite() {
            self.timeout_factor.max(1.0)
        } else {
            1.0
        };
        let ceiling = Duration::from_secs(self.max_timeout_secs).max(current);
        let grown = current.as_secs_f64() * factor;
        if grown >= ceiling.as_secs_f64() {
            ceiling
        } else {
            Duration::from_secs_f64(grown)
        }
    }
}

/// Final outcome and how many attempts it took.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub outcome: Outcome,
    pub attempts: u32,
    /// The invocation of the last attempt, carrying its grown deadline.
    pub last: Invocation,
}

/// Run `invocation`, retrying timeouts per `policy`.
///
/// Each retry gets a longer deadline. Cancellation ends the loop with the
/// `Cancelled` outcome of the attempt it interrupted, or with the last
/// timeout if it arrives during the backoff pause.
pub async fn run_with_retry(
    runner: &BoundedRunner,
    invocation: &Invocation,
    policy: &RetryPolicy,
    cancel: Option<CancellationToken>,
) -> RetryOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut current = invocation.clone();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let outcome = match &cancel {
            Some(token) => runner.run_with_cancellation(&current, token.clone()).await,
            None => runner.run(&current).await,
        };

        if !matches!(outcome, Outcome::TimedOut { .. }) || attempts >= max_attempts {
            debug!(attempts, kind = %outcome.kind(), "Retry loop finished");
            return RetryOutcome {
                outcome,
                attempts,
                last: current,
            };
        }

        let next = policy.next_timeout(current.timeout());
        info!(
            command = %current.command_line(),
            attempt = attempts,
            max_attempts,
            timed_out_after_ms = current.timeout().as_millis() as u64,
            next_timeout_ms = next.as_millis() as u64,
            "Command timed out, retrying with a longer deadline"
        );

        if let Some(token) = &cancel {
            tokio::select! {
                _ = token.cancelled() => {
                    return RetryOutcome {
                        outcome,
                        attempts,
                        last: current,
                    };
                }
                _ = tokio::time::sleep(policy.backoff_duration()) => {}
            }
        } else {
            tokio::time::sleep(policy.backoff_duration()).await;
        }

        // `next` is never zero because it is at least the current timeout.
        current = match current.with_timeout(next) {
            Ok(retimed) => retimed,
            Err(_) => {
                return RetryOutcome {
                    outcome,
                    attempts,
                    last: current,
                };
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_next_timeout_grows_and_caps() {
        let policy = RetryPolicy::default().max_timeout(Duration::from_secs(10));
        assert_eq!(policy.next_timeout(Duration::from_secs(3)), Duration::from_secs(6));
        assert_eq!(policy.next_timeout(Duration::from_secs(6)), Duration::from_secs(10));
        // Already above the ceiling: keep it, never shrink.
        assert_eq!(policy.next_timeout(Duration::from_secs(20)), Duration::from_secs(20));
    }

    #[test]
    fn test_next_timeout_ignores_shrinking_factors() {
        let policy = RetryPolicy::default().timeout_factor(0.5);
        assert_eq!(policy.next_timeout(Duration::from_secs(4)), Duration::from_secs(4));

        let policy = RetryPolicy::default().timeout_factor(f64::NAN);
        assert_eq!(policy.next_timeout(Duration::from_secs(4)), Duration::from_secs(4));
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 3").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.timeout_factor, 2.0);
        assert_eq!(policy.backoff_duration(), Duration::from_secs(1));
    }

    #[cfg(unix)]
    mod run_tests {
        use super::*;
        use pretty_assertions::assert_eq;

        fn sh(script: &str, timeout: Duration) -> Invocation {
            Invocation::builder("sh")
                .args(["-c", script])
                .timeout(timeout)
                .build()
                .unwrap()
        }

        fn quick(attempts: u32) -> RetryPolicy {
            RetryPolicy::default()
                .attempts(attempts)
                .backoff(Duration::from_millis(10))
        }

        #[tokio::test]
        async fn test_gives_up_after_max_attempts() {
            let invocation = sh("sleep 5", Duration::from_millis(100));
            let policy = quick(3).timeout_factor(1.0);

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &policy, None).await;

            assert_eq!(result.attempts, 3);
            assert!(matches!(result.outcome, Outcome::TimedOut { .. }));
            assert_eq!(result.last.timeout(), Duration::from_millis(100));
        }

        #[tokio::test]
        async fn test_last_attempt_reports_grown_deadline() {
            let invocation = sh("sleep 5", Duration::from_millis(100));
            let policy = quick(3);

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &policy, None).await;

            assert_eq!(result.attempts, 3);
            assert_eq!(result.last.timeout(), Duration::from_millis(400));
            assert!(result.outcome.elapsed() >= Duration::from_millis(400));
            assert_eq!(invocation.timeout(), Duration::from_millis(100));
        }

        #[tokio::test]
        async fn test_longer_deadline_lets_slow_command_finish() {
            let invocation = sh("sleep 0.3; echo done", Duration::from_millis(100));
            let policy = quick(2).timeout_factor(20.0);

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &policy, None).await;

            assert_eq!(result.attempts, 2);
            assert_eq!(result.last.timeout(), Duration::from_secs(2));
            assert!(result.outcome.is_success());
            assert_eq!(result.outcome.stdout(), b"done\n");
        }

        #[tokio::test]
        async fn test_non_zero_exit_is_not_retried() {
            let invocation = sh("exit 3", Duration::from_secs(5));

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &quick(5), None).await;

            assert_eq!(result.attempts, 1);
            assert_eq!(result.outcome.exit_code(), Some(3));
        }

        #[tokio::test]
        async fn test_launch_failure_is_not_retried() {
            let invocation = Invocation::builder("/nonexistent/tether-retry")
                .build()
                .unwrap();

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &quick(5), None).await;

            assert_eq!(result.attempts, 1);
            assert!(matches!(result.outcome, Outcome::FailedToStart { .. }));
        }

        #[tokio::test]
        async fn test_cancel_during_backoff_stops_retrying() {
            let invocation = sh("sleep 5", Duration::from_millis(100));
            let policy = RetryPolicy::default()
                .attempts(10)
                .backoff(Duration::from_secs(30));
            let token = CancellationToken::new();

            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                canceller.cancel();
            });

            let result = run_with_retry(&BoundedRunner::default(), &invocation, &policy, Some(token)).await;

            assert_eq!(result.attempts, 1);
            assert!(matches!(result.outcome, Outcome::TimedOut { .. }));
        }
    }
}
