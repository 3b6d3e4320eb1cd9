//! Bounded external-process execution.
//!
//! Runs one external program with its output captured and a hard deadline,
//! and reports exactly one [`Outcome`] per [`Invocation`]:
//!
//! - `Completed` - the process exited on its own (any exit code)
//! - `TimedOut` - the deadline fired first; the process group was killed
//! - `Cancelled` - an external cancellation token fired first
//! - `FailedToStart` - the executable could not be launched
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────────── run(invocation) ────────────────┐
//!              │                                                 │
//!   spawn ───► │  child.wait()  ─┐                               │
//!              │  sleep(timeout) ├─ select! (first wins) ─► Outcome
//!              │  cancelled()   ─┘                               │
//!              │  stdout/stderr readers ─► OutputCapture         │
//!              └─────────────────────────────────────────────────┘
//! ```
//!
//! The runner is program-agnostic: flags that keep a program from prompting
//! (`-o BatchMode=yes`, `--yes`, ...) are the caller's business.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tether_exec::{Invocation, Outcome};
//!
//! let invocation = Invocation::builder("ssh")
//!     .args(["-o", "BatchMode=yes", "build-host", "uptime"])
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! match tether_exec::run(&invocation).await {
//!     Outcome::Completed { exit_code, stdout, .. } => { /* ... */ }
//!     Outcome::TimedOut { partial_stdout, .. } => { /* ... */ }
//!     other => eprintln!("{other}"),
//! }
//! ```

pub mod invocation;
pub mod outcome;
pub mod output;
pub mod runner;
mod terminate;


pub use invocation::{Invocation, InvocationBuilder};
pub use outcome::{Outcome, OutcomeKind};
pub use output::{OutputCapture, OutputStream};
pub use runner::{BoundedRunner, RunnerConfig, run, run_blocking};
pub use tokio_util::sync::CancellationToken;

use std::time::Duration;
use thiserror::Error;

/// Timeout used when an invocation is built without an explicit one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum bytes kept per captured stream by default (1 MiB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How long pipe readers may keep draining once the process is gone.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Bound on waiting for a killed child to be reaped.
pub const DEFAULT_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Precondition violations detected while building an [`Invocation`].
///
/// These describe programmer mistakes. Runtime failures are never reported
/// through this type; they are variants of [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The executable path is empty.
    #[error("Executable path must not be empty")]
    EmptyProgram,

    /// The timeout is zero.
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,

    /// An environment override has an unusable name.
    #[error("Invalid environment variable name: {0:?}")]
    InvalidEnvName(String),
}

pub type Result<T> = std::result::Result<T, InvocationError>;
