//! Bounded process runner.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::terminate::{self, Signal};
use super::{
    DEFAULT_DRAIN_TIMEOUT, DEFAULT_REAP_TIMEOUT, Invocation, MAX_OUTPUT_SIZE, Outcome,
    OutputCapture, OutputStream,
};

const READ_CHUNK: usize = 8192;

/// Tuning knobs shared by every run of a [`BoundedRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long pipe readers may keep draining after the process ended.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Bound on reaping a killed child.
    #[serde(default = "default_reap_timeout_ms")]
    pub reap_timeout_ms: u64,

    /// Bytes kept per stream; `None` keeps everything.
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: Option<usize>,
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT.as_millis() as u64
}

fn default_reap_timeout_ms() -> u64 {
    DEFAULT_REAP_TIMEOUT.as_millis() as u64
}

fn default_max_capture_bytes() -> Option<usize> {
    Some(MAX_OUTPUT_SIZE)
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
            reap_timeout_ms: default_reap_timeout_ms(),
            max_capture_bytes: default_max_capture_bytes(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    /// Builder: set drain timeout.
    pub fn drain_timeout_duration(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set reap timeout.
    pub fn reap_timeout_duration(mut self, timeout: Duration) -> Self {
        self.reap_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set per-stream capture limit.
    pub fn max_capture_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_capture_bytes = limit;
        self
    }
}

/// How the race between process, deadline and cancellation ended.
#[derive(Debug)]
enum Ending {
    Exited(io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

/// Runs external processes under a hard deadline.
///
/// Holds no per-run state, so one runner can serve any number of concurrent
/// invocations.
#[derive(Debug, Clone, Default)]
pub struct BoundedRunner {
    config: RunnerConfig,
}

impl BoundedRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `invocation` to completion or to its deadline.
    ///
    /// Returns within `timeout + kill grace + reap timeout + drain timeout`
    /// no matter what the program does.
    pub async fn run(&self, invocation: &Invocation) -> Outcome {
        self.execute(invocation, None).await
    }

    /// Like [`run`](Self::run), but `cancel` can stop the process early.
    ///
    /// A fired token yields [`Outcome::Cancelled`].
    pub async fn run_with_cancellation(
        &self,
        invocation: &Invocation,
        cancel: CancellationToken,
    ) -> Outcome {
        self.execute(invocation, Some(cancel)).await
    }

    /// Run on a private current-thread runtime, blocking the calling thread.
    ///
    /// Inside a tokio runtime this returns [`Outcome::FailedToStart`]; use
    /// [`run`](Self::run) there instead.
    pub fn run_blocking(&self, invocation: &Invocation) -> Outcome {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Outcome::FailedToStart {
                reason: "run_blocking called from inside an async runtime; use run instead"
                    .to_string(),
            };
        }
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.run(invocation)),
            Err(err) => Outcome::FailedToStart {
                reason: format!("failed to start async runtime: {err}"),
            },
        }
    }

    async fn execute(&self, invocation: &Invocation, cancel: Option<CancellationToken>) -> Outcome {
        if let Some(cwd) = invocation.cwd()
            && let Err(reason) = validate_cwd(cwd)
        {
            return Outcome::FailedToStart { reason };
        }

        let mut cmd = build_command(invocation);
        let start = Instant::now();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = spawn_failure_reason(invocation.program(), &err);
                debug!(program = invocation.program(), %reason, "Process failed to start");
                return Outcome::FailedToStart { reason };
            }
        };
        let pid = child.id();
        debug!(
            ?pid,
            command = %invocation.command_line(),
            timeout = ?invocation.timeout(),
            "Spawned process"
        );

        let capture = OutputCapture::with_limit(self.config.max_capture_bytes);
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(pump(pipe, capture.clone(), OutputStream::Stdout)));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(pump(pipe, capture.clone(), OutputStream::Stderr)));
        }

        let ending = race(&mut child, invocation.timeout(), cancel.as_ref()).await;
        let elapsed = start.elapsed();

        let ending = match ending {
            Ending::Exited(Ok(status)) => Ending::Exited(Ok(status)),
            Ending::Exited(Err(err)) => {
                warn!(?pid, error = %err, "Lost track of child process");
                if let Err(err) = child.start_kill() {
                    debug!(?pid, error = %err, "Kill after lost wait failed");
                }
                Ending::Exited(Err(err))
            }
            interrupted => match child.try_wait() {
                // Exited between the deadline firing and now.
                Ok(Some(status)) => Ending::Exited(Ok(status)),
                _ => {
                    let trigger = match interrupted {
                        Ending::Cancelled => "cancelled",
                        _ => "deadline",
                    };
                    warn!(
                        ?pid,
                        command = %invocation.command_line(),
                        trigger,
                        "Terminating process"
                    );
                    terminate::terminate(
                        &mut child,
                        pid,
                        invocation.kill_grace(),
                        self.config.reap_timeout(),
                    )
                    .await;
                    interrupted
                }
            },
        };

        if !drain(readers, self.config.drain_timeout()).await {
            // Something left in the group still holds our pipes open.
            debug!(?pid, "Output pipes still open after exit, sweeping process group");
            if let Some(pid) = pid {
                terminate::signal_group(pid, Signal::Kill);
            }
        }

        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            if capture.was_truncated(stream) {
                debug!(
                    ?stream,
                    total = capture.total_bytes(stream),
                    "Captured output truncated"
                );
            }
        }

        let stdout = capture.stdout();
        let stderr = capture.stderr();
        match ending {
            Ending::Exited(status) => {
                let exit_code = exit_code_of(status);
                debug!(?pid, exit_code, ?elapsed, "Process exited");
                Outcome::Completed {
                    exit_code,
                    stdout,
                    stderr,
                    elapsed,
                }
            }
            Ending::Deadline => Outcome::TimedOut {
                partial_stdout: stdout,
                partial_stderr: stderr,
                elapsed,
            },
            Ending::Cancelled => Outcome::Cancelled {
                partial_stdout: stdout,
                partial_stderr: stderr,
                elapsed,
            },
        }
    }
}

/// Run with the default [`RunnerConfig`].
pub async fn run(invocation: &Invocation) -> Outcome {
    BoundedRunner::default().run(invocation).await
}

/// Blocking variant of [`run`] for synchronous callers.
pub fn run_blocking(invocation: &Invocation) -> Outcome {
    BoundedRunner::default().run_blocking(invocation)
}

/// Wait for whichever happens first: exit, cancellation, or the deadline.
async fn race(
    child: &mut Child,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Ending {
    let cancelled = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;

        status = child.wait() => Ending::Exited(status),
        () = cancelled => Ending::Cancelled,
        () = tokio::time::sleep(timeout) => Ending::Deadline,
    }
}

fn build_command(invocation: &Invocation) -> Command {
    let mut cmd = Command::new(invocation.program());
    cmd.args(invocation.args())
        .envs(invocation.env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = invocation.cwd() {
        cmd.current_dir(cwd);
    }

    // Own process group, so a timeout can kill the whole tree.
    #[cfg(unix)]
    {
        // SAFETY: setpgid is async-signal-safe and touches no parent memory.
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    cmd
}

fn validate_cwd(cwd: &Path) -> std::result::Result<(), String> {
    if !cwd.exists() {
        return Err(format!(
            "working directory does not exist: {}",
            cwd.display()
        ));
    }
    if !cwd.is_dir() {
        return Err(format!(
            "working directory is not a directory: {}",
            cwd.display()
        ));
    }
    Ok(())
}

fn spawn_failure_reason(program: &str, err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => format!("executable not found: {program}"),
        io::ErrorKind::PermissionDenied => format!("permission denied: {program}"),
        _ => format!("failed to start {program}: {err}"),
    }
}

fn exit_code_of(status: io::Result<ExitStatus>) -> i32 {
    match status {
        Ok(status) => status_code(status),
        Err(_) => -1,
    }
}

/// Exit code, or `128 + signal` for a process killed by a signal.
fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Copy one pipe into the capture until EOF.
async fn pump<R>(mut pipe: R, capture: OutputCapture, stream: OutputStream)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => capture.append(stream, &buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                debug!(?stream, error = %err, "Stopped reading child output");
                break;
            }
        }
    }
}

/// Give readers until `within` to hit EOF; abort the rest.
///
/// Returns `false` if any reader had to be aborted.
async fn drain(readers: Vec<JoinHandle<()>>, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    let mut complete = true;
    for mut reader in readers {
        if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
            reader.abort();
            complete = false;
        }
    }
    complete
}
