//! Process-group termination.
//!
//! On Unix every child is spawned as the leader of its own process group, so
//! signalling `-pid` reaches the child and anything it forked that did not
//! leave the group. Elsewhere only the direct child is killed.

use std::time::Duration;

use tokio::process::Child;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Polite request (SIGTERM).
    Terminate,
    /// Forced kill (SIGKILL).
    Kill,
}

/// Terminate the child's process group and reap the child.
///
/// With a grace period, the group gets SIGTERM first and SIGKILL only if the
/// leader is still alive when the grace period ends. Never fails: a process
/// that already exited is not an error here.
pub(crate) async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    grace: Option<Duration>,
    reap_timeout: Duration,
) {
    if let Some(grace) = grace {
        if let Some(pid) = pid {
            signal_group(pid, Signal::Terminate);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            // Leader is gone; stragglers in the group still get killed.
            if let Some(pid) = pid {
                signal_group(pid, Signal::Kill);
            }
            return;
        }
        debug!(?pid, ?grace, "Process ignored SIGTERM, escalating to SIGKILL");
    }

    if let Some(pid) = pid {
        signal_group(pid, Signal::Kill);
    }
    // Covers platforms without process groups and a pid we never learned.
    if let Err(err) = child.start_kill() {
        debug!(?pid, error = %err, "Direct kill failed");
    }

    if tokio::time::timeout(reap_timeout, child.wait())
        .await
        .is_err()
    {
        warn!(?pid, ?reap_timeout, "Killed process was not reaped in time");
    }
}

/// Send `signal` to the process group led by `pid`.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: Signal) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    let signo = match signal {
        Signal::Terminate => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };

    // SAFETY: killpg has no memory-safety preconditions.
    let rc = unsafe { libc::killpg(pgid, signo) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pgid, "Process group already gone");
        } else {
            warn!(pgid, error = %err, "Failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pid: u32, _signal: Signal) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_signal_missing_group_is_harmless() {
        // i32::MAX is far above any real pid_max.
        signal_group(i32::MAX as u32, Signal::Kill);
        signal_group(i32::MAX as u32, Signal::Terminate);
    }
}
