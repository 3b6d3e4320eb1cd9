//! Remote command execution over ssh.

use std::time::Duration;

use tether_exec::{DEFAULT_TIMEOUT, Invocation};

use super::target::SshTarget;
use super::{RemoteError, Result};

/// Prepended to the remote command when a UTF-8 locale is forced.
pub const UTF8_PREAMBLE: &str = "export LANG=C.UTF-8 LC_ALL=C.UTF-8;";

/// A command to run on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshRequest {
    /// Words of the remote command; ssh joins them with spaces.
    pub remote_command: Vec<String>,
    pub timeout: Duration,
    pub utf8: bool,
    pub kill_grace: Option<Duration>,
    /// ssh client executable.
    pub program: String,
}

impl SshRequest {
    pub fn new<I, S>(remote_command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            remote_command: remote_command.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_TIMEOUT,
            utf8: false,
            kill_grace: None,
            program: "ssh".to_string(),
        }
    }

    /// Builder: set timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: force a UTF-8 locale on the remote side.
    pub fn utf8(mut self, utf8: bool) -> Self {
        self.utf8 = utf8;
        self
    }

    /// Builder: set kill grace.
    pub fn kill_grace(mut self, grace: Option<Duration>) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Builder: use another ssh client.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Assemble the invocation for `target`.
    pub fn invocation(&self, target: &SshTarget) -> Result<Invocation> {
        if self.remote_command.iter().all(|word| word.trim().is_empty()) {
            return Err(RemoteError::EmptyRemoteCommand);
        }

        let mut builder = Invocation::builder(&self.program)
            // No pseudo-terminal: nothing on the far side can wait for a keypress.
            .arg("-T")
            .args(target.connection_args("-p"))
            .arg(target.destination())
            .arg("--");

        if self.utf8 {
            builder = builder.arg(UTF8_PREAMBLE);
        }

        builder = builder
            .args(self.remote_command.iter().cloned())
            .timeout(self.timeout);

        if let Some(grace) = self.kill_grace {
            builder = builder.kill_grace(grace);
        }

        Ok(builder.build()?)
    }
}
