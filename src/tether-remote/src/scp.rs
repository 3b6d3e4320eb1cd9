//! File transfer over scp.

use std::path::PathBuf;
use std::time::Duration;

use tether_exec::{DEFAULT_TIMEOUT, Invocation};

use super::target::SshTarget;
use super::{RemoteError, Result};

/// Direction and endpoints of a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    /// Local file or directory to the remote path.
    Upload { local: PathBuf, remote: String },
    /// Remote path to the local file or directory.
    Download { remote: String, local: PathBuf },
}

/// One scp copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScpRequest {
    pub transfer: Transfer,
    /// Copy directories recursively (`-r`).
    pub recursive: bool,
    /// Keep modification times and modes (`-p`).
    pub preserve: bool,
    pub timeout: Duration,
    pub kill_grace: Option<Duration>,
    pub program: String,
}

impl ScpRequest {
    pub fn new(transfer: Transfer) -> Self {
        Self {
            transfer,
            recursive: false,
            preserve: false,
            timeout: DEFAULT_TIMEOUT,
            kill_grace: None,
            program: "scp".to_string(),
        }
    }

    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self::new(Transfer::Upload {
            local: local.into(),
            remote: remote.into(),
        })
    }

    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self::new(Transfer::Download {
            remote: remote.into(),
            local: local.into(),
        })
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn preserve(mut self, preserve: bool) -> Self {
        self.preserve = preserve;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kill_grace(mut self, grace: Option<Duration>) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Assemble the invocation for `target`.
    pub fn invocation(&self, target: &SshTarget) -> Result<Invocation> {
        let remote_spec = |path: &str| format!("{}:{path}", target.scp_destination());

        let (source, destination) = match &self.transfer {
            Transfer::Upload { local, remote } => (local_arg(local)?, remote_spec(remote)),
            Transfer::Download { remote, local } => (remote_spec(remote), local_arg(local)?),
        };

        // -B: batch mode, never ask for passwords or passphrases.
        let mut builder = Invocation::builder(&self.program)
            .arg("-B")
            .args(target.connection_args("-P"));

        if self.recursive {
            builder = builder.arg("-r");
        }
        if self.preserve {
            builder = builder.arg("-p");
        }

        builder = builder
            .arg("--")
            .arg(source)
            .arg(destination)
            .timeout(self.timeout);

        if let Some(grace) = self.kill_grace {
            builder = builder.kill_grace(grace);
        }

        Ok(builder.build()?)
    }
}

/// scp reads a `:` before the first `/` as `host:path`, so such relative
/// local paths get a `./` prefix.
fn local_arg(path: &std::path::Path) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(RemoteError::EmptyPath("local"));
    }
    let text = path.to_string_lossy();
    let looks_remote = match (text.find(':'), text.find('/')) {
        (Some(colon), Some(slash)) => colon < slash,
        (Some(_), None) => true,
        (None, _) => false,
    };
    if looks_remote {
        Ok(format!("./{text}"))
    } else {
        Ok(text.into_owned())
    }
}
