//! Invocation: one fully-specified request to run an external program.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{DEFAULT_TIMEOUT, InvocationError, Result};

/// An immutable request to execute one external program with a deadline.
///
/// Build one with [`Invocation::builder`]; the builder checks that the
/// program is non-empty and the timeout is positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    env: BTreeMap<String, String>,
    kill_grace: Option<Duration>,
}

impl Invocation {
    /// Start building an invocation of `program`.
    pub fn builder(program: impl Into<String>) -> InvocationBuilder {
        InvocationBuilder::new(program)
    }

    /// Executable path or name (resolved through `PATH` by the OS).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in order.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if not inherited.
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Hard deadline for the process.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Environment overrides applied on top of the inherited environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Grace period between the polite terminate signal and the forced kill.
    pub fn kill_grace(&self) -> Option<Duration> {
        self.kill_grace
    }

    /// Same invocation with a different timeout.
    ///
    /// Used by callers that retry a timed-out command with a longer deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(InvocationError::ZeroTimeout);
        }
        Ok(Self {
            timeout,
            ..self.clone()
        })
    }

    /// Shell-quoted rendering of the command line, for logs and dry runs.
    pub fn command_line(&self) -> String {
        let words: Vec<&str> = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect();
        shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "))
    }
}

/// Builder for [`Invocation`].
#[derive(Debug, Clone)]
pub struct InvocationBuilder {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Duration,
    env: BTreeMap<String, String>,
    kill_grace: Option<Duration>,
}

impl InvocationBuilder {
    fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: DEFAULT_TIMEOUT,
            env: BTreeMap::new(),
            kill_grace: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir` instead of the caller's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set the deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override one environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Send a terminate signal first and wait `grace` before killing.
    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    /// Validate and freeze the invocation.
    pub fn build(self) -> Result<Invocation> {
        if self.program.trim().is_empty() {
            return Err(InvocationError::EmptyProgram);
        }
        if self.timeout.is_zero() {
            return Err(InvocationError::ZeroTimeout);
        }
        if let Some(bad) = self
            .env
            .keys()
            .find(|key| key.is_empty() || key.contains('=') || key.contains('\0'))
        {
            return Err(InvocationError::InvalidEnvName(bad.clone()));
        }

        Ok(Invocation {
            program: self.program,
            args: self.args,
            cwd: self.cwd,
            timeout: self.timeout,
            env: self.env,
            kill_grace: self.kill_grace.filter(|grace| !grace.is_zero()),
        })
    }
}
