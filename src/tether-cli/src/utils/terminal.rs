//! Terminal helpers: color detection and output that survives closed pipes.

use std::io::{self, IsTerminal, Write};

/// Colors used for notices on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermColor {
    /// Failures
    Red,
    /// Timeouts and interruptions
    Yellow,
    Default,
}

impl TermColor {
    #[inline]
    pub fn ansi_code(&self) -> &'static str {
        match self {
            TermColor::Red => "\x1b[1;31m",
            TermColor::Yellow => "\x1b[1;33m",
            TermColor::Default => "\x1b[0m",
        }
    }

    /// Format a string with this color for stderr output.
    pub fn format_stderr(&self, text: &str) -> String {
        if should_use_colors_stderr() {
            format!("{}{}{}", self.ansi_code(), text, TermColor::Default.ansi_code())
        } else {
            text.to_string()
        }
    }
}

/// Check if colors should be disabled based on NO_COLOR env var.
///
/// Follows the NO_COLOR standard: https://no-color.org/
#[inline]
pub fn colors_disabled() -> bool {
    std::env::var("NO_COLOR")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
}

/// Check if colors should be used for stderr output.
#[inline]
pub fn should_use_colors_stderr() -> bool {
    !colors_disabled() && io::stderr().is_terminal()
}

/// Write raw bytes to stdout. A closed pipe is not an error.
pub fn safe_write_stdout(bytes: &[u8]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    ignore_broken_pipe(out.write_all(bytes).and_then(|()| out.flush()))
}

/// Write raw bytes to stderr. A closed pipe is not an error.
pub fn safe_write_stderr(bytes: &[u8]) -> io::Result<()> {
    let mut err = io::stderr().lock();
    ignore_broken_pipe(err.write_all(bytes).and_then(|()| err.flush()))
}

fn ignore_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_pipe_is_ignored() {
        let broken = Err(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(ignore_broken_pipe(broken).is_ok());

        let other = Err(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(ignore_broken_pipe(other).is_err());
    }

    #[test]
    fn test_ansi_codes() {
        assert_eq!(TermColor::Yellow.ansi_code(), "\x1b[1;33m");
        assert_eq!(TermColor::Default.ansi_code(), "\x1b[0m");
    }
}
