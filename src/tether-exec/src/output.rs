//! Output capture shared between pipe readers and the runner.

use std::sync::{Arc, Mutex};

/// Captures stdout and stderr of one child process.
///
/// Clones share the same buffers, so readers can keep appending while the
/// runner takes a snapshot at any point (including after a timeout).
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    inner: Arc<Mutex<OutputCaptureInner>>,
}

#[derive(Debug, Default)]
struct OutputCaptureInner {
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    limit: Option<usize>,
}

#[derive(Debug, Default)]
struct StreamBuffer {
    data: Vec<u8>,
    total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputCapture {
    /// Create an unbounded capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capture that keeps at most `limit` bytes per stream.
    ///
    /// Bytes past the limit are counted but dropped.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputCaptureInner {
                limit,
                ..Default::default()
            })),
        }
    }

    /// Append data to one stream.
    pub fn append(&self, stream: OutputStream, data: &[u8]) {
        if let Ok(mut inner) = self.inner.lock() {
            let limit = inner.limit;
            let buffer = match stream {
                OutputStream::Stdout => &mut inner.stdout,
                OutputStream::Stderr => &mut inner.stderr,
            };
            buffer.total += data.len();
            let room = limit.map_or(data.len(), |max| max.saturating_sub(buffer.data.len()));
            buffer.data.extend_from_slice(&data[..room.min(data.len())]);
        }
    }

    /// Get stdout content.
    pub fn stdout(&self) -> Vec<u8> {
        self.read(OutputStream::Stdout, |b| b.data.clone())
            .unwrap_or_default()
    }

    /// Get stderr content.
    pub fn stderr(&self) -> Vec<u8> {
        self.read(OutputStream::Stderr, |b| b.data.clone())
            .unwrap_or_default()
    }

    /// Total bytes the process wrote to `stream`, kept or not.
    pub fn total_bytes(&self, stream: OutputStream) -> usize {
        self.read(stream, |b| b.total).unwrap_or_default()
    }

    /// Whether `stream` lost bytes to the capture limit.
    pub fn was_truncated(&self, stream: OutputStream) -> bool {
        self.read(stream, |b| b.total > b.data.len())
            .unwrap_or_default()
    }

    fn read<T>(&self, stream: OutputStream, f: impl FnOnce(&StreamBuffer) -> T) -> Option<T> {
        self.inner.lock().ok().map(|inner| match stream {
            OutputStream::Stdout => f(&inner.stdout),
            OutputStream::Stderr => f(&inner.stderr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_are_separate() {
        let capture = OutputCapture::new();
        capture.append(OutputStream::Stdout, b"hello ");
        capture.append(OutputStream::Stderr, b"oops");
        capture.append(OutputStream::Stdout, b"world");

        assert_eq!(capture.stdout(), b"hello world");
        assert_eq!(capture.stderr(), b"oops");
        assert!(!capture.was_truncated(OutputStream::Stdout));
    }

    #[test]
    fn test_limit_keeps_head_and_counts_rest() {
        let capture = OutputCapture::with_limit(Some(4));
        capture.append(OutputStream::Stdout, b"abc");
        capture.append(OutputStream::Stdout, b"defg");

        assert_eq!(capture.stdout(), b"abcd");
        assert_eq!(capture.total_bytes(OutputStream::Stdout), 7);
        assert!(capture.was_truncated(OutputStream::Stdout));
        assert!(!capture.was_truncated(OutputStream::Stderr));
    }

    #[test]
    fn test_clones_share_buffers() {
        let capture = OutputCapture::new();
        let writer = capture.clone();
        writer.append(OutputStream::Stderr, b"from reader");
        assert_eq!(capture.stderr(), b"from reader");
    }
}
