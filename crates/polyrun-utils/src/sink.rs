//! Shared output destinations.
//!
//! A script's stdout may be written from a pump thread while the caller holds
//! another handle to the same destination, so sinks are cheap clones of one
//! locked writer.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A cloneable, thread-safe output destination.
#[derive(Clone)]
pub struct OutputSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
    label: &'static str,
}

impl OutputSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
            label: "custom",
        }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self {
            label: "stdout",
            ..Self::new(io::stdout())
        }
    }

    #[must_use]
    pub fn stderr() -> Self {
        Self {
            label: "stderr",
            ..Self::new(io::stderr())
        }
    }

    /// A sink writing into memory, plus a handle to read what was written.
    #[must_use]
    pub fn capture() -> (Self, CaptureBuffer) {
        let buffer = CaptureBuffer::default();
        let sink = Self {
            label: "capture",
            ..Self::new(buffer.clone())
        };
        (sink, buffer)
    }

    /// Write and flush `bytes` under the sink's lock.
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Write `line` followed by a newline.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write_bytes(&bytes)
    }

    /// True when both handles point at the same destination.
    #[must_use]
    pub fn same_as(&self, other: &OutputSink) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").field("label", &self.label).finish()
    }
}

/// In-memory buffer behind [`OutputSink::capture`].
#[derive(Clone, Default, Debug)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
