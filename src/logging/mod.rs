// Logging module: tracing subscriber setup and the request log

use std::error::Error;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for operator diagnostics.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. The request log
/// (see [`AccessLog`]) is separate and always written; tracing output is
/// for debugging the proxy itself.
pub fn init_subscriber() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()?;
    Ok(())
}

/// Identifies the request a log record belongs to. Zero is never
/// allocated and renders as `(no-id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub u64);

impl RequestId {
    pub const NONE: RequestId = RequestId(0);
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("(no-id)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// The append-only request log.
///
/// Every record is one line of the form `<id>: <detail>`, written as a
/// single unit under the log mutex so records from concurrent workers
/// never interleave. Cloning shares the underlying sink.
#[derive(Clone)]
pub struct AccessLog {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl AccessLog {
    /// Append to the given file, creating it if needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_writer(Box::new(file)))
    }

    /// Write records to stdout.
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Write records to an arbitrary sink.
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// A log capturing into a shared buffer, for tests that assert on
    /// log content.
    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = CaptureWriter {
            buffer: buffer.clone(),
        };
        (Self::with_writer(Box::new(writer)), buffer)
    }

    /// Write one record. Sink errors are reported through tracing and
    /// otherwise ignored; losing a log line must not kill a connection.
    pub fn line(&self, id: RequestId, detail: fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}: {}", id, detail).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write access log record");
        }
    }

    pub fn note(&self, id: RequestId, detail: &str) {
        self.line(id, format_args!("NOTE {}", detail));
    }

    pub fn error(&self, id: RequestId, detail: fmt::Arguments<'_>) {
        self.line(id, format_args!("ERROR {}", detail));
    }
}

/// A writer that appends to a shared buffer, for tests.
struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
