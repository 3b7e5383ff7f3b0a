//! Per-run diagnostic log capture
//!
//! Each environment gets its own `tracing` dispatcher writing formatted
//! events into a shared buffer. Teardown prints the buffer between banner
//! lines so a test's output shows what happened inside the harness.

use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;

/// Line printed before and after flushed logs
pub const BANNER: &str = "******************** LOGS ********************";

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuffer {
    type Writer = SharedBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// In-memory log sink for one environment
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct LogCapture {
    buffer: SharedBuffer,
    dispatch: Dispatch,
}

impl std::fmt::Debug for LogCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogCapture")
            .field("bytes", &self.buffer.0.lock().len())
            .finish()
    }
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCapture {
    /// Capture at debug level and above
    pub fn new() -> Self {
        let buffer = SharedBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_target(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Self {
            buffer,
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Dispatcher to install with `tracing::dispatcher::with_default`
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this capture as the thread's default subscriber
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Append raw text, e.g. logs dumped by a database instance
    pub fn append(&self, text: &str) {
        let mut buffer = self.buffer.0.lock();
        buffer.extend_from_slice(text.as_bytes());
        if !text.ends_with('\n') {
            buffer.push(b'\n');
        }
    }

    /// Everything captured so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.0.lock()).into_owned()
    }

    /// Print the captured logs between banner lines and return that text
    pub fn flush(&self) -> String {
        let text = format!("{BANNER}\n{}{BANNER}\n", self.contents());
        print!("{text}");
        text
    }
}
