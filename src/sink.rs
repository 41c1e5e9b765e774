//! Output sink consumed by the connection controller.
//!
//! Everything the monitor shows a user flows through `OutputSink`: inbound
//! data verbatim, plus the open/close/error trace lines. The sink has no
//! feedback channel back into the core.

/// Append-only textual output target.
///
/// Implementations must not block: the controller's event pump calls into
/// the sink on its own task, and a slow sink must not stall transport
/// operations.
pub trait OutputSink: Send + Sync {
    /// Append raw text exactly as received, without reframing.
    fn append(&self, chunk: &str);

    /// Append a line; the sink supplies the terminator.
    fn append_line(&self, line: &str);

    /// Hint that the sink should be brought to the user's attention,
    /// e.g. when a session opens. Default: ignored.
    fn reveal(&self) {}
}

/// Routes monitor output into the `tracing` pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn append(&self, chunk: &str) {
        tracing::info!(target: "serial_monitor::output", "{chunk}");
    }

    fn append_line(&self, line: &str) {
        tracing::info!(target: "serial_monitor::output", "{line}");
    }
}

/// In-memory sink for tests: records everything appended.
///
/// # Example
/// ```
/// use serial_monitor::sink::{MemorySink, OutputSink};
///
/// let sink = MemorySink::new();
/// sink.append_line("[Info] Opened the serial port - COM3");
/// sink.append("raw bytes");
/// assert!(sink.contains("[Info] Opened the serial port - COM3"));
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    buffer: parking_lot::Mutex<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything appended so far, in order.
    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.buffer.lock().contains(needle)
    }

    /// Byte offset of the first occurrence of `needle`, for ordering
    /// assertions.
    pub fn find(&self, needle: &str) -> Option<usize> {
        self.buffer.lock().find(needle)
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl OutputSink for MemorySink {
    fn append(&self, chunk: &str) {
        self.buffer.lock().push_str(chunk);
    }

    fn append_line(&self, line: &str) {
        let mut buffer = self.buffer.lock();
        buffer.push_str(line);
        buffer.push('\n');
    }
}
