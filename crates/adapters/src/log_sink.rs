//! Line sinks used by the JSON logger.

use std::io::Write;
use std::sync::Mutex;

/// Destination for pre-formatted log lines (each ends with `\n`).
pub trait LogSink: Send + Sync {
    /// Write one line.
    fn write_line(&self, line: &str);
}

/// Writes lines to stderr so stdout stays free for command output.
#[derive(Debug, Default)]
pub struct StderrLogSink;

impl LogSink for StderrLogSink {
    fn write_line(&self, line: &str) {
        let mut stderr = std::io::stderr().lock();
        // A failed stderr write has nowhere left to be reported.
        let _ = stderr.write_all(line.as_bytes());
    }
}

/// Buffers lines in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    /// Drain the buffered lines.
    pub fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

impl LogSink for MemoryLogSink {
    fn write_line(&self, line: &str) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(line.to_owned());
        }
    }
}
