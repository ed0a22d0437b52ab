use std::fmt::Write;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;

const MAX_TRACE_ENTRIES: usize = 128;

#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Time since the trace was created
    pub elapsed: Duration,
    pub message: String,
}

#[derive(Debug, Default)]
struct TraceBuffer {
    entries: Vec<TraceEntry>,
    dropped: usize,
}

/// Append-only diagnostic record of one operation's lifetime.
#[derive(Debug)]
pub struct Trace {
    start: Instant,
    buffer: Mutex<TraceBuffer>,
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            buffer: Mutex::new(TraceBuffer::default()),
        }
    }

    pub fn add(
        &self,
        message: impl Into<String>,
    ) {
        let mut buffer = self.buffer.lock();
        if buffer.entries.len() >= MAX_TRACE_ENTRIES {
            buffer.dropped += 1;
            return;
        }
        buffer.entries.push(TraceEntry {
            elapsed: self.start.elapsed(),
            message: message.into(),
        });
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.buffer.lock().entries.clone()
    }

    pub fn contains(
        &self,
        needle: &str,
    ) -> bool {
        self.buffer.lock().entries.iter().any(|e| e.message.contains(needle))
    }

    /// One line per entry: `+<micros>us <message>`.
    pub fn dump(&self) -> String {
        let buffer = self.buffer.lock();
        let mut out = String::new();
        for entry in &buffer.entries {
            let _ = writeln!(out, "+{}us {}", entry.elapsed.as_micros(), entry.message);
        }
        if buffer.dropped > 0 {
            let _ = writeln!(out, "({} entries dropped)", buffer.dropped);
        }
        out
    }
}
