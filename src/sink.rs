//! Diagnostic output sink
//!
//! All human-readable progress output from the walker and the per-file
//! tasks goes through a [`DiagnosticSink`]. Tasks run concurrently, so the
//! sink must serialize individual writes: each line is an atomic unit, but
//! no global ordering is imposed across threads.

use std::io::Write;
use std::sync::Mutex;

/// Append-only, thread-safe line writer
pub trait DiagnosticSink: Send + Sync {
    /// Write a single message; the implementation must not interleave it
    /// with lines from other threads
    fn write_line(&self, line: &str);
}

/// Sink writing to stdout, one locked write per line
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        // A failed diagnostic write must not take down a file task
        let _ = writeln!(handle, "{}", line);
    }
}

/// Sink capturing lines in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("sink lock poisoned").clone()
    }

    /// Number of captured lines
    pub fn len(&self) -> usize {
        self.lines.lock().expect("sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .expect("sink lock poisoned")
            .push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_sink_captures_lines() {
        let sink = MemorySink::new();
        sink.write_line("one");
        sink.write_line("two");
        assert_eq!(sink.lines(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_memory_sink_concurrent_writers() {
        let sink = Arc::new(MemorySink::new());
        let mut handles = Vec::new();

        for t in 0..8 {
            let sink = Arc::clone(&sink);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    sink.write_line(&format!("thread {} line {}", t, i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Every line lands intact; ordering across threads is unspecified
        assert_eq!(sink.len(), 800);
        assert!(sink.lines().iter().all(|l| l.starts_with("thread ")));
    }
}
