//! Allocation trace log
//!
//! Append-only log with one line per qualifying allocate / zero-allocate /
//! resize call:
//!
//! ```text
//! malloc called for 10 items of size 8 for array data:  0x55d0c1a2b2a0
//! realloc called for 20 items of size 8 for array data:  0x55d0c1a2b2a0 -> 0x55d0c1a2c000
//! ```
//!
//! Calls whose `count * size` is below the threshold are skipped.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Which facade entry point produced a trace line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Plain allocation.
    Malloc,
    /// Zero-filled allocation.
    Calloc,
    /// Resize.
    Realloc,
}

impl CallKind {
    /// Name used in trace lines.
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Malloc => "malloc",
            CallKind::Calloc => "calloc",
            CallKind::Realloc => "realloc",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open trace log plus its byte threshold.
pub struct TraceLog {
    sink: Box<dyn Write>,
    threshold: usize,
    lines: usize,
}

impl fmt::Debug for TraceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceLog")
            .field("threshold", &self.threshold)
            .field("lines", &self.lines)
            .finish_non_exhaustive()
    }
}

impl TraceLog {
    /// Log to an arbitrary writer.
    pub fn new(sink: Box<dyn Write>) -> Self {
        Self {
            sink,
            threshold: 0,
            lines: 0,
        }
    }

    /// Create (or truncate) the log file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    /// Minimum `count * size` for a call to be logged.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Change the threshold.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Log one call. `new_address` is only printed when it differs from
    /// `address`.
    pub fn log_call(
        &mut self,
        kind: CallKind,
        count: usize,
        size: usize,
        tag: &str,
        address: usize,
        new_address: Option<usize>,
    ) -> io::Result<()> {
        if count.saturating_mul(size) < self.threshold {
            return Ok(());
        }

        write!(
            self.sink,
            "{kind} called for {count} items of size {size} for {tag}:  {address:#x}"
        )?;
        if let Some(moved) = new_address.filter(|&moved| moved != address) {
            write!(self.sink, " -> {moved:#x}")?;
        }
        writeln!(self.sink)?;
        self.lines += 1;
        Ok(())
    }

    /// Flush buffered lines.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

impl Drop for TraceLog {
    fn drop(&mut self) {
        let _ = self.sink.flush();
    }
}
