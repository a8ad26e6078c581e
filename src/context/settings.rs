//! Setup-phase settings and the flags they latch into

use crate::error::ConfigWarning;
use crate::trace::TraceLog;

/// Flags in effect once tracking has started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Flags {
    /// Maintain live/peak byte counters. Implies `track`.
    pub stat: bool,
    /// Maintain the allocation directory.
    pub track: bool,
    /// Write trace log lines.
    pub trace: bool,
    /// Minimum `count * size` for a trace line.
    pub trace_threshold: usize,
    /// Memory ceiling, if any.
    pub byte_limit: Option<usize>,
}

/// Pending configuration, filled in by the argument parser before the run.
///
/// Valued settings accept one value; a second value is refused with
/// [`ConfigWarning::AlreadySet`] and the first stays.
#[derive(Debug, Default)]
pub struct Settings {
    stat: bool,
    track: bool,
    trace: Option<TraceLog>,
    trace_requested: bool,
    trace_threshold: Option<usize>,
    byte_limit: Option<usize>,
}

impl Settings {
    /// Enable statistics (and therefore tracking).
    pub fn set_stat(&mut self) {
        self.stat = true;
        self.track = true;
    }

    /// Enable tracking.
    pub fn set_track(&mut self) {
        self.track = true;
    }

    /// Enable tracing into `log`.
    pub fn set_trace(&mut self, log: TraceLog) -> Result<(), ConfigWarning> {
        self.request_trace()?;
        self.trace = Some(log);
        Ok(())
    }

    /// Mark tracing as requested even though its log could not be opened.
    /// Later attempts are refused like any second value.
    pub fn request_trace(&mut self) -> Result<(), ConfigWarning> {
        if self.trace_requested {
            return Err(ConfigWarning::AlreadySet {
                setting: "memtrace",
            });
        }
        self.trace_requested = true;
        Ok(())
    }

    /// Set the trace threshold. The value is kept even when tracing is not
    /// configured yet, but that case is reported.
    pub fn set_trace_threshold(&mut self, bytes: usize) -> Result<(), ConfigWarning> {
        if self.trace_threshold.is_some() {
            return Err(ConfigWarning::AlreadySet {
                setting: "memthreshold",
            });
        }
        self.trace_threshold = Some(bytes);
        if self.trace.is_none() {
            return Err(ConfigWarning::ThresholdWithoutTrace);
        }
        Ok(())
    }

    /// Set the memory ceiling. Enables statistics.
    pub fn set_byte_limit(&mut self, bytes: usize) -> Result<(), ConfigWarning> {
        if self.byte_limit.is_some() {
            return Err(ConfigWarning::AlreadySet { setting: "memmax" });
        }
        self.byte_limit = Some(bytes);
        self.set_stat();
        Ok(())
    }

    /// Consume the settings into active flags plus the open trace log.
    pub(crate) fn latch(&mut self) -> (Flags, Option<TraceLog>) {
        let mut trace = self.trace.take();
        let threshold = self.trace_threshold.unwrap_or(0);
        if let Some(log) = trace.as_mut() {
            log.set_threshold(threshold);
        }
        let flags = Flags {
            stat: self.stat,
            track: self.track || self.stat,
            trace: trace.is_some(),
            trace_threshold: threshold,
            byte_limit: self.byte_limit.filter(|&limit| limit > 0),
        };
        (flags, trace)
    }
}
