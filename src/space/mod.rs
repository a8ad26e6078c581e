//! Byte accounting
//!
//! Tracks live and peak bytes handed out through the facade and enforces the
//! optional memory ceiling.

mod accounting;

pub use accounting::Accounting;

/// Point-in-time view of the accounting counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MemStats {
    /// Bytes currently live.
    pub total_bytes: usize,

    /// Highest live total during the run.
    pub peak_bytes: usize,

    /// Number of tracked allocations (0 when tracking is off).
    pub live_allocations: usize,

    /// Ceiling, if any.
    pub limit: Option<usize>,
}

impl MemStats {
    /// True if `total_bytes` is within the ceiling.
    pub fn within_limit(&self) -> bool {
        self.limit.map_or(true, |limit| self.total_bytes <= limit)
    }

    /// One-line summary in the runtime's `totalMem=, maxMem=` form.
    pub fn summary_line(&self) -> String {
        format!("totalMem={}, maxMem={}", self.total_bytes, self.peak_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_format() {
        let stats = MemStats {
            total_bytes: 24,
            peak_bytes: 96,
            live_allocations: 2,
            limit: None,
        };
        assert_eq!(stats.summary_line(), "totalMem=24, maxMem=96");
        assert!(stats.within_limit());
    }
}
