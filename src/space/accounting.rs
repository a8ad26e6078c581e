//! Live-byte accounting

use crate::error::MemoryError;

/// Running total of live bytes, its peak, and an optional ceiling.
#[derive(Debug, Default)]
pub struct Accounting {
    /// Bytes currently live
    total: usize,

    /// Maximum seen
    peak: usize,

    /// Ceiling on `total`; `None` is unlimited
    limit: Option<usize>,
}

impl Accounting {
    /// Create accounting with an optional ceiling. A limit of 0 means
    /// unlimited.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            total: 0,
            peak: 0,
            limit: limit.filter(|&l| l > 0),
        }
    }

    /// Add `bytes` to the live total.
    ///
    /// When the total passes the ceiling the increase is kept (no rollback)
    /// and `MemoryLimitExceeded` is returned.
    pub fn increase(&mut self, bytes: usize) -> Result<(), MemoryError> {
        self.total = self.total.saturating_add(bytes);
        self.update_peak();

        match self.limit {
            Some(limit) if self.total > limit => Err(MemoryError::MemoryLimitExceeded {
                total: self.total,
                limit,
            }),
            _ => Ok(()),
        }
    }

    /// Subtract `bytes` from the live total.
    pub fn decrease(&mut self, bytes: usize) {
        self.total = self.total.saturating_sub(bytes);
        self.update_peak();
    }

    /// Zero both counters. The ceiling is kept.
    pub fn reset(&mut self) {
        self.total = 0;
        self.peak = 0;
    }

    /// Bytes currently live.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Highest live total observed.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Configured ceiling.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn update_peak(&mut self) {
        self.peak = self.peak.max(self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_follows_high_water_mark() {
        let mut acct = Accounting::new(None);
        acct.increase(100).unwrap();
        acct.increase(50).unwrap();
        acct.decrease(120);
        acct.increase(10).unwrap();
        assert_eq!(acct.total(), 40);
        assert_eq!(acct.peak(), 150);
    }

    #[test]
    fn decrease_leaves_peak_alone() {
        let mut acct = Accounting::new(None);
        acct.increase(30).unwrap();
        acct.decrease(30);
        acct.decrease(5);
        assert_eq!((acct.total(), acct.peak()), (0, 30));
    }

    #[test]
    fn limit_breach_keeps_the_bytes() {
        let mut acct = Accounting::new(Some(64));
        acct.increase(64).unwrap();
        let err = acct.increase(1).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::MemoryLimitExceeded { total: 65, limit: 64 }
        ));
        assert_eq!(acct.total(), 65);
        assert_eq!(acct.peak(), 65);
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let mut acct = Accounting::new(Some(0));
        assert_eq!(acct.limit(), None);
        acct.increase(usize::MAX / 2).unwrap();
    }

    #[test]
    fn reset_zeroes_counters() {
        let mut acct = Accounting::new(Some(10));
        acct.increase(5).unwrap();
        acct.reset();
        assert_eq!((acct.total(), acct.peak(), acct.limit()), (0, 0, Some(10)));
    }
}
