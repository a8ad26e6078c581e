//! Memory table dumps and statistics summaries
//!
//! The table lists tracked allocations in allocation order:
//!
//! ```text
//! ================================================================================
//! ----------------------
//! ***Allocated Memory***
//! ----------------------
//! Size:    Number:  Total:   Address:    Description:
//! (bytes)           (bytes)
//! ================================================================================
//! 8        10       80       0x00001000  array data
//! ```

use std::io::{self, Write};

use crate::context::{MemoryContext, RawAllocator};
use crate::directory::Record;
use crate::error::MemoryError;

const NUMBER_WIDTH: usize = 9;
const ADDRESS_WIDTH: usize = 12;
const BANNER: &str = "================================================================================";

impl<A: RawAllocator> MemoryContext<A> {
    /// Write every tracked allocation larger than `min_bytes` to `out`.
    pub fn write_table<W: Write>(&self, out: &mut W, min_bytes: usize) -> Result<(), MemoryError> {
        if !self.flags().track {
            return Err(MemoryError::ReportingDisabled);
        }

        writeln!(out)?;
        writeln!(out, "{BANNER}")?;
        writeln!(out, "----------------------")?;
        writeln!(out, "***Allocated Memory***")?;
        writeln!(out, "----------------------")?;
        writeln!(
            out,
            "{:<w$}{:<w$}{:<w$}{:<aw$}{}",
            "Size:",
            "Number:",
            "Total:",
            "Address:",
            "Description:",
            w = NUMBER_WIDTH,
            aw = ADDRESS_WIDTH
        )?;
        writeln!(
            out,
            "{:<w$}{:<w$}{:<w$}",
            "(bytes)",
            "",
            "(bytes)",
            w = NUMBER_WIDTH
        )?;
        writeln!(out, "{BANNER}")?;

        for record in self.directory().iter().filter(|r| r.bytes() > min_bytes) {
            write_row(out, record)?;
        }
        writeln!(out)?;
        Ok(())
    }

    /// [`Self::write_table`] to stdout.
    pub fn print_table(&self, min_bytes: usize) -> Result<(), MemoryError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_table(&mut out, min_bytes)
    }

    /// Write `totalMem=<live>, maxMem=<peak>`.
    pub fn write_summary<W: Write>(&mut self, out: &mut W) -> Result<(), MemoryError> {
        if !self.flags().stat {
            return Err(MemoryError::StatisticsDisabled);
        }
        writeln!(out, "{}", self.stats().summary_line())?;
        self.summary_printed = true;
        Ok(())
    }

    /// [`Self::write_summary`] to stdout.
    pub fn print_summary(&mut self) -> Result<(), MemoryError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_summary(&mut out)
    }

    /// End-of-run summary. Written only when statistics are on and no
    /// summary (or [`Self::memory_used`]) was requested during the run.
    /// Returns whether anything was written.
    pub fn write_final_summary<W: Write>(&mut self, out: &mut W) -> Result<bool, MemoryError> {
        if self.summary_printed || !self.flags().stat {
            return Ok(false);
        }
        write!(out, "Final Memory Statistics:  ")?;
        self.write_summary(out)?;
        Ok(true)
    }

    /// [`Self::write_final_summary`] to stdout.
    pub fn print_final_summary(&mut self) -> Result<bool, MemoryError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_final_summary(&mut out)
    }

    /// Bytes currently live. Suppresses the final summary.
    pub fn memory_used(&mut self) -> Result<usize, MemoryError> {
        self.summary_printed = true;
        if !self.flags().stat {
            return Err(MemoryError::StatisticsDisabled);
        }
        Ok(self.accounting().total())
    }
}

fn write_row<W: Write>(out: &mut W, record: &Record) -> io::Result<()> {
    let address = format!("{:#010x}", record.address);
    writeln!(
        out,
        "{:<w$}{:<w$}{:<w$}{:<aw$}{}",
        record.size,
        record.count,
        record.bytes(),
        address,
        record.tag,
        w = NUMBER_WIDTH,
        aw = ADDRESS_WIDTH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_layout() {
        let record = Record {
            address: 0x1000,
            count: 10,
            size: 8,
            tag: "array data".into(),
        };
        let mut out = Vec::new();
        write_row(&mut out, &record).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "8        10       80       0x00001000  array data\n"
        );
    }

    #[test]
    fn banner_is_eighty_wide() {
        assert_eq!(BANNER.len(), 80);
    }

    #[test]
    fn reports_need_their_flags() {
        let mut ctx = MemoryContext::system();
        ctx.start_tracking();
        let mut sink = Vec::new();
        assert!(matches!(
            ctx.write_table(&mut sink, 0),
            Err(MemoryError::ReportingDisabled)
        ));
        assert!(matches!(
            ctx.write_summary(&mut sink),
            Err(MemoryError::StatisticsDisabled)
        ));
        assert!(!ctx.write_final_summary(&mut sink).unwrap());
        assert!(sink.is_empty());
    }

    #[test]
    fn final_summary_only_once() {
        let mut ctx = MemoryContext::system();
        ctx.set_stat().unwrap();
        ctx.start_tracking();
        let mut out = Vec::new();
        assert!(ctx.write_final_summary(&mut out).unwrap());
        assert!(!ctx.write_final_summary(&mut out).unwrap());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Final Memory Statistics:  totalMem=0, maxMem=0\n"
        );
    }

    #[test]
    fn memory_used_suppresses_final_summary() {
        let mut ctx = MemoryContext::system();
        ctx.set_stat().unwrap();
        ctx.start_tracking();
        assert_eq!(ctx.memory_used().unwrap(), 0);
        let mut out = Vec::new();
        assert!(!ctx.write_final_summary(&mut out).unwrap());
    }
}
