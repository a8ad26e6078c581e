//! Error taxonomy for the allocation layer.
//!
//! [`MemoryError`] covers everything the runtime cannot safely continue
//! after; [`ConfigWarning`] covers setup problems that only disable a
//! feature. Nothing here aborts the process: callers decide.

use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable failures raised by the instrumented facade and reporting.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The raw allocator returned null.
    #[error("Out of memory allocating \"{tag}\"")]
    OutOfMemory {
        /// Tag of the failed request.
        tag: String,
    },

    /// `count * size` does not fit in `usize`.
    #[error("Out of memory allocating \"{tag}\": {count} items of size {size} overflow")]
    SizeOverflow {
        /// Tag of the failed request.
        tag: String,
        /// Requested item count.
        count: usize,
        /// Requested item size.
        size: usize,
    },

    /// Live bytes went past the configured ceiling.
    #[error("Exceeded memory limit: {total} bytes live > limit {limit}")]
    MemoryLimitExceeded {
        /// Live bytes after the offending increase.
        total: usize,
        /// Configured ceiling.
        limit: usize,
    },

    /// Release of an address the directory does not know.
    #[error("Attempting to free memory that wasn't allocated ({address:#x})")]
    UntrackedAddress {
        /// Address passed to release.
        address: usize,
    },

    /// Resize of an address that is neither tracked nor exempt.
    #[error("Attempting to realloc memory for {tag} that wasn't allocated ({address:#x})")]
    UntrackedResize {
        /// Tag of the resize request.
        tag: String,
        /// Address passed to resize.
        address: usize,
    },

    /// A table dump was requested without tracking.
    #[error("The memory table dump only works with the --memtrack flag")]
    ReportingDisabled,

    /// A statistics query was requested without statistics.
    #[error("Memory statistics only work with the --memstat flag")]
    StatisticsDisabled,

    /// The bucket table lost an entry the order list still holds.
    #[error("Hash table entry has disappeared unexpectedly! ({address:#x})")]
    BucketEntryMissing {
        /// Address whose bucket entry was missing.
        address: usize,
    },

    /// Writing a report failed.
    #[error("report output failed: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Internal invariant violation rather than a caller bug.
    pub fn is_internal(&self) -> bool {
        matches!(self, MemoryError::BucketEntryMissing { .. })
    }

    /// Report requested without the matching flag.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            MemoryError::ReportingDisabled | MemoryError::StatisticsDisabled
        )
    }
}

/// Recoverable setup problems. The setting in question is skipped or kept as
/// is, and the run continues.
#[derive(Debug, Error)]
pub enum ConfigWarning {
    /// The trace log could not be created.
    #[error("Unable to open \"{}\": {source}", .path.display())]
    TraceLogOpen {
        /// Requested log path.
        path: PathBuf,
        /// Underlying open failure.
        #[source]
        source: std::io::Error,
    },

    /// A trace threshold without tracing has nothing to filter.
    #[error("--memthreshold useless when used without --memtrace")]
    ThresholdWithoutTrace,

    /// The setting was already given a value.
    #[error("{setting} may only be set once")]
    AlreadySet {
        /// Name of the setting.
        setting: &'static str,
    },

    /// Settings are frozen once tracking has started.
    #[error("memory tracking already started; setting ignored")]
    TrackingStarted,
}

/// Failures building an [`crate::array::ArrayDescriptor`].
#[derive(Debug, Error)]
pub enum LayoutError {
    /// A domain needs at least one dimension.
    #[error("array rank must be at least 1")]
    ZeroRank,

    /// Offsets are only defined for positive strides.
    #[error("dimension {dim} has non-positive stride {stride}")]
    NonPositiveStride {
        /// Offending dimension.
        dim: usize,
        /// Its stride.
        stride: i64,
    },

    /// Element count times element size overflowed.
    #[error("array of {count} elements of {size} bytes is too large")]
    TooLarge {
        /// Element count.
        count: usize,
        /// Element size.
        size: usize,
    },

    /// Backing storage could not be obtained.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
