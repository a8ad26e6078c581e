//! One live tracked allocation

/// Bookkeeping entry for a live allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Record {
    /// Where the block lives.
    pub address: usize,
    /// Number of items.
    pub count: usize,
    /// Bytes per item.
    pub size: usize,
    /// Human-readable description given by the caller.
    pub tag: String,
}

impl Record {
    /// Live byte footprint, `count * size`.
    pub fn bytes(&self) -> usize {
        self.count.saturating_mul(self.size)
    }
}

/// Handle to a record in the directory's arena.
///
/// Handles are reused after removal, so they are only meaningful while the
/// record they were returned for is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub(crate) usize);

/// Arena slot: the record plus its neighbours in allocation order.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) record: Record,
    pub(crate) prev: Option<RecordId>,
    pub(crate) next: Option<RecordId>,
}
