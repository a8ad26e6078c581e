//! Allocation directory
//!
//! Address-keyed table over live allocations. Records live in an arena and
//! are referenced by [`RecordId`]; a fixed table of [`TABLE_SIZE`] buckets maps
//! addresses to ids, and `prev`/`next` ids on each slot keep allocation order
//! for reporting.
//!
//! Bucket chains are searched newest-first. The order list is the only
//! structure reports walk, so reports come out in allocation order.

mod hash;
mod record;

pub use hash::{address_hash, bucket_of, TABLE_SIZE};
pub use record::{Record, RecordId};

use record::Slot;
use tracing::debug;

use crate::error::MemoryError;

/// Address-keyed hash table plus insertion-ordered list of [`Record`]s.
#[derive(Debug)]
pub struct Directory {
    slots: Vec<Option<Slot>>,
    vacant: Vec<usize>,
    buckets: Vec<Vec<RecordId>>,
    first: Option<RecordId>,
    last: Option<RecordId>,
    len: usize,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            buckets: vec![Vec::new(); TABLE_SIZE],
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Drop every record and empty all buckets.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.vacant.clear();
        self.buckets.iter_mut().for_each(Vec::clear);
        self.first = None;
        self.last = None;
        self.len = 0;
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Find the record for `address`.
    pub fn lookup(&self, address: usize) -> Option<&Record> {
        self.lookup_id(address).and_then(|id| self.get(id))
    }

    /// Find the handle for `address`.
    pub fn lookup_id(&self, address: usize) -> Option<RecordId> {
        self.buckets[bucket_of(address)]
            .iter()
            .rev()
            .copied()
            .find(|&id| self.get(id).is_some_and(|r| r.address == address))
    }

    /// Record behind a handle.
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.slot(id).map(|slot| &slot.record)
    }

    /// Track `address`. An address that is already tracked has its count and
    /// size overwritten in place and keeps its position in allocation order.
    pub fn install(&mut self, address: usize, count: usize, size: usize, tag: &str) -> RecordId {
        if let Some(id) = self.lookup_id(address) {
            if let Some(slot) = self.slot_mut(id) {
                slot.record.count = count;
                slot.record.size = size;
            }
            debug!(address, count, size, "directory: address reused");
            return id;
        }

        let slot = Slot {
            record: Record {
                address,
                count,
                size,
                tag: tag.to_owned(),
            },
            prev: self.last,
            next: None,
        };
        let id = match self.vacant.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                RecordId(index)
            }
            None => {
                self.slots.push(Some(slot));
                RecordId(self.slots.len() - 1)
            }
        };

        self.buckets[bucket_of(address)].push(id);
        match self.last {
            Some(last) => {
                if let Some(prev) = self.slot_mut(last) {
                    prev.next = Some(id);
                }
            }
            None => self.first = Some(id),
        }
        self.last = Some(id);
        self.len += 1;

        debug!(address, count, size, tag, "directory: installed");
        id
    }

    /// Move a record to `new_address` after a resize, updating its count and
    /// size. Its position in allocation order does not change.
    pub fn relocate(
        &mut self,
        id: RecordId,
        old_address: usize,
        new_address: usize,
        count: usize,
        size: usize,
    ) -> Result<(), MemoryError> {
        self.unlink_bucket(id, old_address)?;
        self.buckets[bucket_of(new_address)].push(id);

        let slot = self.slot_mut(id).ok_or(MemoryError::BucketEntryMissing {
            address: old_address,
        })?;
        slot.record.address = new_address;
        slot.record.count = count;
        slot.record.size = size;

        debug!(old_address, new_address, count, size, "directory: relocated");
        Ok(())
    }

    /// Stop tracking `address`, returning its record.
    ///
    /// An address that is not tracked is an error: it means the caller
    /// released something twice or never allocated it here.
    pub fn remove(&mut self, address: usize) -> Result<Record, MemoryError> {
        let id = self
            .lookup_id(address)
            .ok_or(MemoryError::UntrackedAddress { address })?;

        self.unlink_bucket(id, address)?;
        let slot = self.slots[id.0]
            .take()
            .ok_or(MemoryError::BucketEntryMissing { address })?;

        match slot.prev {
            Some(prev) => {
                if let Some(p) = self.slot_mut(prev) {
                    p.next = slot.next;
                }
            }
            None => self.first = slot.next,
        }
        match slot.next {
            Some(next) => {
                if let Some(n) = self.slot_mut(next) {
                    n.prev = slot.prev;
                }
            }
            None => self.last = slot.prev,
        }

        self.vacant.push(id.0);
        self.len -= 1;
        debug!(address, "directory: removed");
        Ok(slot.record)
    }

    /// Records in allocation order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            directory: self,
            cursor: self.first,
        }
    }

    fn slot(&self, id: RecordId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: RecordId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn unlink_bucket(&mut self, id: RecordId, address: usize) -> Result<(), MemoryError> {
        let chain = &mut self.buckets[bucket_of(address)];
        let pos = chain
            .iter()
            .position(|&entry| entry == id)
            .ok_or(MemoryError::BucketEntryMissing { address })?;
        chain.remove(pos);
        Ok(())
    }
}

/// Iterator over records in allocation order.
#[derive(Debug)]
pub struct Iter<'a> {
    directory: &'a Directory,
    cursor: Option<RecordId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.directory.slot(self.cursor?)?;
        self.cursor = slot.next;
        Some(&slot.record)
    }
}

impl<'a> IntoIterator for &'a Directory {
    type Item = &'a Record;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
