//! Addresses owned by the string builder
//!
//! The runtime's string-building allocator hands out blocks that are never
//! tracked but may later be resized through the facade. Only addresses listed
//! here are allowed to skip the "must be tracked" check on resize; release
//! gets no such exemption.

use std::collections::HashSet;

/// Allow-list of untracked addresses that `resize` accepts.
#[derive(Debug, Default)]
pub struct ExemptList {
    addresses: HashSet<usize>,
}

impl ExemptList {
    /// Allow `address` to be resized while untracked.
    pub fn insert(&mut self, address: usize) -> bool {
        self.addresses.insert(address)
    }

    /// Withdraw the exemption.
    pub fn remove(&mut self, address: usize) -> bool {
        self.addresses.remove(&address)
    }

    /// Is `address` exempt?
    pub fn contains(&self, address: usize) -> bool {
        self.addresses.contains(&address)
    }

    /// Carry the exemption over after a resize moved the block.
    pub fn follow(&mut self, old_address: usize, new_address: usize) {
        if self.addresses.remove(&old_address) {
            self.addresses.insert(new_address);
        }
    }

    /// Number of exempt addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// True when nothing is exempt.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
