//! Global slot pool
//!
//! A fixed arena of message buffers shared by every mailbox. Each slot's
//! buffer is allocated once at boot with room for the largest message, so
//! queuing a message never allocates.

use alloc::vec;
use alloc::vec::Vec;

use crate::types::{MailboxId, SlotIndex};

/// One message buffer
#[derive(Clone, Debug)]
pub struct Slot {
    /// Mailbox whose pending queue holds this slot (None = free)
    pub owner: Option<MailboxId>,
    /// Payload length
    pub len: usize,
    data: Vec<u8>,
}

impl Slot {
    fn new(max_message: usize) -> Self {
        Self {
            owner: None,
            len: 0,
            data: vec![0u8; max_message],
        }
    }

    /// Check if the slot holds a message
    pub fn is_occupied(&self) -> bool {
        self.owner.is_some()
    }

    /// The queued payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Fixed-capacity pool of slots
pub struct SlotPool {
    slots: Vec<Slot>,
    /// Free slot indices, lowest index on top
    free: Vec<SlotIndex>,
}

impl SlotPool {
    /// Create a pool of `count` slots, each able to hold `max_message` bytes.
    pub fn new(count: usize, max_message: usize) -> Self {
        Self {
            slots: (0..count).map(|_| Slot::new(max_message)).collect(),
            free: (0..count).rev().collect(),
        }
    }

    /// Total number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of occupied slots
    pub fn used_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Take a free slot and fill it. Returns None when the pool is empty.
    ///
    /// `payload` must fit the slot buffer; mailbox validation guarantees it.
    pub fn alloc(&mut self, owner: MailboxId, payload: &[u8]) -> Option<SlotIndex> {
        let index = self.free.pop()?;
        self.store(index, owner, payload);
        Some(index)
    }

    /// Overwrite an occupied slot in place, keeping it out of the free list.
    pub fn store(&mut self, index: SlotIndex, owner: MailboxId, payload: &[u8]) {
        let slot = &mut self.slots[index];
        slot.data[..payload.len()].copy_from_slice(payload);
        slot.len = payload.len();
        slot.owner = Some(owner);
    }

    /// Return a slot to the pool.
    pub fn release(&mut self, index: SlotIndex) {
        let slot = &mut self.slots[index];
        if slot.owner.take().is_some() {
            slot.len = 0;
            self.free.push(index);
        }
    }

    /// Get a slot
    pub fn get(&self, index: SlotIndex) -> Option<&Slot> {
        self.slots.get(index)
    }

    /// Iterate over all slots with their indices
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &Slot)> {
        self.slots.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_takes_lowest_free_slot() {
        let mut pool = SlotPool::new(3, 8);
        assert_eq!(pool.alloc(MailboxId(1), b"a"), Some(0));
        assert_eq!(pool.alloc(MailboxId(1), b"b"), Some(1));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.used_count(), 2);
    }

    #[test]
    fn test_alloc_fails_when_exhausted() {
        let mut pool = SlotPool::new(1, 8);
        assert!(pool.alloc(MailboxId(1), b"x").is_some());
        assert!(pool.alloc(MailboxId(1), b"y").is_none());
    }

    #[test]
    fn test_release_returns_slot() {
        let mut pool = SlotPool::new(2, 8);
        let idx = pool.alloc(MailboxId(4), b"hello").unwrap();
        assert_eq!(pool.get(idx).unwrap().payload(), b"hello");
        assert_eq!(pool.get(idx).unwrap().owner, Some(MailboxId(4)));

        pool.release(idx);
        assert_eq!(pool.free_count(), 2);
        assert!(!pool.get(idx).unwrap().is_occupied());

        // Double release is a no-op
        pool.release(idx);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_store_overwrites_in_place() {
        let mut pool = SlotPool::new(2, 8);
        let idx = pool.alloc(MailboxId(1), b"first").unwrap();
        pool.store(idx, MailboxId(1), b"2nd");
        assert_eq!(pool.get(idx).unwrap().payload(), b"2nd");
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_zero_length_payload() {
        let mut pool = SlotPool::new(1, 0);
        let idx = pool.alloc(MailboxId(0), &[]).unwrap();
        assert!(pool.get(idx).unwrap().is_occupied());
        assert!(pool.get(idx).unwrap().payload().is_empty());
    }
}
