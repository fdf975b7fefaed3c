//! Core mailbox types
//!
//! Identifiers, table sizing limits and the read-only info structs handed
//! out for introspection. All types here are pure data.

use serde::{Deserialize, Serialize};

/// Index of a slot in the global slot pool
pub type SlotIndex = usize;

/// Default number of mailbox descriptors
pub const MAX_MAILBOXES: usize = 2000;

/// Default number of message slots shared by all mailboxes
pub const MAX_SLOTS: usize = 2500;

/// Default number of blocked-process records
pub const MAX_PROCS: usize = 50;

/// Default largest message a mailbox may be created for, in bytes
pub const MAX_MESSAGE: usize = 150;

/// Process identifier, as handed out by the scheduler
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u64);

/// Mailbox identifier (index into the mailbox table)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub u32);

impl MailboxId {
    /// Table index of this mailbox
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Convert a raw status-code style id, rejecting negatives
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(MailboxId)
    }
}

/// Mailbox descriptor state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxStatus {
    /// Descriptor is unused and may be handed out by `create`
    Free,
    /// Descriptor is in use
    Active,
}

/// Whether an operation may suspend the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Queue the caller and report that it must block
    Blocking,
    /// Return `WouldBlock` instead of queueing the caller
    NonBlocking,
}

/// Static sizing of the three stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Number of mailbox descriptors
    pub max_mailboxes: usize,
    /// Number of slots in the global pool
    pub max_slots: usize,
    /// Number of blocked-process records
    pub max_procs: usize,
    /// Largest message size any mailbox may accept
    pub max_message: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_mailboxes: MAX_MAILBOXES,
            max_slots: MAX_SLOTS,
            max_procs: MAX_PROCS,
            max_message: MAX_MESSAGE,
        }
    }
}

/// Per-mailbox counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMetrics {
    /// Messages accepted by this mailbox (direct or buffered)
    pub total_sent: u64,
    /// Messages handed to receivers
    pub total_received: u64,
    /// Bytes handed to receivers
    pub total_bytes: u64,
    /// High water mark of the pending queue
    pub queue_high_water: usize,
}

/// Snapshot of one mailbox for introspection
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxInfo {
    /// Mailbox ID
    pub id: MailboxId,
    /// Maximum number of queued messages
    pub capacity: usize,
    /// Maximum message size
    pub max_message: usize,
    /// Messages currently queued
    pub queued: usize,
    /// Processes blocked sending
    pub blocked_senders: usize,
    /// Processes blocked receiving
    pub blocked_receivers: usize,
    /// Allocated at boot for a device
    pub reserved: bool,
    /// Counters
    pub metrics: MailboxMetrics,
}

/// System-wide mailbox metrics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Active mailbox count
    pub active_mailboxes: usize,
    /// Slots currently holding a message
    pub used_slots: usize,
    /// Slots available in the pool
    pub free_slots: usize,
    /// Processes currently queued on any mailbox
    pub blocked_processes: usize,
    /// Messages accepted since boot
    pub total_sent: u64,
    /// Messages delivered since boot
    pub total_received: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_id_from_raw() {
        assert_eq!(MailboxId::from_raw(7), Some(MailboxId(7)));
        assert_eq!(MailboxId::from_raw(0), Some(MailboxId(0)));
        assert_eq!(MailboxId::from_raw(-1), None);
    }

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_mailboxes, 2000);
        assert_eq!(limits.max_slots, 2500);
        assert_eq!(limits.max_procs, 50);
        assert_eq!(limits.max_message, 150);
    }
}
