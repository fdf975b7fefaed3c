//! Mailbox state - the mailbox table plus the two stores it draws on
//!
//! `MailState` owns the mailbox table, the global slot pool and the
//! blocked-process registry. It has NO HAL dependency; the runtime wrapper
//! (`mbx-kernel`) guards it with the critical section and turns the wake
//! lists produced by `step` into scheduler calls.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::registry::ProcRegistry;
use crate::slots::SlotPool;
use crate::types::{
    Limits, MailboxId, MailboxInfo, MailboxMetrics, MailboxStatus, ProcessId, SlotIndex,
    SystemMetrics,
};

/// A mailbox descriptor
#[derive(Clone, Debug)]
pub struct Mailbox {
    /// Mailbox ID (fixed table position)
    pub id: MailboxId,
    /// Free or Active
    pub status: MailboxStatus,
    /// Maximum number of queued messages (0 = rendezvous only)
    pub capacity: usize,
    /// Maximum message size
    pub max_message: usize,
    /// Pending messages, oldest first
    pub pending: VecDeque<SlotIndex>,
    /// Blocked senders, longest waiting first
    pub blocked_senders: VecDeque<ProcessId>,
    /// Blocked receivers, longest waiting first
    pub blocked_receivers: VecDeque<ProcessId>,
    /// Allocated at boot for a device
    pub reserved: bool,
    /// Counters
    pub metrics: MailboxMetrics,
}

impl Mailbox {
    fn free(id: MailboxId) -> Self {
        Self {
            id,
            status: MailboxStatus::Free,
            capacity: 0,
            max_message: 0,
            pending: VecDeque::new(),
            blocked_senders: VecDeque::new(),
            blocked_receivers: VecDeque::new(),
            reserved: false,
            metrics: MailboxMetrics::default(),
        }
    }

    /// Check if the descriptor is in use
    pub fn is_active(&self) -> bool {
        self.status == MailboxStatus::Active
    }

    /// Messages currently queued
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Check if another message may be buffered
    pub fn has_room(&self) -> bool {
        self.pending.len() < self.capacity
    }

    /// Check if any process is queued on this mailbox
    pub fn has_blocked(&self) -> bool {
        !self.blocked_senders.is_empty() || !self.blocked_receivers.is_empty()
    }

    pub(crate) fn reset(&mut self) {
        let id = self.id;
        *self = Mailbox::free(id);
    }

    pub(crate) fn note_enqueued(&mut self) {
        self.metrics.total_sent += 1;
        if self.pending.len() > self.metrics.queue_high_water {
            self.metrics.queue_high_water = self.pending.len();
        }
    }

    pub(crate) fn note_delivered(&mut self, len: usize) {
        self.metrics.total_received += 1;
        self.metrics.total_bytes += len as u64;
    }

    fn info(&self) -> MailboxInfo {
        MailboxInfo {
            id: self.id,
            capacity: self.capacity,
            max_message: self.max_message,
            queued: self.pending.len(),
            blocked_senders: self.blocked_senders.len(),
            blocked_receivers: self.blocked_receivers.len(),
            reserved: self.reserved,
            metrics: self.metrics.clone(),
        }
    }
}

/// All mailbox state - no HAL, no I/O, no side effects.
///
/// All transfers are done via the `step_*` functions.
pub struct MailState {
    /// Mailbox table
    pub mailboxes: Vec<Mailbox>,
    /// Global slot pool
    pub slots: SlotPool,
    /// Blocked-process registry
    pub registry: ProcRegistry,
    /// Table sizing
    pub limits: Limits,
    /// Ids below this were allocated at boot for devices
    pub reserved: usize,
    /// Messages accepted since boot
    pub total_sent: u64,
    /// Messages delivered since boot
    pub total_received: u64,
}

impl MailState {
    /// Create empty state sized by `limits`.
    pub fn new(limits: Limits) -> Self {
        Self {
            mailboxes: (0..limits.max_mailboxes)
                .map(|i| Mailbox::free(MailboxId(i as u32)))
                .collect(),
            slots: SlotPool::new(limits.max_slots, limits.max_message),
            registry: ProcRegistry::new(limits.max_procs),
            limits,
            reserved: 0,
            total_sent: 0,
            total_received: 0,
        }
    }

    // ========================================================================
    // Read-only accessors
    // ========================================================================

    /// Get a mailbox descriptor (Free or Active)
    pub fn get_mailbox(&self, id: MailboxId) -> Option<&Mailbox> {
        self.mailboxes.get(id.index())
    }

    /// Get an Active mailbox
    pub fn get_active(&self, id: MailboxId) -> Option<&Mailbox> {
        self.get_mailbox(id).filter(|m| m.is_active())
    }

    /// Get an Active mailbox mutably
    pub fn get_active_mut(&mut self, id: MailboxId) -> Option<&mut Mailbox> {
        self.mailboxes.get_mut(id.index()).filter(|m| m.is_active())
    }

    /// Snapshot of one active mailbox
    pub fn mailbox_info(&self, id: MailboxId) -> Option<MailboxInfo> {
        self.get_active(id).map(Mailbox::info)
    }

    /// Snapshot of every active mailbox
    pub fn list_mailboxes(&self) -> Vec<MailboxInfo> {
        self.mailboxes
            .iter()
            .filter(|m| m.is_active())
            .map(Mailbox::info)
            .collect()
    }

    /// Check if any receiver is blocked on `id`
    pub fn has_blocked_receivers(&self, id: MailboxId) -> bool {
        self.get_active(id)
            .map(|m| !m.blocked_receivers.is_empty())
            .unwrap_or(false)
    }

    /// Number of processes queued on any mailbox
    pub fn blocked_processes(&self) -> usize {
        self.mailboxes
            .iter()
            .map(|m| m.blocked_senders.len() + m.blocked_receivers.len())
            .sum()
    }

    /// Get system-wide metrics
    pub fn get_system_metrics(&self) -> SystemMetrics {
        SystemMetrics {
            active_mailboxes: self.mailboxes.iter().filter(|m| m.is_active()).count(),
            used_slots: self.slots.used_count(),
            free_slots: self.slots.free_count(),
            blocked_processes: self.blocked_processes(),
            total_sent: self.total_sent,
            total_received: self.total_received,
        }
    }

    // ========================================================================
    // State mutation helpers (pure - no side effects)
    // ========================================================================

    /// Activate the first Free descriptor at or above `from`.
    pub(crate) fn activate_free(
        &mut self,
        from: usize,
        capacity: usize,
        max_message: usize,
    ) -> Option<MailboxId> {
        let mailbox = self
            .mailboxes
            .iter_mut()
            .skip(from)
            .find(|m| m.status == MailboxStatus::Free)?;
        mailbox.status = MailboxStatus::Active;
        mailbox.capacity = capacity;
        mailbox.max_message = max_message;
        Some(mailbox.id)
    }

    /// Return every pending slot of `id` to the pool and reset the descriptor.
    pub(crate) fn reset_mailbox(&mut self, id: MailboxId) {
        if let Some(mailbox) = self.mailboxes.get_mut(id.index()) {
            for slot in mailbox.pending.drain(..) {
                self.slots.release(slot);
            }
            mailbox.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Limits {
        Limits {
            max_mailboxes: 4,
            max_slots: 4,
            max_procs: 4,
            max_message: 16,
        }
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = MailState::new(small());
        assert_eq!(state.mailboxes.len(), 4);
        assert!(state.list_mailboxes().is_empty());
        let metrics = state.get_system_metrics();
        assert_eq!(metrics.active_mailboxes, 0);
        assert_eq!(metrics.free_slots, 4);
        assert_eq!(metrics.blocked_processes, 0);
    }

    #[test]
    fn test_activate_free_skips_below_threshold() {
        let mut state = MailState::new(small());
        let id = state.activate_free(2, 1, 8).unwrap();
        assert_eq!(id, MailboxId(2));
        assert!(state.get_active(MailboxId(0)).is_none());
        assert_eq!(state.get_active(id).unwrap().capacity, 1);
    }

    #[test]
    fn test_reset_mailbox_returns_slots() {
        let mut state = MailState::new(small());
        let id = state.activate_free(0, 2, 8).unwrap();
        let slot = state.slots.alloc(id, b"abc").unwrap();
        state.get_active_mut(id).unwrap().pending.push_back(slot);
        assert_eq!(state.slots.free_count(), 3);

        state.reset_mailbox(id);
        assert_eq!(state.slots.free_count(), 4);
        assert!(state.get_active(id).is_none());
    }
}
