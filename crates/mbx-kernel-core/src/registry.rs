//! Blocked-process registry
//!
//! One record per live process, indexed by pid modulo the registry size.
//! A record captures what a suspended process is waiting for: the message a
//! blocked sender still has to hand over, or the buffer capacity of a blocked
//! receiver and the message later delivered into it.

use alloc::vec::Vec;

use crate::error::MailError;
use crate::types::{MailboxId, ProcessId};

/// What the process is doing with its record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Not in a mailbox operation
    Idle,
    /// Queued on a mailbox's blocked-sender list
    Sender,
    /// Queued on a mailbox's blocked-receiver list
    Receiver,
}

/// Why (or whether) a blocked process may resume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitState {
    /// Not waiting
    Idle,
    /// Queued on the given mailbox
    Waiting(MailboxId),
    /// A matching operation finished the transfer
    Completed,
    /// The mailbox was released while waiting
    Released,
}

/// One blocked-process record
#[derive(Clone, Debug)]
pub struct ProcRecord {
    /// Process owning this record (None = never used or reset)
    pub pid: Option<ProcessId>,
    /// Current role
    pub role: Role,
    /// Wait progress
    pub state: WaitState,
    /// Receive buffer capacity of a blocked receiver
    pub max_len: usize,
    /// Outgoing message of a blocked sender, or delivered message of a receiver
    pub payload: Vec<u8>,
}

impl ProcRecord {
    fn empty() -> Self {
        Self {
            pid: None,
            role: Role::Idle,
            state: WaitState::Idle,
            max_len: 0,
            payload: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.pid = None;
        self.role = Role::Idle;
        self.state = WaitState::Idle;
        self.max_len = 0;
        self.payload.clear();
    }

    /// True while the record has an outcome its owner has not consumed
    pub fn is_busy(&self) -> bool {
        !matches!(self.state, WaitState::Idle)
    }
}

/// Arena of records indexed by pid modulo capacity
pub struct ProcRegistry {
    records: Vec<ProcRecord>,
}

impl ProcRegistry {
    /// Create a registry with `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: (0..capacity).map(|_| ProcRecord::empty()).collect(),
        }
    }

    /// Number of records
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    fn index(&self, pid: ProcessId) -> usize {
        (pid.0 % self.records.len() as u64) as usize
    }

    /// Reset the record for `pid` and bind it to that pid.
    ///
    /// Fails if the record is bound to another pid that has not yet consumed
    /// its wait outcome.
    pub fn claim(&mut self, pid: ProcessId) -> Result<&mut ProcRecord, MailError> {
        if self.records.is_empty() {
            return Err(MailError::InvalidArgument);
        }
        let index = self.index(pid);
        let record = &mut self.records[index];
        if let Some(holder) = record.pid {
            if holder != pid && record.is_busy() {
                return Err(MailError::RecordInUse { holder: holder.0 });
            }
        }
        record.reset();
        record.pid = Some(pid);
        Ok(record)
    }

    /// Get the record bound to `pid`
    pub fn get(&self, pid: ProcessId) -> Option<&ProcRecord> {
        if self.records.is_empty() {
            return None;
        }
        self.records
            .get(self.index(pid))
            .filter(|r| r.pid == Some(pid))
    }

    /// Get the record bound to `pid` mutably
    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut ProcRecord> {
        if self.records.is_empty() {
            return None;
        }
        let index = self.index(pid);
        self.records
            .get_mut(index)
            .filter(|r| r.pid == Some(pid))
    }

    /// Clear the record bound to `pid`, if any.
    pub fn reset(&mut self, pid: ProcessId) {
        if let Some(record) = self.get_mut(pid) {
            record.reset();
        }
    }

    /// Iterate over bound records
    pub fn iter(&self) -> impl Iterator<Item = &ProcRecord> {
        self.records.iter().filter(|r| r.pid.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_binds_record() {
        let mut reg = ProcRegistry::new(4);
        let rec = reg.claim(ProcessId(6)).unwrap();
        rec.role = Role::Receiver;
        assert_eq!(reg.get(ProcessId(6)).unwrap().role, Role::Receiver);
        assert!(reg.get(ProcessId(2)).is_none());
    }

    #[test]
    fn test_claim_resets_previous_use() {
        let mut reg = ProcRegistry::new(4);
        {
            let rec = reg.claim(ProcessId(1)).unwrap();
            rec.payload.extend_from_slice(b"stale");
            rec.state = WaitState::Completed;
        }
        let rec = reg.claim(ProcessId(1)).unwrap();
        assert!(rec.payload.is_empty());
        assert_eq!(rec.state, WaitState::Idle);
    }

    #[test]
    fn test_claim_rejects_collision_with_waiting_process() {
        let mut reg = ProcRegistry::new(4);
        reg.claim(ProcessId(1)).unwrap().state = WaitState::Waiting(MailboxId(9));

        // pid 5 maps onto the same record
        let err = reg.claim(ProcessId(5)).unwrap_err();
        assert_eq!(err, MailError::RecordInUse { holder: 1 });
    }

    #[test]
    fn test_claim_reuses_idle_record_of_other_pid() {
        let mut reg = ProcRegistry::new(4);
        reg.claim(ProcessId(1)).unwrap();
        assert!(reg.claim(ProcessId(5)).is_ok());
        assert!(reg.get(ProcessId(1)).is_none());
    }

    #[test]
    fn test_reset_only_touches_bound_pid() {
        let mut reg = ProcRegistry::new(4);
        reg.claim(ProcessId(3)).unwrap().role = Role::Sender;
        reg.reset(ProcessId(7));
        assert_eq!(reg.get(ProcessId(3)).unwrap().role, Role::Sender);
        reg.reset(ProcessId(3));
        assert!(reg.get(ProcessId(3)).is_none());
    }
}
