//! Mailbox event log (MailLog)
//!
//! Audit trail of mailbox activity: creations, transfers, suspensions,
//! teardowns, failures and device postings. Events are append-only with
//! monotonic IDs; once the log reaches its capacity the oldest entries are
//! dropped.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Monotonic event identifier
pub type EventId = u64;

/// Mailbox operation named in an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailOp {
    /// blocking send
    Send,
    /// blocking receive
    Receive,
    /// conditional send
    CondSend,
    /// conditional receive
    CondReceive,
    /// release
    Release,
    /// device wait
    WaitDevice,
}

/// A mailbox event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailEvent {
    /// Unique event ID (monotonic)
    pub id: EventId,
    /// Process that issued the operation (0 = interrupt context)
    pub pid: u64,
    /// Timestamp (nanos since boot)
    pub timestamp: u64,
    /// What happened
    pub kind: MailEventKind,
}

/// Type of mailbox event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailEventKind {
    /// A mailbox was activated
    Created {
        /// Mailbox ID
        mailbox: u32,
        /// Buffer capacity
        capacity: usize,
        /// Message size limit
        max_message: usize,
        /// Device mailbox allocated at boot
        reserved: bool,
    },
    /// A message was accepted (direct, buffered or after blocking)
    Sent {
        /// Mailbox ID
        mailbox: u32,
        /// Message length
        len: usize,
    },
    /// A message was delivered to the caller
    Received {
        /// Mailbox ID
        mailbox: u32,
        /// Message length
        len: usize,
    },
    /// The caller was suspended
    Blocked {
        /// Mailbox ID
        mailbox: u32,
        /// Operation that blocked
        op: MailOp,
    },
    /// A mailbox was torn down
    Released {
        /// Mailbox ID
        mailbox: u32,
        /// Processes woken by the teardown
        woken: usize,
    },
    /// A create request was refused
    CreateFailed {
        /// Requested buffer capacity
        capacity: usize,
        /// Requested message size limit
        max_message: usize,
        /// Status code returned
        code: i32,
    },
    /// An operation on an existing mailbox failed
    Failed {
        /// Mailbox ID
        mailbox: u32,
        /// Operation that failed
        op: MailOp,
        /// Status code returned
        code: i32,
    },
    /// An interrupt handler posted a device status
    DevicePosted {
        /// Raw device type
        device: i32,
        /// Device unit
        unit: usize,
        /// Status word
        status: i32,
        /// Whether the conditional send succeeded
        delivered: bool,
    },
}

/// Mailbox event log for auditing.
pub struct MailLog {
    /// Event entries, oldest first
    events: VecDeque<MailEvent>,
    /// Next event ID to assign
    next_id: EventId,
    /// Events kept before trimming
    capacity: usize,
}

impl MailLog {
    /// Create an empty log keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Append an event and return its ID.
    pub fn log(&mut self, pid: u64, timestamp: u64, kind: MailEventKind) -> EventId {
        let id = self.next_id;
        self.next_id += 1;

        self.events.push_back(MailEvent {
            id,
            pid,
            timestamp,
            kind,
        });

        self.trim_if_needed();
        id
    }

    /// Iterate over retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &MailEvent> {
        self.events.iter()
    }

    /// Get the most recent N events, newest first.
    pub fn get_recent(&self, count: usize) -> Vec<&MailEvent> {
        self.events.iter().rev().take(count).collect()
    }

    /// Get the number of retained events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get the next event ID.
    pub fn next_id(&self) -> EventId {
        self.next_id
    }

    /// Serialize the retained events as a JSON array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.events)
    }

    fn trim_if_needed(&mut self) {
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(mailbox: u32) -> MailEventKind {
        MailEventKind::Sent { mailbox, len: 1 }
    }

    #[test]
    fn test_maillog_creation() {
        let log = MailLog::new(10);
        assert!(log.is_empty());
        assert_eq!(log.next_id(), 0);
    }

    #[test]
    fn test_maillog_ids_are_monotonic() {
        let mut log = MailLog::new(10);
        assert_eq!(log.log(1, 100, sent(7)), 0);
        assert_eq!(log.log(2, 200, sent(7)), 1);
        assert_eq!(log.len(), 2);
        let first = log.events().next().unwrap();
        assert_eq!(first.pid, 1);
        assert_eq!(first.timestamp, 100);
    }

    #[test]
    fn test_maillog_trims_oldest() {
        let mut log = MailLog::new(3);
        for i in 0..5 {
            log.log(1, i, sent(i as u32));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.events().next().unwrap().id, 2);
        assert_eq!(log.next_id(), 5);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = MailLog::new(0);
        log.log(1, 0, sent(0));
        assert!(log.is_empty());
        assert_eq!(log.next_id(), 1);
    }

    #[test]
    fn test_maillog_get_recent() {
        let mut log = MailLog::new(100);
        for i in 0..10 {
            log.log(1, i * 100, sent(i as u32));
        }
        let recent = log.get_recent(3);
        assert_eq!(recent[0].id, 9);
        assert_eq!(recent[2].id, 7);
        assert_eq!(log.get_recent(50).len(), 10);
    }

    #[test]
    fn test_maillog_json_export() {
        let mut log = MailLog::new(10);
        log.log(
            3,
            50,
            MailEventKind::Failed {
                mailbox: 9,
                op: MailOp::CondSend,
                code: -2,
            },
        );
        let json = log.to_json().unwrap();
        let back: Vec<MailEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].kind, log.events().next().unwrap().kind);
    }
}
