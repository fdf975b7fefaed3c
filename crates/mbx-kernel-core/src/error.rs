//! Mailbox error taxonomy and the stable status codes it maps to.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Status code for invalid arguments and lookup failures
pub const STATUS_INVALID: i32 = -1;

/// Status code for a conditional operation that could not proceed
pub const STATUS_WOULD_BLOCK: i32 = -2;

/// Status code for a wait that ended by teardown or cancellation
pub const STATUS_ABORTED: i32 = -3;

/// Errors returned by mailbox operations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailError {
    /// Bad mailbox id, oversized message, buffer too small, malformed sizing
    InvalidArgument,
    /// Every mailbox descriptor is in use
    NoFreeMailbox,
    /// A conditional operation would have had to suspend
    WouldBlock,
    /// The global slot pool has no free slot
    SlotPoolExhausted,
    /// The mailbox was released while the caller was waiting on it
    MailboxReleased,
    /// The caller was cancelled
    Cancelled,
    /// A device wait ended without a status (teardown or cancellation)
    WaitAborted,
    /// The registry record for this pid belongs to another blocked process
    RecordInUse {
        /// pid currently holding the record
        holder: u64,
    },
}

impl MailError {
    /// Stable status code for the `i32` ABI.
    pub fn code(self) -> i32 {
        match self {
            MailError::InvalidArgument
            | MailError::NoFreeMailbox
            | MailError::WaitAborted
            | MailError::RecordInUse { .. } => STATUS_INVALID,
            MailError::WouldBlock | MailError::SlotPoolExhausted => STATUS_WOULD_BLOCK,
            MailError::MailboxReleased | MailError::Cancelled => STATUS_ABORTED,
        }
    }

    /// True for outcomes that end a wait rather than reject a request
    pub fn is_abort(self) -> bool {
        matches!(self, MailError::MailboxReleased | MailError::Cancelled)
    }
}

impl fmt::Display for MailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailError::InvalidArgument => write!(f, "Invalid argument"),
            MailError::NoFreeMailbox => write!(f, "No free mailbox"),
            MailError::WouldBlock => write!(f, "Operation would block"),
            MailError::SlotPoolExhausted => write!(f, "No slots in system"),
            MailError::MailboxReleased => write!(f, "Mailbox released"),
            MailError::Cancelled => write!(f, "Process cancelled"),
            MailError::WaitAborted => write!(f, "Device wait aborted"),
            MailError::RecordInUse { holder } => {
                write!(f, "Process record in use by pid {}", holder)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MailError::InvalidArgument.code(), -1);
        assert_eq!(MailError::NoFreeMailbox.code(), -1);
        assert_eq!(MailError::WouldBlock.code(), -2);
        assert_eq!(MailError::SlotPoolExhausted.code(), -2);
        assert_eq!(MailError::MailboxReleased.code(), -3);
        assert_eq!(MailError::Cancelled.code(), -3);
    }

    #[test]
    fn test_slot_exhaustion_is_distinct_from_would_block() {
        assert_ne!(MailError::SlotPoolExhausted, MailError::WouldBlock);
        assert_eq!(
            MailError::SlotPoolExhausted.code(),
            MailError::WouldBlock.code()
        );
    }

    #[test]
    fn test_is_abort() {
        assert!(MailError::MailboxReleased.is_abort());
        assert!(MailError::Cancelled.is_abort());
        assert!(!MailError::WouldBlock.is_abort());
    }
}
