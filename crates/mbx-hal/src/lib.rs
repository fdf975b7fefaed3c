//! Hardware Abstraction Layer trait for the mbx kernel
//!
//! The mailbox subsystem never schedules, masks interrupts or touches device
//! registers on its own. Everything it needs from the rest of the kernel is
//! behind the `HAL` trait:
//!
//! - **Scheduler**: current pid, block the caller, unblock a pid, time slice
//! - **Cancellation**: whether the caller has been zapped
//! - **CPU state**: kernel mode check, interrupt masking
//! - **Devices**: status register reads for clock, disk and terminal units
//! - **Debug**: console output, monotonic time, fatal halt

#![no_std]

use core::fmt;

/// Scheduler status recorded for a process suspended by the mailbox layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting to hand a message to a full or rendezvous mailbox
    Send,
    /// Waiting for a message to arrive
    Receive,
}

/// Interrupting device classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceKind {
    /// System clock (unit 0 only)
    Clock,
    /// Disk units
    Disk,
    /// Terminal units
    Terminal,
    /// Syscall trap; the unit is the syscall number and there is no status
    Syscall,
}

impl DeviceKind {
    /// Map the raw device type number used by interrupt vectors.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(DeviceKind::Clock),
            2 => Some(DeviceKind::Disk),
            3 => Some(DeviceKind::Terminal),
            5 => Some(DeviceKind::Syscall),
            _ => None,
        }
    }

    /// Raw device type number
    pub fn raw(self) -> i32 {
        match self {
            DeviceKind::Clock => 0,
            DeviceKind::Disk => 2,
            DeviceKind::Terminal => 3,
            DeviceKind::Syscall => 5,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Clock => write!(f, "clock"),
            DeviceKind::Disk => write!(f, "disk"),
            DeviceKind::Terminal => write!(f, "terminal"),
            DeviceKind::Syscall => write!(f, "syscall"),
        }
    }
}

/// Hardware Abstraction Layer trait
///
/// Implementations provide platform-specific functionality for:
/// - Process suspension and wakeup
/// - Interrupt masking
/// - Device status reads
/// - Time measurement
/// - Debug output
///
/// `block_me` must tolerate a wakeup that arrives before the caller has
/// actually suspended: the mailbox layer issues wakeups after leaving its
/// critical section, so an `unblock_proc` may race ahead of the matching
/// `block_me`.
pub trait HAL: Send + Sync + 'static {
    // === Scheduler ===

    /// Pid of the process executing the current kernel call
    fn current_pid(&self) -> u64;

    /// Suspend the calling process until `unblock_proc` names it
    fn block_me(&self, reason: BlockReason);

    /// Make a suspended process runnable again
    ///
    /// # Returns
    /// * `Ok(())` - Process will run
    /// * `Err(HalError::ProcessNotFound)` - No such process
    fn unblock_proc(&self, pid: u64) -> Result<(), HalError>;

    /// Whether the calling process has been marked for cancellation
    fn is_zapped(&self) -> bool;

    /// Hint that the running process has used up its quantum
    fn time_slice(&self) {}

    // === CPU state ===

    /// Whether the caller is executing in kernel mode
    fn in_kernel_mode(&self) -> bool {
        true
    }

    /// Mask interrupts on the (single) CPU
    fn disable_interrupts(&self) {}

    /// Unmask interrupts
    fn enable_interrupts(&self) {}

    // === Devices ===

    /// Read the status register of a device unit
    ///
    /// # Returns
    /// * `Ok(status)` - Current status word
    /// * `Err(HalError::InvalidArgument)` - No such unit
    fn device_input(&self, kind: DeviceKind, unit: usize) -> Result<i32, HalError>;

    // === Time & Debug ===

    /// Get current time in nanoseconds (monotonic)
    fn now_nanos(&self) -> u64;

    /// Write a debug message to the platform's console/log
    fn debug_write(&self, msg: &str);

    /// Stop the machine after an unrecoverable kernel error
    fn halt(&self, code: i32) -> !;
}

/// HAL error types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Process not found or already terminated
    ProcessNotFound,
    /// Invalid argument
    InvalidArgument,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::ProcessNotFound => write!(f, "Process not found"),
            HalError::InvalidArgument => write!(f, "Invalid argument"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_raw_mapping() {
        for kind in [
            DeviceKind::Clock,
            DeviceKind::Disk,
            DeviceKind::Terminal,
            DeviceKind::Syscall,
        ] {
            assert_eq!(DeviceKind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(DeviceKind::from_raw(1), None);
        assert_eq!(DeviceKind::from_raw(4), None);
        assert_eq!(DeviceKind::from_raw(-1), None);
    }
}
