//! Mailbox Kernel
//!
//! This crate wraps the pure state machine of `mbx-kernel-core` with
//! everything that needs the platform:
//! - Critical section (interrupts masked + one coarse lock)
//! - Suspension, wakeup and cancellation through the HAL
//! - Reserved device mailboxes, interrupt handlers and the syscall vector
//! - Status-code ABI
//! - Boot configuration and the MailLog audit trail

#![no_std]
extern crate alloc;

pub mod config;
pub mod devices;
pub mod kernel;
pub mod syscall;
pub mod syslog;

pub use config::{ConfigError, KernelConfig};
pub use devices::{DeviceMap, DEVICE_MESSAGE_SIZE};
pub use kernel::{Kernel, HALT_CODE};
pub use syscall::{nullsys, SyscallHandler};
pub use syslog::{EventId, MailEvent, MailEventKind, MailLog, MailOp};

// Re-export HAL and core types
pub use mbx_hal::{BlockReason, DeviceKind, HalError, HAL};
pub use mbx_kernel_core::{
    InvariantViolation, MailError, MailboxId, MailboxInfo, MailboxMetrics, ProcessId,
    SystemMetrics, STATUS_ABORTED, STATUS_INVALID, STATUS_WOULD_BLOCK,
};
