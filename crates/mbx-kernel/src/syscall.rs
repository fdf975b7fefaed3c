//! Status-code ABI
//!
//! `i32` wrappers over the typed operations, for callers that speak the
//! classic status convention:
//!
//! | Code | Meaning |
//! |------|---------|
//! | >= 0 | success (id, length or 0) |
//! | -1   | invalid argument, no free mailbox, device wait aborted |
//! | -2   | conditional operation would block, or no free slot |
//! | -3   | mailbox released or caller cancelled |
//!
//! It also owns the syscall vector the trap handler dispatches through.
//! Entries start as `nullsys`; higher layers install their own with
//! `install_syscall`. Argument marshaling is the handler's business.

use mbx_hal::{DeviceKind, HAL};
use mbx_kernel_core::{MailError, MailboxId, STATUS_INVALID};

use crate::kernel::Kernel;

/// Entry of the syscall vector. Receives the syscall number.
pub type SyscallHandler<H> = fn(&Kernel<H>, usize);

/// Default vector entry: an invalid syscall halts the system.
pub fn nullsys<H: HAL>(kernel: &Kernel<H>, number: usize) {
    kernel.fatal(format_args!("nullsys: invalid syscall {}", number))
}

impl<H: HAL> Kernel<H> {
    /// Install `handler` as syscall `number`.
    pub fn install_syscall(
        &self,
        number: usize,
        handler: SyscallHandler<H>,
    ) -> Result<(), MailError> {
        self.ensure_kernel_mode("install_syscall");
        let mut vector = self.syscalls.lock();
        let slot = vector.get_mut(number).ok_or(MailError::InvalidArgument)?;
        *slot = handler;
        drop(vector);
        self.trace(format_args!("syscall {} installed", number));
        Ok(())
    }
}

/// Validate a size argument against the caller's buffer.
fn checked_len(size: i32, available: usize) -> Option<usize> {
    usize::try_from(size).ok().filter(|n| *n <= available)
}

fn status<T>(result: Result<T, MailError>, ok: impl FnOnce(T) -> i32) -> i32 {
    match result {
        Ok(v) => ok(v),
        Err(e) => e.code(),
    }
}

impl<H: HAL> Kernel<H> {
    /// Create a mailbox. Returns its id or -1.
    pub fn mbox_create(&self, slots: i32, slot_size: i32) -> i32 {
        let (Ok(slots), Ok(slot_size)) = (usize::try_from(slots), usize::try_from(slot_size))
        else {
            return STATUS_INVALID;
        };
        status(self.create(slots, slot_size), |id| id.0 as i32)
    }

    /// Send the first `size` bytes of `msg`. Returns 0, -1 or -3.
    pub fn mbox_send(&self, id: i32, msg: &[u8], size: i32) -> i32 {
        let (Some(id), Some(len)) = (MailboxId::from_raw(id), checked_len(size, msg.len())) else {
            return STATUS_INVALID;
        };
        status(self.send(id, &msg[..len]), |()| 0)
    }

    /// Conditionally send the first `size` bytes of `msg`. Returns 0, -1 or -2.
    pub fn mbox_cond_send(&self, id: i32, msg: &[u8], size: i32) -> i32 {
        let (Some(id), Some(len)) = (MailboxId::from_raw(id), checked_len(size, msg.len())) else {
            return STATUS_INVALID;
        };
        status(self.cond_send(id, &msg[..len]), |()| 0)
    }

    /// Receive into the first `max` bytes of `buf`. Returns the length, -1
    /// or -3.
    pub fn mbox_receive(&self, id: i32, buf: &mut [u8], max: i32) -> i32 {
        let (Some(id), Some(len)) = (MailboxId::from_raw(id), checked_len(max, buf.len())) else {
            return STATUS_INVALID;
        };
        status(self.receive(id, &mut buf[..len]), |n| n as i32)
    }

    /// Conditionally receive into the first `max` bytes of `buf`. Returns the
    /// length, -1 or -2.
    pub fn mbox_cond_receive(&self, id: i32, buf: &mut [u8], max: i32) -> i32 {
        let (Some(id), Some(len)) = (MailboxId::from_raw(id), checked_len(max, buf.len())) else {
            return STATUS_INVALID;
        };
        status(self.cond_receive(id, &mut buf[..len]), |n| n as i32)
    }

    /// Release a mailbox. Returns 0, -1 or -3.
    pub fn mbox_release(&self, id: i32) -> i32 {
        let Some(id) = MailboxId::from_raw(id) else {
            return STATUS_INVALID;
        };
        status(self.release(id), |()| 0)
    }

    /// Wait for a device status, stored in `out`. Returns 0 or -1.
    pub fn mbox_wait_device(&self, kind: i32, unit: i32, out: &mut i32) -> i32 {
        let (Some(kind), Ok(unit)) = (DeviceKind::from_raw(kind), usize::try_from(unit)) else {
            return STATUS_INVALID;
        };
        match self.wait_device(kind, unit) {
            Ok(value) => {
                *out = value;
                0
            }
            Err(_) => STATUS_INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_len() {
        assert_eq!(checked_len(3, 5), Some(3));
        assert_eq!(checked_len(5, 5), Some(5));
        assert_eq!(checked_len(6, 5), None);
        assert_eq!(checked_len(-1, 5), None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(Ok(7usize), |n| n as i32), 7);
        assert_eq!(status::<()>(Err(MailError::WouldBlock), |_| 0), -2);
        assert_eq!(status::<()>(Err(MailError::Cancelled), |_| 0), -3);
    }
}
