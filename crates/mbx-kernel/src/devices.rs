//! Device-notification bridge
//!
//! One reserved mailbox per interrupt source, allocated at boot in the order
//! clock, disks, terminals (ids 0, 1.., then the terminals). Interrupt
//! handlers read the unit's status register and post it with a conditional
//! send, so an interrupt never blocks; a status nobody is ready to take is
//! dropped. Processes collect statuses with `wait_device`.
//!
//! The syscall trap has no mailbox; its handler dispatches through the
//! syscall vector instead.

use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use mbx_hal::{DeviceKind, HAL};
use mbx_kernel_core::{MailError, MailboxId, ProcessId, Wait};

use crate::kernel::Kernel;
use crate::syslog::{MailEventKind, MailOp};

/// Size of a device status message (little-endian `i32`)
pub const DEVICE_MESSAGE_SIZE: usize = core::mem::size_of::<i32>();

/// Reserved mailbox of every device unit
#[derive(Clone, Debug)]
pub struct DeviceMap {
    clock: MailboxId,
    disks: Vec<MailboxId>,
    terms: Vec<MailboxId>,
}

impl DeviceMap {
    pub(crate) fn new(clock: MailboxId, disks: Vec<MailboxId>, terms: Vec<MailboxId>) -> Self {
        Self {
            clock,
            disks,
            terms,
        }
    }

    /// Mailbox of a device unit, if the unit exists
    pub fn mailbox(&self, kind: DeviceKind, unit: usize) -> Option<MailboxId> {
        match kind {
            DeviceKind::Clock if unit == 0 => Some(self.clock),
            DeviceKind::Clock => None,
            DeviceKind::Disk => self.disks.get(unit).copied(),
            DeviceKind::Terminal => self.terms.get(unit).copied(),
            DeviceKind::Syscall => None,
        }
    }

    /// Every device mailbox
    pub fn iter(&self) -> impl Iterator<Item = MailboxId> + '_ {
        core::iter::once(self.clock)
            .chain(self.disks.iter().copied())
            .chain(self.terms.iter().copied())
    }
}

impl<H: HAL> Kernel<H> {
    /// Reserved device mailboxes
    pub fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    // ========================================================================
    // Interrupt handlers
    // ========================================================================

    /// Clock interrupt. Posts the clock status every
    /// `clock_ticks_per_event` ticks and ends the running time slice.
    pub fn clock_handler(&self, dev: i32, unit: i32) {
        let unit = self.check_handler("clock_handler", DeviceKind::Clock, dev, unit);
        let divider = self.config().clock_ticks_per_event;
        let seen = self
            .clock_ticks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(if t + 1 >= divider { 0 } else { t + 1 })
            })
            .unwrap_or_else(|t| t);
        if seen + 1 >= divider {
            self.post_status(DeviceKind::Clock, unit);
        }
        self.hal().time_slice();
    }

    /// Disk interrupt
    pub fn disk_handler(&self, dev: i32, unit: i32) {
        let unit = self.check_handler("disk_handler", DeviceKind::Disk, dev, unit);
        self.post_status(DeviceKind::Disk, unit);
    }

    /// Terminal interrupt
    pub fn term_handler(&self, dev: i32, unit: i32) {
        let unit = self.check_handler("term_handler", DeviceKind::Terminal, dev, unit);
        self.post_status(DeviceKind::Terminal, unit);
    }

    /// Syscall trap. The unit is the syscall number; the installed handler
    /// runs, and an empty entry halts the system.
    pub fn syscall_handler(&self, dev: i32, unit: i32) {
        self.ensure_kernel_mode("syscall_handler");
        if DeviceKind::from_raw(dev) != Some(DeviceKind::Syscall) {
            self.fatal(format_args!(
                "syscall_handler: called by wrong device type {}",
                dev
            ));
        }
        let handler = usize::try_from(unit)
            .ok()
            .and_then(|n| self.syscalls.lock().get(n).map(|h| (n, *h)));
        let Some((number, handler)) = handler else {
            self.fatal(format_args!("syscall_handler: invalid syscall number {}", unit))
        };
        self.trace(format_args!("syscall {}", number));
        handler(self, number);
    }

    /// Validate handler arguments, halting on a mismatch. Returns the unit.
    fn check_handler(&self, name: &str, expected: DeviceKind, dev: i32, unit: i32) -> usize {
        self.ensure_kernel_mode(name);
        if DeviceKind::from_raw(dev) != Some(expected) {
            self.fatal(format_args!("{}: called by wrong device type {}", name, dev));
        }
        match usize::try_from(unit)
            .ok()
            .filter(|u| self.devices.mailbox(expected, *u).is_some())
        {
            Some(unit) => unit,
            None => self.fatal(format_args!("{}: invalid {} unit {}", name, expected, unit)),
        }
    }

    /// Read a unit's status and offer it to its mailbox without blocking.
    fn post_status(&self, kind: DeviceKind, unit: usize) {
        let Some(id) = self.devices.mailbox(kind, unit) else {
            return;
        };
        let status = match self.hal().device_input(kind, unit) {
            Ok(status) => status,
            Err(e) => {
                self.hal().debug_write(&alloc::format!(
                    "[mbx] {} unit {}: status read failed: {}",
                    kind,
                    unit,
                    e
                ));
                return;
            }
        };

        let delivered = self
            .send_inner(id, &status.to_le_bytes(), Wait::NonBlocking)
            .is_ok();
        if !delivered {
            self.trace(format_args!(
                "{} unit {}: status {} dropped, nobody waiting",
                kind, unit, status
            ));
        }
        self.record(
            ProcessId(self.hal().current_pid()),
            MailEventKind::DevicePosted {
                device: kind.raw(),
                unit,
                status,
                delivered,
            },
        );
    }

    // ========================================================================
    // Process side
    // ========================================================================

    /// Block until the next status from a device unit arrives.
    ///
    /// A teardown of the device mailbox or cancellation of the caller gives
    /// `WaitAborted`; an unknown unit gives `InvalidArgument`.
    pub fn wait_device(&self, kind: DeviceKind, unit: usize) -> Result<i32, MailError> {
        self.ensure_kernel_mode("wait_device");
        let Some(id) = self.devices.mailbox(kind, unit) else {
            return Err(MailError::InvalidArgument);
        };

        let mut buf = [0u8; DEVICE_MESSAGE_SIZE];
        match self.receive_inner(id, &mut buf, Wait::Blocking) {
            Ok(_) => Ok(i32::from_le_bytes(buf)),
            Err(e) if e.is_abort() => {
                self.trace(format_args!("wait_device: {} unit {} aborted", kind, unit));
                self.record(
                    ProcessId(self.hal().current_pid()),
                    MailEventKind::Failed {
                        mailbox: id.0,
                        op: MailOp::WaitDevice,
                        code: MailError::WaitAborted.code(),
                    },
                );
                Err(MailError::WaitAborted)
            }
            Err(e) => Err(e),
        }
    }

    /// True when any process is blocked on a device mailbox.
    pub fn check_io(&self) -> bool {
        self.with_state(|st| self.devices.iter().any(|id| st.has_blocked_receivers(id)))
    }
}
