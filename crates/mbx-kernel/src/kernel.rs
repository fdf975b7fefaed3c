//! The mailbox kernel: critical section, suspension and cancellation around
//! the pure engine in `mbx-kernel-core`.
//!
//! Every operation follows the same shape:
//!
//! 1. Check the caller is in kernel mode (halt otherwise)
//! 2. Run one `step_*` inside the critical section
//! 3. Leave the critical section, then wake whoever the step released
//! 4. If the step queued the caller, suspend through the HAL and, on every
//!    resume, look at the registry record to learn how the wait ended

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::AtomicU32;
use spin::Mutex;

use mbx_hal::{BlockReason, HAL};
use mbx_kernel_core::{
    check_all_invariants, step_abandon, step_create, step_create_reserved, step_finish_receive,
    step_finish_send, step_receive, step_release, step_send, wait_status, InvariantViolation,
    MailError, MailState, MailboxId, MailboxInfo, ProcessId, ReceiveOutcome, SendOutcome,
    SystemMetrics, Wait, WaitStatus,
};

use crate::config::{ConfigError, KernelConfig};
use crate::devices::{DeviceMap, DEVICE_MESSAGE_SIZE};
use crate::syscall::{nullsys, SyscallHandler};
use crate::syslog::{MailEvent, MailEventKind, MailLog, MailOp};

/// Halt code for every fatal kernel condition
pub const HALT_CODE: i32 = 1;

/// The mailbox kernel, generic over HAL implementation.
///
/// Shared by every process; all mutable state sits behind the critical
/// section, so the methods take `&self`.
pub struct Kernel<H: HAL> {
    /// Platform services
    hal: H,
    /// Boot configuration
    config: KernelConfig,
    /// Mailbox table, slot pool and registry under one coarse lock
    state: Mutex<MailState>,
    /// Reserved device mailboxes
    pub(crate) devices: DeviceMap,
    /// Clock interrupts since the last posted clock status
    pub(crate) clock_ticks: AtomicU32,
    /// Syscall vector, indexed by syscall number
    pub(crate) syscalls: Mutex<Vec<SyscallHandler<H>>>,
    /// Audit trail
    log: Mutex<MailLog>,
    /// Boot time (for uptime and event timestamps)
    boot_time: u64,
}

impl<H: HAL> Kernel<H> {
    /// Initialise the stores and allocate the device mailboxes.
    pub fn boot(hal: H, config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let boot_time = hal.now_nanos();
        let mut state = MailState::new(config.limits());

        let capacity = config.device_mailbox_capacity;
        let mut reserve = || {
            step_create_reserved(&mut state, capacity, DEVICE_MESSAGE_SIZE).map_err(|_| {
                ConfigError::DevicesExceedTable {
                    needed: config.device_mailboxes(),
                    available: config.max_mailboxes,
                }
            })
        };
        let clock = reserve()?;
        let disks = (0..config.disk_units)
            .map(|_| reserve())
            .collect::<Result<Vec<_>, _>>()?;
        let terms = (0..config.term_units)
            .map(|_| reserve())
            .collect::<Result<Vec<_>, _>>()?;
        let devices = DeviceMap::new(clock, disks, terms);

        let mut log = MailLog::new(config.audit_log_capacity);
        for id in devices.iter() {
            log.log(
                0,
                0,
                MailEventKind::Created {
                    mailbox: id.0,
                    capacity,
                    max_message: DEVICE_MESSAGE_SIZE,
                    reserved: true,
                },
            );
        }

        hal.debug_write(&alloc::format!(
            "[mbx] boot: {} mailboxes ({} reserved), {} slots, {} process records",
            config.max_mailboxes,
            config.device_mailboxes(),
            config.max_slots,
            config.max_procs
        ));

        let syscalls = alloc::vec![nullsys::<H> as SyscallHandler<H>; config.max_syscalls];

        Ok(Self {
            hal,
            config,
            state: Mutex::new(state),
            devices,
            clock_ticks: AtomicU32::new(0),
            syscalls: Mutex::new(syscalls),
            log: Mutex::new(log),
            boot_time,
        })
    }

    /// Get a reference to the HAL
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Get the boot configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    /// Run `f` with interrupts masked and the store lock held.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut MailState) -> R) -> R {
        self.hal.disable_interrupts();
        let result = {
            let mut state = self.state.lock();
            f(&mut state)
        };
        self.hal.enable_interrupts();
        result
    }

    /// Wake processes after leaving the critical section.
    pub(crate) fn wake_all(&self, wakes: &[ProcessId]) {
        for pid in wakes {
            if let Err(e) = self.hal.unblock_proc(pid.0) {
                self.hal.debug_write(&alloc::format!(
                    "[mbx] failed to unblock pid {}: {}",
                    pid.0,
                    e
                ));
            }
        }
    }

    pub(crate) fn ensure_kernel_mode(&self, op: &str) {
        if !self.hal.in_kernel_mode() {
            self.fatal(format_args!(
                "{}: called while in user mode, by process {}",
                op,
                self.hal.current_pid()
            ));
        }
    }

    pub(crate) fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        self.hal
            .debug_write(&alloc::format!("[mbx] {}. Halting...", args));
        self.hal.halt(HALT_CODE)
    }

    pub(crate) fn trace(&self, args: fmt::Arguments<'_>) {
        if self.config.debug {
            self.hal.debug_write(&alloc::format!("[mbx] {}", args));
        }
    }

    pub(crate) fn record(&self, pid: ProcessId, kind: MailEventKind) {
        let timestamp = self.uptime_ns();
        self.log.lock().log(pid.0, timestamp, kind);
    }

    fn record_failure(&self, pid: ProcessId, mailbox: u32, op: MailOp, error: MailError) {
        self.trace(format_args!("{:?} on {} failed: {}", op, mailbox, error));
        self.record(
            pid,
            MailEventKind::Failed {
                mailbox,
                op,
                code: error.code(),
            },
        );
    }

    /// Suspend until the registry record of `pid` leaves the Waiting state,
    /// then run `finish` in the same critical section that observed it.
    ///
    /// A cancelled process still queued is withdrawn and gets `Cancelled`.
    /// Cancellation is checked before every park, so a caller zapped before
    /// it reaches `block_me` never sleeps.
    fn suspend<T>(
        &self,
        pid: ProcessId,
        reason: BlockReason,
        mut finish: impl FnMut(&mut MailState) -> Result<T, MailError>,
    ) -> Result<T, MailError> {
        loop {
            let zapped = self.hal.is_zapped();
            let outcome = self.with_state(|st| match wait_status(st, pid) {
                WaitStatus::Pending(_) if zapped => {
                    step_abandon(st, pid);
                    Some(Err(MailError::Cancelled))
                }
                // Still queued, or woken without a state change
                WaitStatus::Pending(_) => None,
                _ => Some(finish(st)),
            });
            if let Some(result) = outcome {
                return result;
            }
            self.hal.block_me(reason);
        }
    }

    // ========================================================================
    // Mailbox operations
    // ========================================================================

    /// Create a mailbox holding up to `capacity` messages of at most
    /// `max_message` bytes.
    pub fn create(&self, capacity: usize, max_message: usize) -> Result<MailboxId, MailError> {
        self.ensure_kernel_mode("create");
        let pid = ProcessId(self.hal.current_pid());
        match self.with_state(|st| step_create(st, capacity, max_message)) {
            Ok(id) => {
                self.trace(format_args!(
                    "create: mailbox {} capacity {} max {}",
                    id.0, capacity, max_message
                ));
                self.record(
                    pid,
                    MailEventKind::Created {
                        mailbox: id.0,
                        capacity,
                        max_message,
                        reserved: false,
                    },
                );
                Ok(id)
            }
            Err(e) => {
                self.trace(format_args!(
                    "create: capacity {} max {} refused: {}",
                    capacity, max_message, e
                ));
                self.record(
                    pid,
                    MailEventKind::CreateFailed {
                        capacity,
                        max_message,
                        code: e.code(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Send `data`, suspending while the mailbox is full or has no receiver.
    ///
    /// Exhausting the global slot pool halts the system.
    pub fn send(&self, id: MailboxId, data: &[u8]) -> Result<(), MailError> {
        self.ensure_kernel_mode("send");
        self.send_inner(id, data, Wait::Blocking)
    }

    /// Send `data` if it can be done without suspending.
    pub fn cond_send(&self, id: MailboxId, data: &[u8]) -> Result<(), MailError> {
        self.ensure_kernel_mode("cond_send");
        self.send_inner(id, data, Wait::NonBlocking)
    }

    pub(crate) fn send_inner(&self, id: MailboxId, data: &[u8], wait: Wait) -> Result<(), MailError> {
        let op = match wait {
            Wait::Blocking => MailOp::Send,
            Wait::NonBlocking => MailOp::CondSend,
        };
        let pid = ProcessId(self.hal.current_pid());

        let step = self.with_state(|st| step_send(st, pid, id, data, wait));
        self.wake_all(&step.wakes);

        let outcome = match step.result {
            Ok(outcome) => outcome,
            Err(MailError::SlotPoolExhausted) if wait == Wait::Blocking => {
                self.fatal(format_args!("send: no slots in system"))
            }
            Err(MailError::RecordInUse { holder }) => self.fatal(format_args!(
                "send: process record of pid {} still held by pid {}",
                pid.0, holder
            )),
            Err(e) => {
                self.record_failure(pid, id.0, op, e);
                return Err(e);
            }
        };

        let result = match outcome {
            SendOutcome::Delivered { .. } | SendOutcome::Queued { .. } => Ok(()),
            SendOutcome::Blocked => {
                self.trace(format_args!("send: pid {} blocked on {}", pid.0, id.0));
                self.record(pid, MailEventKind::Blocked { mailbox: id.0, op });
                self.suspend(pid, BlockReason::Send, |st| step_finish_send(st, pid))
            }
        };

        let result = match result {
            Ok(()) if wait == Wait::Blocking && self.hal.is_zapped() => {
                // The message is already delivered; only the caller is told
                self.record(pid, MailEventKind::Sent { mailbox: id.0, len: data.len() });
                Err(MailError::Cancelled)
            }
            Ok(()) => {
                self.record(pid, MailEventKind::Sent { mailbox: id.0, len: data.len() });
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.record_failure(pid, id.0, op, e);
        }
        result
    }

    /// Receive the oldest message into `buf`, suspending while none is
    /// available. Returns the message length.
    pub fn receive(&self, id: MailboxId, buf: &mut [u8]) -> Result<usize, MailError> {
        self.ensure_kernel_mode("receive");
        self.receive_inner(id, buf, Wait::Blocking)
    }

    /// Receive a message if one is available without suspending.
    pub fn cond_receive(&self, id: MailboxId, buf: &mut [u8]) -> Result<usize, MailError> {
        self.ensure_kernel_mode("cond_receive");
        self.receive_inner(id, buf, Wait::NonBlocking)
    }

    pub(crate) fn receive_inner(
        &self,
        id: MailboxId,
        buf: &mut [u8],
        wait: Wait,
    ) -> Result<usize, MailError> {
        let op = match wait {
            Wait::Blocking => MailOp::Receive,
            Wait::NonBlocking => MailOp::CondReceive,
        };
        let pid = ProcessId(self.hal.current_pid());

        let step = self.with_state(|st| step_receive(st, pid, id, buf, wait));
        self.wake_all(&step.wakes);

        let outcome = match step.result {
            Ok(outcome) => outcome,
            Err(MailError::RecordInUse { holder }) => self.fatal(format_args!(
                "receive: process record of pid {} still held by pid {}",
                pid.0, holder
            )),
            Err(e) => {
                self.record_failure(pid, id.0, op, e);
                return Err(e);
            }
        };

        let result = match outcome {
            ReceiveOutcome::Received(len) => Ok(len),
            ReceiveOutcome::Blocked => {
                self.trace(format_args!("receive: pid {} blocked on {}", pid.0, id.0));
                self.record(pid, MailEventKind::Blocked { mailbox: id.0, op });
                self.suspend(pid, BlockReason::Receive, |st| {
                    step_finish_receive(st, pid, buf)
                })
            }
        };

        if let Ok(len) = result {
            self.record(pid, MailEventKind::Received { mailbox: id.0, len });
        }
        let result = match result {
            Ok(_) if wait == Wait::Blocking && self.hal.is_zapped() => Err(MailError::Cancelled),
            other => other,
        };
        if let Err(e) = result {
            self.record_failure(pid, id.0, op, e);
        }
        result
    }

    /// Tear down a mailbox. Every process waiting on it is woken and sees
    /// `MailboxReleased`; queued messages are discarded.
    pub fn release(&self, id: MailboxId) -> Result<(), MailError> {
        self.ensure_kernel_mode("release");
        let pid = ProcessId(self.hal.current_pid());

        let step = self.with_state(|st| step_release(st, id));
        self.wake_all(&step.wakes);

        match step.result {
            Ok(woken) => {
                self.trace(format_args!("release: mailbox {} woke {}", id.0, woken));
                self.record(pid, MailEventKind::Released { mailbox: id.0, woken });
            }
            Err(e) => {
                self.record_failure(pid, id.0, MailOp::Release, e);
                return Err(e);
            }
        }

        if self.hal.is_zapped() {
            self.record_failure(pid, id.0, MailOp::Release, MailError::Cancelled);
            return Err(MailError::Cancelled);
        }
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Snapshot of one active mailbox
    pub fn mailbox_info(&self, id: MailboxId) -> Option<MailboxInfo> {
        self.with_state(|st| st.mailbox_info(id))
    }

    /// Snapshot of every active mailbox
    pub fn list_mailboxes(&self) -> Vec<MailboxInfo> {
        self.with_state(|st| st.list_mailboxes())
    }

    /// System-wide metrics
    pub fn system_metrics(&self) -> SystemMetrics {
        self.with_state(|st| st.get_system_metrics())
    }

    /// Check every store invariant
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        self.with_state(|st| check_all_invariants(st))
    }

    /// Nanoseconds since boot
    pub fn uptime_ns(&self) -> u64 {
        self.hal.now_nanos().saturating_sub(self.boot_time)
    }

    /// Most recent `count` audit events, newest first
    pub fn recent_events(&self, count: usize) -> Vec<MailEvent> {
        self.log
            .lock()
            .get_recent(count)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Retained audit events as JSON
    pub fn export_log_json(&self) -> Result<alloc::string::String, serde_json::Error> {
        self.log.lock().to_json()
    }
}
