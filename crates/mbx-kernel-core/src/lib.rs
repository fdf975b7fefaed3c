//! Mailbox Kernel Core - Pure Mailbox State Machine
//!
//! This crate contains the **HAL-free** half of the mailbox subsystem: the
//! mailbox table, the global slot pool and the blocked-process registry,
//! plus the step functions that move messages between them.
//!
//! # Design Principles
//!
//! 1. **No HAL dependency**: scheduling, interrupts and devices live in `mbx-kernel`
//! 2. **No suspension**: a step that must wait reports it and returns
//! 3. **Deterministic**: same state and input always produce the same wakes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    mbx-kernel-core                          │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                   │
//! │   │  MailState    │    │   step_*()    │                   │
//! │   │  - mailboxes  │───▶│  result +     │                   │
//! │   │  - slots      │    │  wake list    │                   │
//! │   │  - registry   │    └───────────────┘                   │
//! │   └───────────────┘                                         │
//! │                        ┌───────────────┐                   │
//! │                        │  Invariants   │                   │
//! │                        └───────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      mbx-kernel                             │
//! │   - critical section (interrupts off + lock)                │
//! │   - block / unblock through the HAL                         │
//! │   - device mailboxes and interrupt handlers                 │
//! │   - MailLog audit trail                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `types` - ids, limits, metrics
//! - `error` - `MailError` and its status codes
//! - `slots` - global slot pool
//! - `registry` - blocked-process records
//! - `state` - `MailState` and mailbox descriptors
//! - `step` - the operations
//! - `invariants` - consistency checks

#![no_std]
extern crate alloc;

pub mod error;
pub mod invariants;
pub mod registry;
pub mod slots;
pub mod state;
pub mod step;
pub mod types;

pub use error::{MailError, STATUS_ABORTED, STATUS_INVALID, STATUS_WOULD_BLOCK};
pub use invariants::{assert_invariants, check_all_invariants, InvariantViolation};
pub use registry::{ProcRecord, ProcRegistry, Role, WaitState};
pub use slots::{Slot, SlotPool};
pub use state::{MailState, Mailbox};
pub use step::{
    step_abandon, step_create, step_create_reserved, step_finish_receive, step_finish_send,
    step_receive, step_release, step_send, wait_status, ReceiveOutcome, SendOutcome, StepResult,
    WaitStatus,
};
pub use types::{
    Limits, MailboxId, MailboxInfo, MailboxMetrics, MailboxStatus, ProcessId, SlotIndex,
    SystemMetrics, Wait, MAX_MAILBOXES, MAX_MESSAGE, MAX_PROCS, MAX_SLOTS,
};
