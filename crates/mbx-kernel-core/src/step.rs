//! Pure step functions - the mailbox engine
//!
//! Every mailbox operation is a `step_*` function that takes the current
//! `MailState` and returns:
//! - the operation's result
//! - the list of processes the caller must wake once it has left the
//!   critical section
//!
//! No function here suspends anybody. A blocking operation that cannot finish
//! queues the caller's registry record and reports `Blocked`; the runtime
//! suspends the process and, after resuming, asks `wait_status` how the wait
//! ended.
//!
//! # Transfer rules
//!
//! - A send to a mailbox with a blocked receiver copies straight into that
//!   receiver's record (rendezvous).
//! - Otherwise, a send to a mailbox with room takes a slot from the pool.
//! - A receive that frees a slot hands it to the longest-waiting sender,
//!   whose message is moved into the mailbox on its behalf.
//! - A receive on a mailbox with nothing queued but a blocked sender takes
//!   that sender's message directly (capacity 0 rendezvous).

use alloc::vec;
use alloc::vec::Vec;

use crate::error::MailError;
use crate::registry::{Role, WaitState};
use crate::state::MailState;
use crate::types::{MailboxId, ProcessId, SlotIndex, Wait};

// ============================================================================
// Results
// ============================================================================

/// Result of a step: the operation outcome plus processes to wake.
#[derive(Debug)]
pub struct StepResult<T> {
    /// Outcome of the operation
    pub result: Result<T, MailError>,
    /// Processes whose wait ended during this step, in wake order
    pub wakes: Vec<ProcessId>,
}

impl<T> StepResult<T> {
    fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            wakes: vec![],
        }
    }

    fn err(error: MailError) -> Self {
        Self {
            result: Err(error),
            wakes: vec![],
        }
    }
}

/// How a send was satisfied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Copied straight into a blocked receiver
    Delivered {
        /// Receiver that got the message
        receiver: ProcessId,
    },
    /// Buffered in a slot
    Queued {
        /// Slot holding the message
        slot: SlotIndex,
    },
    /// Caller queued as a blocked sender and must suspend
    Blocked,
}

/// How a receive was satisfied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Message copied into the caller's buffer
    Received(usize),
    /// Caller queued as a blocked receiver and must suspend
    Blocked,
}

/// Where a process stands in its current wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// No wait in progress
    Idle,
    /// Still queued on the mailbox
    Pending(MailboxId),
    /// The transfer was completed by a matching operation
    Completed,
    /// The mailbox was released
    Released,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Allocate a general-purpose mailbox.
///
/// Never returns an id below the reserved device threshold.
pub fn step_create(
    state: &mut MailState,
    capacity: usize,
    max_message: usize,
) -> Result<MailboxId, MailError> {
    if max_message > state.limits.max_message {
        return Err(MailError::InvalidArgument);
    }
    let from = state.reserved;
    state
        .activate_free(from, capacity, max_message)
        .ok_or(MailError::NoFreeMailbox)
}

/// Allocate the next reserved device mailbox. Only valid during boot,
/// before any general-purpose mailbox exists above the threshold.
pub fn step_create_reserved(
    state: &mut MailState,
    capacity: usize,
    max_message: usize,
) -> Result<MailboxId, MailError> {
    if max_message > state.limits.max_message {
        return Err(MailError::InvalidArgument);
    }
    let next = state.reserved;
    match state.get_mailbox(MailboxId(next as u32)) {
        Some(m) if !m.is_active() => {}
        Some(_) => return Err(MailError::InvalidArgument),
        None => return Err(MailError::NoFreeMailbox),
    }
    let id = state
        .activate_free(next, capacity, max_message)
        .ok_or(MailError::NoFreeMailbox)?;
    if let Some(mailbox) = state.get_active_mut(id) {
        mailbox.reserved = true;
    }
    state.reserved += 1;
    Ok(id)
}

/// Release a mailbox, failing every process still waiting on it.
///
/// Returns the number of processes woken. Queued messages are discarded and
/// the descriptor goes back to Free.
pub fn step_release(state: &mut MailState, id: MailboxId) -> StepResult<usize> {
    let (senders, receivers) = match state.get_active_mut(id) {
        Some(m) => (
            core::mem::take(&mut m.blocked_senders),
            core::mem::take(&mut m.blocked_receivers),
        ),
        None => return StepResult::err(MailError::InvalidArgument),
    };

    let mut wakes = Vec::with_capacity(senders.len() + receivers.len());
    for pid in senders.into_iter().chain(receivers) {
        if let Some(record) = state.registry.get_mut(pid) {
            record.state = WaitState::Released;
            record.payload.clear();
        }
        wakes.push(pid);
    }

    state.reset_mailbox(id);

    StepResult {
        result: Ok(wakes.len()),
        wakes,
    }
}

// ============================================================================
// Send
// ============================================================================

/// Send `data` to mailbox `id` on behalf of `pid`.
pub fn step_send(
    state: &mut MailState,
    pid: ProcessId,
    id: MailboxId,
    data: &[u8],
    wait: Wait,
) -> StepResult<SendOutcome> {
    let (max_message, receiver, has_room) = match state.get_active(id) {
        Some(m) => (
            m.max_message,
            m.blocked_receivers.front().copied(),
            m.has_room(),
        ),
        None => return StepResult::err(MailError::InvalidArgument),
    };

    if data.len() > max_message {
        return StepResult::err(MailError::InvalidArgument);
    }

    if let Some(receiver) = receiver {
        return deliver_to_receiver(state, id, receiver, data);
    }

    if has_room {
        let slot = match state.slots.alloc(id, data) {
            Some(slot) => slot,
            None => return StepResult::err(MailError::SlotPoolExhausted),
        };
        if let Some(mailbox) = state.get_active_mut(id) {
            mailbox.pending.push_back(slot);
            mailbox.note_enqueued();
        }
        state.total_sent += 1;
        return StepResult::ok(SendOutcome::Queued { slot });
    }

    match wait {
        Wait::NonBlocking => StepResult::err(MailError::WouldBlock),
        Wait::Blocking => {
            let record = match state.registry.claim(pid) {
                Ok(record) => record,
                Err(e) => return StepResult::err(e),
            };
            record.role = Role::Sender;
            record.state = WaitState::Waiting(id);
            record.payload.extend_from_slice(data);
            if let Some(mailbox) = state.get_active_mut(id) {
                mailbox.blocked_senders.push_back(pid);
            }
            StepResult::ok(SendOutcome::Blocked)
        }
    }
}

fn deliver_to_receiver(
    state: &mut MailState,
    id: MailboxId,
    receiver: ProcessId,
    data: &[u8],
) -> StepResult<SendOutcome> {
    let record = match state.registry.get_mut(receiver) {
        Some(record) => record,
        None => return StepResult::err(MailError::InvalidArgument),
    };
    if data.len() > record.max_len {
        return StepResult::err(MailError::InvalidArgument);
    }
    record.payload.clear();
    record.payload.extend_from_slice(data);
    record.state = WaitState::Completed;

    if let Some(mailbox) = state.get_active_mut(id) {
        mailbox.blocked_receivers.pop_front();
        mailbox.metrics.total_sent += 1;
        mailbox.note_delivered(data.len());
    }
    state.total_sent += 1;
    state.total_received += 1;

    StepResult {
        result: Ok(SendOutcome::Delivered { receiver }),
        wakes: vec![receiver],
    }
}

// ============================================================================
// Receive
// ============================================================================

/// Receive the oldest message of mailbox `id` into `buf` on behalf of `pid`.
pub fn step_receive(
    state: &mut MailState,
    pid: ProcessId,
    id: MailboxId,
    buf: &mut [u8],
    wait: Wait,
) -> StepResult<ReceiveOutcome> {
    let (head, sender) = match state.get_active(id) {
        Some(m) => (m.pending.front().copied(), m.blocked_senders.front().copied()),
        None => return StepResult::err(MailError::InvalidArgument),
    };

    if let Some(slot) = head {
        return receive_queued(state, id, slot, sender, buf);
    }

    if let Some(sender) = sender {
        return receive_from_sender(state, id, sender, buf);
    }

    match wait {
        Wait::NonBlocking => StepResult::err(MailError::WouldBlock),
        Wait::Blocking => {
            let record = match state.registry.claim(pid) {
                Ok(record) => record,
                Err(e) => return StepResult::err(e),
            };
            record.role = Role::Receiver;
            record.state = WaitState::Waiting(id);
            record.max_len = buf.len();
            if let Some(mailbox) = state.get_active_mut(id) {
                mailbox.blocked_receivers.push_back(pid);
            }
            StepResult::ok(ReceiveOutcome::Blocked)
        }
    }
}

fn receive_queued(
    state: &mut MailState,
    id: MailboxId,
    slot: SlotIndex,
    sender: Option<ProcessId>,
    buf: &mut [u8],
) -> StepResult<ReceiveOutcome> {
    let len = match state.slots.get(slot) {
        Some(s) if s.is_occupied() => s.len,
        _ => return StepResult::err(MailError::InvalidArgument),
    };
    if len > buf.len() {
        return StepResult::err(MailError::InvalidArgument);
    }
    if let Some(s) = state.slots.get(slot) {
        buf[..len].copy_from_slice(s.payload());
    }

    if let Some(mailbox) = state.get_active_mut(id) {
        mailbox.pending.pop_front();
        mailbox.note_delivered(len);
    }
    state.total_received += 1;

    let mut wakes = vec![];
    let handoff = sender.and_then(|pid| {
        state.registry.get_mut(pid).map(|record| {
            record.state = WaitState::Completed;
            (pid, core::mem::take(&mut record.payload))
        })
    });

    match handoff {
        Some((pid, payload)) => {
            // The freed slot goes straight to the longest-waiting sender
            state.slots.store(slot, id, &payload);
            if let Some(mailbox) = state.get_active_mut(id) {
                mailbox.blocked_senders.pop_front();
                mailbox.pending.push_back(slot);
                mailbox.note_enqueued();
            }
            state.total_sent += 1;
            wakes.push(pid);
        }
        None => state.slots.release(slot),
    }

    StepResult {
        result: Ok(ReceiveOutcome::Received(len)),
        wakes,
    }
}

fn receive_from_sender(
    state: &mut MailState,
    id: MailboxId,
    sender: ProcessId,
    buf: &mut [u8],
) -> StepResult<ReceiveOutcome> {
    let record = match state.registry.get_mut(sender) {
        Some(record) => record,
        None => return StepResult::err(MailError::InvalidArgument),
    };
    let len = record.payload.len();
    if len > buf.len() {
        return StepResult::err(MailError::InvalidArgument);
    }
    buf[..len].copy_from_slice(&record.payload);
    record.payload.clear();
    record.state = WaitState::Completed;

    if let Some(mailbox) = state.get_active_mut(id) {
        mailbox.blocked_senders.pop_front();
        mailbox.metrics.total_sent += 1;
        mailbox.note_delivered(len);
    }
    state.total_sent += 1;
    state.total_received += 1;

    StepResult {
        result: Ok(ReceiveOutcome::Received(len)),
        wakes: vec![sender],
    }
}

// ============================================================================
// Resumption
// ============================================================================

/// Report how the current wait of `pid` stands.
pub fn wait_status(state: &MailState, pid: ProcessId) -> WaitStatus {
    match state.registry.get(pid).map(|r| r.state) {
        Some(WaitState::Waiting(id)) => WaitStatus::Pending(id),
        Some(WaitState::Completed) => WaitStatus::Completed,
        Some(WaitState::Released) => WaitStatus::Released,
        Some(WaitState::Idle) | None => WaitStatus::Idle,
    }
}

/// Finish a blocked send after resuming. Clears the record.
pub fn step_finish_send(state: &mut MailState, pid: ProcessId) -> Result<(), MailError> {
    let result = match wait_status(state, pid) {
        WaitStatus::Completed => Ok(()),
        WaitStatus::Released => Err(MailError::MailboxReleased),
        WaitStatus::Pending(_) | WaitStatus::Idle => Err(MailError::InvalidArgument),
    };
    if !matches!(wait_status(state, pid), WaitStatus::Pending(_)) {
        state.registry.reset(pid);
    }
    result
}

/// Finish a blocked receive after resuming: copy the delivered message into
/// `buf` and clear the record. Returns the message length.
pub fn step_finish_receive(
    state: &mut MailState,
    pid: ProcessId,
    buf: &mut [u8],
) -> Result<usize, MailError> {
    let result = match state.registry.get(pid) {
        Some(record) => match record.state {
            WaitState::Completed if record.payload.len() <= buf.len() => {
                let len = record.payload.len();
                buf[..len].copy_from_slice(&record.payload);
                Ok(len)
            }
            WaitState::Released => Err(MailError::MailboxReleased),
            WaitState::Waiting(_) => return Err(MailError::InvalidArgument),
            _ => Err(MailError::InvalidArgument),
        },
        None => return Err(MailError::InvalidArgument),
    };
    state.registry.reset(pid);
    result
}

/// Withdraw `pid` from whatever queue it waits on (cancellation).
///
/// Returns true if the process was still queued.
pub fn step_abandon(state: &mut MailState, pid: ProcessId) -> bool {
    let queued_on = match wait_status(state, pid) {
        WaitStatus::Pending(id) => Some(id),
        _ => None,
    };
    if let Some(id) = queued_on {
        if let Some(mailbox) = state.get_active_mut(id) {
            mailbox.blocked_senders.retain(|p| *p != pid);
            mailbox.blocked_receivers.retain(|p| *p != pid);
        }
    }
    state.registry.reset(pid);
    queued_on.is_some()
}
