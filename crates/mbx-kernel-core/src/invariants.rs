//! Runtime-checkable mailbox invariants
//!
//! These must hold whenever no step function is executing. They are used for
//! assertion checking in tests and property-based testing with proptest.
//!
//! # Invariants
//!
//! 1. **Queue Bound**: A mailbox never holds more messages than its capacity
//! 2. **One-Sided Waiting**: Blocked receivers imply nothing is queued and no
//!    sender is blocked
//! 3. **Senders Wait On Full**: Blocked senders imply the mailbox is full
//! 4. **Slot Accounting**: Every pending slot is occupied, owned by its
//!    mailbox and queued exactly once; occupied slots equal pending messages
//! 5. **Waiter Records**: Every queued process has a matching registry record
//! 6. **Free Is Empty**: A Free descriptor has no messages and no waiters

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::registry::{Role, WaitState};
use crate::state::{MailState, Mailbox};
use crate::types::ProcessId;

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all mailbox invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(state: &MailState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for mailbox in &state.mailboxes {
        if mailbox.is_active() {
            violations.extend(check_queue_bound(mailbox));
            violations.extend(check_one_sided_waiting(mailbox));
            violations.extend(check_senders_wait_on_full(mailbox));
            violations.extend(check_waiter_records(state, mailbox));
        } else {
            violations.extend(check_free_is_empty(mailbox));
        }
    }
    violations.extend(check_slot_accounting(state));

    violations
}

/// Invariant 1: pending messages never exceed capacity
fn check_queue_bound(mailbox: &Mailbox) -> Vec<InvariantViolation> {
    if mailbox.pending.len() > mailbox.capacity {
        return vec![InvariantViolation {
            invariant: "queue_bound",
            description: alloc::format!(
                "Mailbox {} holds {} messages with capacity {}",
                mailbox.id.0,
                mailbox.pending.len(),
                mailbox.capacity
            ),
        }];
    }
    vec![]
}

/// Invariant 2: receivers only wait on an empty mailbox with no senders
fn check_one_sided_waiting(mailbox: &Mailbox) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    if mailbox.blocked_receivers.is_empty() {
        return violations;
    }
    if !mailbox.pending.is_empty() {
        violations.push(InvariantViolation {
            invariant: "one_sided_waiting",
            description: alloc::format!(
                "Mailbox {} has {} queued messages and {} blocked receivers",
                mailbox.id.0,
                mailbox.pending.len(),
                mailbox.blocked_receivers.len()
            ),
        });
    }
    if !mailbox.blocked_senders.is_empty() {
        violations.push(InvariantViolation {
            invariant: "one_sided_waiting",
            description: alloc::format!(
                "Mailbox {} has both blocked senders and blocked receivers",
                mailbox.id.0
            ),
        });
    }
    violations
}

/// Invariant 3: a sender only waits when there is no room
fn check_senders_wait_on_full(mailbox: &Mailbox) -> Vec<InvariantViolation> {
    if !mailbox.blocked_senders.is_empty() && mailbox.has_room() {
        return vec![InvariantViolation {
            invariant: "senders_wait_on_full",
            description: alloc::format!(
                "Mailbox {} has blocked senders but {}/{} slots used",
                mailbox.id.0,
                mailbox.pending.len(),
                mailbox.capacity
            ),
        }];
    }
    vec![]
}

/// Invariant 4: slot ownership agrees with the pending queues
fn check_slot_accounting(state: &MailState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut seen = vec![false; state.slots.capacity()];
    let mut pending_total = 0usize;

    for mailbox in state.mailboxes.iter().filter(|m| m.is_active()) {
        for &index in &mailbox.pending {
            pending_total += 1;
            match state.slots.get(index) {
                Some(slot) if slot.owner == Some(mailbox.id) => {}
                Some(slot) => violations.push(InvariantViolation {
                    invariant: "slot_accounting",
                    description: alloc::format!(
                        "Slot {} queued on mailbox {} but owned by {:?}",
                        index,
                        mailbox.id.0,
                        slot.owner
                    ),
                }),
                None => violations.push(InvariantViolation {
                    invariant: "slot_accounting",
                    description: alloc::format!(
                        "Mailbox {} references nonexistent slot {}",
                        mailbox.id.0,
                        index
                    ),
                }),
            }
            if let Some(flag) = seen.get_mut(index) {
                if *flag {
                    violations.push(InvariantViolation {
                        invariant: "slot_accounting",
                        description: alloc::format!("Slot {} queued more than once", index),
                    });
                }
                *flag = true;
            }
        }
    }

    if pending_total != state.slots.used_count() {
        violations.push(InvariantViolation {
            invariant: "slot_accounting",
            description: alloc::format!(
                "{} messages queued but {} slots in use",
                pending_total,
                state.slots.used_count()
            ),
        });
    }

    violations
}

/// Invariant 5: queued processes have matching records
fn check_waiter_records(state: &MailState, mailbox: &Mailbox) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let queues: [(&str, Role, &alloc::collections::VecDeque<ProcessId>); 2] = [
        ("sender", Role::Sender, &mailbox.blocked_senders),
        ("receiver", Role::Receiver, &mailbox.blocked_receivers),
    ];

    for (label, role, queue) in queues {
        for &pid in queue {
            let ok = state
                .registry
                .get(pid)
                .map(|r| r.role == role && r.state == WaitState::Waiting(mailbox.id))
                .unwrap_or(false);
            if !ok {
                violations.push(InvariantViolation {
                    invariant: "waiter_records",
                    description: alloc::format!(
                        "Blocked {} {} on mailbox {} has no matching record",
                        label,
                        pid.0,
                        mailbox.id.0
                    ),
                });
            }
        }
    }
    violations
}

/// Invariant 6: free descriptors carry nothing
fn check_free_is_empty(mailbox: &Mailbox) -> Vec<InvariantViolation> {
    if !mailbox.pending.is_empty() || mailbox.has_blocked() {
        return vec![InvariantViolation {
            invariant: "free_is_empty",
            description: alloc::format!("Free mailbox {} still has queue entries", mailbox.id.0),
        }];
    }
    vec![]
}

/// Assert all invariants hold (panics on violation).
pub fn assert_invariants(state: &MailState) {
    let violations = check_all_invariants(state);
    if let Some(v) = violations.first() {
        panic!("Invariant violated: {} ({})", v.invariant, v.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{step_create, step_receive, step_send};
    use crate::types::{Limits, MailboxId, Wait};

    fn state() -> MailState {
        MailState::new(Limits {
            max_mailboxes: 4,
            max_slots: 4,
            max_procs: 4,
            max_message: 8,
        })
    }

    fn names(state: &MailState) -> Vec<&'static str> {
        check_all_invariants(state)
            .into_iter()
            .map(|v| v.invariant)
            .collect()
    }

    #[test]
    fn test_invariants_hold_for_new_state() {
        assert!(check_all_invariants(&state()).is_empty());
    }

    #[test]
    fn test_invariants_hold_after_traffic() {
        let mut state = state();
        let id = step_create(&mut state, 1, 8).unwrap();
        step_send(&mut state, ProcessId(1), id, b"a", Wait::Blocking);
        step_send(&mut state, ProcessId(2), id, b"b", Wait::Blocking);
        let mut buf = [0u8; 8];
        step_receive(&mut state, ProcessId(3), id, &mut buf, Wait::Blocking);
        assert_invariants(&state);
    }

    #[test]
    fn test_detects_overfull_mailbox() {
        let mut state = state();
        let id = step_create(&mut state, 1, 8).unwrap();
        step_send(&mut state, ProcessId(1), id, b"a", Wait::Blocking);
        state.get_active_mut(id).unwrap().capacity = 0;
        assert!(names(&state).contains(&"queue_bound"));
    }

    #[test]
    fn test_detects_leaked_slot() {
        let mut state = state();
        state.slots.alloc(MailboxId(0), b"x");
        assert_eq!(names(&state), vec!["slot_accounting"]);
    }

    #[test]
    fn test_detects_waiter_without_record() {
        let mut state = state();
        let id = step_create(&mut state, 0, 8).unwrap();
        state
            .get_active_mut(id)
            .unwrap()
            .blocked_receivers
            .push_back(ProcessId(2));
        assert_eq!(names(&state), vec!["waiter_records"]);
    }

    #[test]
    fn test_detects_receiver_waiting_beside_message() {
        let mut state = state();
        let id = step_create(&mut state, 2, 8).unwrap();
        let mut buf = [0u8; 8];
        step_receive(&mut state, ProcessId(1), id, &mut buf, Wait::Blocking);
        let slot = state.slots.alloc(id, b"x").unwrap();
        state.get_active_mut(id).unwrap().pending.push_back(slot);
        assert!(names(&state).contains(&"one_sided_waiting"));
    }

    #[test]
    #[should_panic(expected = "Invariant violated")]
    fn test_assert_invariants_panics_on_violation() {
        let mut state = state();
        state.mailboxes[3].blocked_senders.push_back(ProcessId(1));
        assert_invariants(&state);
    }
}
