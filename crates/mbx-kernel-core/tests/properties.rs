//! Property-based tests for the mailbox engine
//!
//! - fifo_across_buffer_and_blocked_senders(): messages leave a mailbox in the
//!   order their senders arrived, whether buffered or blocked
//! - random_traffic_preserves_invariants(): arbitrary interleavings of create,
//!   send, receive and release keep every invariant and lose no message

use std::collections::{HashMap, VecDeque};

use mbx_kernel_core::{
    check_all_invariants, step_create, step_finish_receive, step_finish_send, step_receive,
    step_release, step_send, Limits, MailState, MailboxId, ProcessId, ReceiveOutcome,
    SendOutcome, Wait,
};
use proptest::prelude::*;

const PROCS: u64 = 6;

fn limits() -> Limits {
    Limits {
        max_mailboxes: 4,
        max_slots: 6,
        max_procs: 16,
        max_message: 8,
    }
}

#[derive(Clone, Debug)]
enum Op {
    Create { capacity: usize },
    Send { pid: u64, mbox: u32, len: usize, blocking: bool },
    Receive { pid: u64, mbox: u32, buf: usize, blocking: bool },
    Release { mbox: u32 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => (0usize..4).prop_map(|capacity| Op::Create { capacity }),
        4 => (0..PROCS, 0u32..4, 1usize..=8, any::<bool>())
            .prop_map(|(pid, mbox, len, blocking)| Op::Send { pid, mbox, len, blocking }),
        4 => (0..PROCS, 0u32..4, 0usize..=8, any::<bool>())
            .prop_map(|(pid, mbox, buf, blocking)| Op::Receive { pid, mbox, buf, blocking }),
        1 => (0u32..4).prop_map(|mbox| Op::Release { mbox }),
    ]
}

#[derive(Clone, Copy)]
enum Blocked {
    Sender,
    Receiver(usize),
}

/// Drives the engine like a scheduler would: blocked pids issue no further
/// operations until a step wakes them.
struct Harness {
    state: MailState,
    blocked: HashMap<u64, Blocked>,
    sent: Vec<Vec<u8>>,
    received: Vec<Vec<u8>>,
    seq: u8,
}

impl Harness {
    fn new() -> Self {
        Self {
            state: MailState::new(limits()),
            blocked: HashMap::new(),
            sent: Vec::new(),
            received: Vec::new(),
            seq: 0,
        }
    }

    fn resume(&mut self, wakes: Vec<ProcessId>) {
        for pid in wakes {
            match self.blocked.remove(&pid.0) {
                Some(Blocked::Sender) => {
                    let _ = step_finish_send(&mut self.state, pid);
                }
                Some(Blocked::Receiver(len)) => {
                    let mut buf = vec![0u8; len];
                    if let Ok(n) = step_finish_receive(&mut self.state, pid, &mut buf) {
                        self.received.push(buf[..n].to_vec());
                    }
                }
                None => panic!("woke pid {} that was not blocked", pid.0),
            }
        }
    }

    fn apply(&mut self, op: Op) {
        match op {
            Op::Create { capacity } => {
                let _ = step_create(&mut self.state, capacity, 8);
            }
            Op::Send { pid, mbox, len, blocking } => {
                if self.blocked.contains_key(&pid) {
                    return;
                }
                self.seq = self.seq.wrapping_add(1);
                let data = vec![self.seq; len];
                let wait = if blocking { Wait::Blocking } else { Wait::NonBlocking };
                let step = step_send(&mut self.state, ProcessId(pid), MailboxId(mbox), &data, wait);
                match step.result {
                    Ok(SendOutcome::Blocked) => {
                        self.blocked.insert(pid, Blocked::Sender);
                    }
                    Ok(SendOutcome::Delivered { .. }) | Ok(SendOutcome::Queued { .. }) => {}
                    Err(_) => assert!(step.wakes.is_empty()),
                }
                if step.result.is_ok() {
                    self.sent.push(data);
                }
                self.resume(step.wakes);
            }
            Op::Receive { pid, mbox, buf, blocking } => {
                if self.blocked.contains_key(&pid) {
                    return;
                }
                let mut out = vec![0u8; buf];
                let wait = if blocking { Wait::Blocking } else { Wait::NonBlocking };
                let step =
                    step_receive(&mut self.state, ProcessId(pid), MailboxId(mbox), &mut out, wait);
                match step.result {
                    Ok(ReceiveOutcome::Received(n)) => self.received.push(out[..n].to_vec()),
                    Ok(ReceiveOutcome::Blocked) => {
                        self.blocked.insert(pid, Blocked::Receiver(buf));
                    }
                    Err(_) => assert!(step.wakes.is_empty()),
                }
                self.resume(step.wakes);
            }
            Op::Release { mbox } => {
                let step = step_release(&mut self.state, MailboxId(mbox));
                self.resume(step.wakes);
            }
        }
    }
}

proptest! {
    #[test]
    fn fifo_across_buffer_and_blocked_senders(capacity in 0usize..4, count in 1usize..10) {
        let mut state = MailState::new(limits());
        let id = step_create(&mut state, capacity, 8).unwrap();

        // Each sender is a distinct process; later ones block once the buffer is full
        for i in 0..count {
            let step = step_send(&mut state, ProcessId(i as u64 + 1), id, &[i as u8], Wait::Blocking);
            prop_assert!(step.result.is_ok());
        }

        let receiver = ProcessId(100);
        let mut woken = VecDeque::new();
        for expected in 0..count {
            let mut buf = [0u8; 8];
            let step = step_receive(&mut state, receiver, id, &mut buf, Wait::Blocking);
            prop_assert_eq!(step.result, Ok(ReceiveOutcome::Received(1)));
            prop_assert_eq!(buf[0], expected as u8);
            woken.extend(step.wakes);
            prop_assert!(check_all_invariants(&state).is_empty());
        }

        // Blocked senders were woken in arrival order
        let expected: Vec<ProcessId> = (capacity.min(count)..count)
            .map(|i| ProcessId(i as u64 + 1))
            .collect();
        prop_assert_eq!(Vec::from(woken), expected);
    }

    #[test]
    fn random_traffic_preserves_invariants(ops in prop::collection::vec(arb_op(), 1..80)) {
        let mut harness = Harness::new();
        for op in ops {
            harness.apply(op);
            let violations = check_all_invariants(&harness.state);
            prop_assert!(violations.is_empty(), "{:?}", violations);
        }

        // Every message received was sent
        for message in &harness.received {
            prop_assert!(harness.sent.contains(message));
        }
        prop_assert!(harness.received.len() <= harness.sent.len());
    }
}
