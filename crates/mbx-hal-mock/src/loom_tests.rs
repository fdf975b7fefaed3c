//! Loom tests for the wake-token handshake
//!
//! The mailbox kernel wakes processes only after leaving its critical
//! section, so an unblock can reach the HAL before the target has parked.
//! These tests model the `block_me` / `unblock_proc` token protocol and check
//! under every interleaving that no wakeup is lost and no sleeper is woken
//! twice by one token.
//!
//! # Running Loom Tests
//!
//! ```bash
//! cargo test --package mbx-hal-mock --features loom -- --test-threads=1 loom
//! ```

#[cfg(all(test, feature = "loom"))]
mod tests {
    use loom::sync::{Arc, Condvar, Mutex};
    use loom::thread;

    /// Single-process version of the mock's token protocol
    struct Token {
        /// (wake_pending, parked)
        state: Mutex<(bool, bool)>,
        changed: Condvar,
    }

    impl Token {
        fn new() -> Self {
            Self {
                state: Mutex::new((false, false)),
                changed: Condvar::new(),
            }
        }

        fn block(&self) {
            let mut s = self.state.lock().unwrap();
            if s.0 {
                s.0 = false;
                return;
            }
            s.1 = true;
            while !s.0 {
                s = self.changed.wait(s).unwrap();
            }
            s.0 = false;
            s.1 = false;
        }

        fn wake(&self) {
            let mut s = self.state.lock().unwrap();
            s.0 = true;
            self.changed.notify_all();
        }
    }

    /// Test: a wake racing ahead of block is never lost
    #[test]
    fn loom_wake_before_block_not_lost() {
        loom::model(|| {
            let token = Arc::new(Token::new());

            let t = token.clone();
            let sleeper = thread::spawn(move || t.block());

            token.wake();
            sleeper.join().unwrap();

            let s = token.state.lock().unwrap();
            assert!(!s.0, "token must be consumed");
            assert!(!s.1, "sleeper must not stay parked");
        });
    }

    /// Test: two blocks need two wakes
    #[test]
    fn loom_each_wake_releases_one_block() {
        loom::model(|| {
            let token = Arc::new(Token::new());

            let t = token.clone();
            let sleeper = thread::spawn(move || {
                t.block();
                t.block();
            });

            let w = token.clone();
            let waker = thread::spawn(move || {
                w.wake();
                // Wait until the first token is consumed before issuing the second
                loop {
                    if !w.state.lock().unwrap().0 {
                        break;
                    }
                    thread::yield_now();
                }
                w.wake();
            });

            waker.join().unwrap();
            sleeper.join().unwrap();
        });
    }
}
