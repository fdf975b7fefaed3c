//! Mock HAL implementation for testing the mbx kernel
//!
//! Every simulated process is a real OS thread. `block_me` parks the calling
//! thread on a condition variable until `unblock_proc` (or `zap`) hands it a
//! wake token, which lets the kernel's blocking paths run unmodified in
//! ordinary `#[test]` functions.
//!
//! A wake token delivered before the target has parked is kept, so the
//! following `block_me` returns immediately.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mbx_hal::{BlockReason, DeviceKind, HalError, HAL};
use parking_lot::{Condvar, Mutex};

#[cfg(any(test, feature = "loom"))]
mod loom_tests;

thread_local! {
    static CURRENT_PID: Cell<u64> = const { Cell::new(0) };
}

/// How long `wait_until_blocked` waits before failing the test
const BLOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Simulated process state
#[derive(Default)]
struct MockProcess {
    name: String,
    /// Wake token not yet consumed by `block_me`
    wake_pending: bool,
    /// Set while parked in `block_me`
    blocked: Option<BlockReason>,
    zapped: bool,
    /// Number of times the process has parked
    blocks: usize,
}

/// Mock HAL for kernel tests
pub struct MockHal {
    /// Simulated time in nanoseconds
    time: AtomicU64,
    /// Captured debug messages
    debug_log: Mutex<Vec<String>>,
    /// Next process ID to assign
    next_pid: AtomicU64,
    /// Simulated processes
    processes: Mutex<HashMap<u64, MockProcess>>,
    /// Signalled on every block / wake transition
    changed: Condvar,
    /// Device status registers
    devices: Mutex<HashMap<(DeviceKind, usize), i32>>,
    disk_units: usize,
    term_units: usize,
    kernel_mode: AtomicBool,
    interrupts_enabled: AtomicBool,
    time_slices: AtomicUsize,
}

impl MockHal {
    /// Create a mock HAL with 2 disk units and 4 terminal units
    pub fn new() -> Self {
        Self::with_units(2, 4)
    }

    /// Create a mock HAL with the given device unit counts
    pub fn with_units(disk_units: usize, term_units: usize) -> Self {
        Self {
            time: AtomicU64::new(0),
            debug_log: Mutex::new(Vec::new()),
            next_pid: AtomicU64::new(1),
            processes: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
            devices: Mutex::new(HashMap::new()),
            disk_units,
            term_units,
            kernel_mode: AtomicBool::new(true),
            interrupts_enabled: AtomicBool::new(true),
            time_slices: AtomicUsize::new(0),
        }
    }

    // === Processes ===

    fn register(&self, name: &str) -> u64 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.processes.lock().insert(
            pid,
            MockProcess {
                name: name.to_string(),
                ..MockProcess::default()
            },
        );
        pid
    }

    /// Register the calling thread as a new process and return its pid
    pub fn attach(&self, name: &str) -> u64 {
        let pid = self.register(name);
        CURRENT_PID.with(|c| c.set(pid));
        pid
    }

    /// Run `f` on a new thread acting as a new process
    pub fn spawn<F, T>(&self, name: &str, f: F) -> (u64, JoinHandle<T>)
    where
        F: FnOnce(u64) -> T + Send + 'static,
        T: Send + 'static,
    {
        let pid = self.register(name);
        let handle = thread::Builder::new()
            .name(format!("{}-{}", name, pid))
            .spawn(move || {
                CURRENT_PID.with(|c| c.set(pid));
                f(pid)
            })
            .unwrap_or_else(|e| panic!("failed to spawn {}: {}", name, e));
        (pid, handle)
    }

    /// Mark a process for cancellation and hand it a wake token.
    ///
    /// The token is left even if the process has not parked yet, so a
    /// cancel that lands between queueing and `block_me` is not lost.
    pub fn zap(&self, pid: u64) {
        let mut procs = self.processes.lock();
        if let Some(p) = procs.get_mut(&pid) {
            p.zapped = true;
            p.wake_pending = true;
        }
        self.changed.notify_all();
    }

    /// Wait until `pid` is parked in `block_me`. Panics on timeout.
    pub fn wait_until_blocked(&self, pid: u64) -> BlockReason {
        let deadline = Instant::now() + BLOCK_TIMEOUT;
        let mut procs = self.processes.lock();
        loop {
            if let Some(reason) = procs.get(&pid).and_then(|p| p.blocked) {
                return reason;
            }
            if self.changed.wait_until(&mut procs, deadline).timed_out() {
                panic!("pid {} never blocked", pid);
            }
        }
    }

    /// Reason `pid` is parked, if it is
    pub fn blocked_reason(&self, pid: u64) -> Option<BlockReason> {
        self.processes.lock().get(&pid).and_then(|p| p.blocked)
    }

    /// Number of times `pid` has parked
    pub fn block_count(&self, pid: u64) -> usize {
        self.processes.lock().get(&pid).map(|p| p.blocks).unwrap_or(0)
    }

    /// Name a process was registered with
    pub fn process_name(&self, pid: u64) -> Option<String> {
        self.processes.lock().get(&pid).map(|p| p.name.clone())
    }

    // === CPU state ===

    /// Simulate a call from user mode
    pub fn set_kernel_mode(&self, kernel: bool) {
        self.kernel_mode.store(kernel, Ordering::SeqCst);
    }

    /// Whether interrupts are currently unmasked
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled.load(Ordering::SeqCst)
    }

    /// Number of `time_slice` calls so far
    pub fn time_slice_count(&self) -> usize {
        self.time_slices.load(Ordering::SeqCst)
    }

    // === Devices ===

    /// Set the status register of a device unit
    pub fn set_device_status(&self, kind: DeviceKind, unit: usize, status: i32) {
        self.devices.lock().insert((kind, unit), status);
    }

    fn unit_exists(&self, kind: DeviceKind, unit: usize) -> bool {
        match kind {
            DeviceKind::Clock => unit == 0,
            DeviceKind::Disk => unit < self.disk_units,
            DeviceKind::Terminal => unit < self.term_units,
            DeviceKind::Syscall => false,
        }
    }

    // === Time & Debug ===

    /// Advance the simulated time by the given duration
    pub fn advance_time(&self, nanos: u64) {
        self.time.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        self.debug_log.lock().clone()
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        self.debug_log.lock().iter().any(|msg| msg.contains(substr))
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl HAL for MockHal {
    fn current_pid(&self) -> u64 {
        CURRENT_PID.with(|c| c.get())
    }

    fn block_me(&self, reason: BlockReason) {
        let pid = self.current_pid();
        let mut procs = self.processes.lock();
        let Some(p) = procs.get_mut(&pid) else {
            return;
        };
        if p.wake_pending {
            p.wake_pending = false;
            return;
        }
        p.blocked = Some(reason);
        p.blocks += 1;
        self.changed.notify_all();

        while !procs.get(&pid).map(|p| p.wake_pending).unwrap_or(true) {
            self.changed.wait(&mut procs);
        }
        if let Some(p) = procs.get_mut(&pid) {
            p.wake_pending = false;
            p.blocked = None;
        }
        self.changed.notify_all();
    }

    fn unblock_proc(&self, pid: u64) -> Result<(), HalError> {
        let mut procs = self.processes.lock();
        let p = procs.get_mut(&pid).ok_or(HalError::ProcessNotFound)?;
        p.wake_pending = true;
        self.changed.notify_all();
        Ok(())
    }

    fn is_zapped(&self) -> bool {
        let pid = self.current_pid();
        self.processes
            .lock()
            .get(&pid)
            .map(|p| p.zapped)
            .unwrap_or(false)
    }

    fn time_slice(&self) {
        self.time_slices.fetch_add(1, Ordering::SeqCst);
    }

    fn in_kernel_mode(&self) -> bool {
        self.kernel_mode.load(Ordering::SeqCst)
    }

    fn disable_interrupts(&self) {
        self.interrupts_enabled.store(false, Ordering::SeqCst);
    }

    fn enable_interrupts(&self) {
        self.interrupts_enabled.store(true, Ordering::SeqCst);
    }

    fn device_input(&self, kind: DeviceKind, unit: usize) -> Result<i32, HalError> {
        if !self.unit_exists(kind, unit) {
            return Err(HalError::InvalidArgument);
        }
        Ok(self.devices.lock().get(&(kind, unit)).copied().unwrap_or(0))
    }

    fn now_nanos(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.lock().push(msg.to_string());
    }

    fn halt(&self, code: i32) -> ! {
        self.debug_write(&format!("halt({})", code));
        panic!("halt({})", code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mock_hal_time() {
        let hal = MockHal::new();
        assert_eq!(hal.now_nanos(), 0);
        hal.advance_time(1000);
        assert_eq!(hal.now_nanos(), 1000);
    }

    #[test]
    fn test_mock_hal_debug_log() {
        let hal = MockHal::new();
        hal.debug_write("hello");
        assert!(hal.has_log_containing("hell"));
        assert_eq!(hal.get_debug_log().len(), 1);
    }

    #[test]
    fn test_attach_sets_current_pid() {
        let hal = MockHal::new();
        let pid = hal.attach("main");
        assert_eq!(hal.current_pid(), pid);
        assert_eq!(hal.process_name(pid).as_deref(), Some("main"));
    }

    #[test]
    fn test_wake_before_block_is_not_lost() {
        let hal = MockHal::new();
        let pid = hal.attach("early");
        hal.unblock_proc(pid).unwrap();
        // Returns at once, consuming the token
        hal.block_me(BlockReason::Receive);
        assert_eq!(hal.block_count(pid), 0);
    }

    #[test]
    fn test_block_and_unblock_across_threads() {
        let hal = Arc::new(MockHal::new());
        let h = hal.clone();
        let (pid, handle) = hal.spawn("sleeper", move |_| {
            h.block_me(BlockReason::Send);
            7
        });
        assert_eq!(hal.wait_until_blocked(pid), BlockReason::Send);
        hal.unblock_proc(pid).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
        assert_eq!(hal.blocked_reason(pid), None);
        assert_eq!(hal.block_count(pid), 1);
    }

    #[test]
    fn test_zap_wakes_blocked_process() {
        let hal = Arc::new(MockHal::new());
        let h = hal.clone();
        let (pid, handle) = hal.spawn("victim", move |_| {
            h.block_me(BlockReason::Receive);
            h.is_zapped()
        });
        hal.wait_until_blocked(pid);
        hal.zap(pid);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_zap_before_block_is_not_lost() {
        let hal = MockHal::new();
        let pid = hal.attach("early-victim");
        hal.zap(pid);
        hal.block_me(BlockReason::Receive);
        assert!(hal.is_zapped());
        assert_eq!(hal.block_count(pid), 0);
    }

    #[test]
    fn test_unblock_unknown_process() {
        let hal = MockHal::new();
        assert_eq!(hal.unblock_proc(99), Err(HalError::ProcessNotFound));
    }

    #[test]
    fn test_device_units() {
        let hal = MockHal::with_units(1, 2);
        hal.set_device_status(DeviceKind::Terminal, 1, 42);
        assert_eq!(hal.device_input(DeviceKind::Terminal, 1), Ok(42));
        assert_eq!(hal.device_input(DeviceKind::Disk, 0), Ok(0));
        assert_eq!(
            hal.device_input(DeviceKind::Disk, 1),
            Err(HalError::InvalidArgument)
        );
        assert_eq!(
            hal.device_input(DeviceKind::Clock, 1),
            Err(HalError::InvalidArgument)
        );
        assert_eq!(
            hal.device_input(DeviceKind::Syscall, 0),
            Err(HalError::InvalidArgument)
        );
    }

    #[test]
    #[should_panic(expected = "halt(1)")]
    fn test_halt_panics() {
        MockHal::new().halt(1);
    }
}
