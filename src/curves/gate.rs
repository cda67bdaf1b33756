//! Completion gate of one generation batch.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct GateState {
    batch: u64,
    outstanding: usize,
    open: bool,
}

/// Outstanding-job counter with a single gate, owned by one batch at a time.
///
/// Arming hands the gate to a batch and closes it (unless the batch has no
/// jobs). Only the batch that armed it can count jobs or release it, so a
/// superseded batch finishing late never opens the gate of its successor.
/// Waiters block until the gate opens.
#[derive(Debug)]
pub struct CompletionGate {
    state: Mutex<GateState>,
    opened: Condvar,
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGate {
    /// A new gate is open and owned by no batch (`0`).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                batch: 0,
                outstanding: 0,
                open: true,
            }),
            opened: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the gate to `batch` with `jobs` outstanding jobs and close it;
    /// `0` jobs leaves it open.
    pub fn arm(&self, batch: u64, jobs: usize) {
        let mut state = self.lock();
        state.batch = batch;
        state.outstanding = jobs;
        state.open = jobs == 0;
        if state.open {
            self.opened.notify_all();
        }
    }

    /// Batch currently owning the gate.
    pub fn batch(&self) -> u64 {
        self.lock().batch
    }

    /// Count one finished job of `batch`; returns how many remain.
    pub fn job_finished(&self, batch: u64) -> usize {
        let mut state = self.lock();
        if state.batch == batch {
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        state.outstanding
    }

    /// Open the gate on behalf of `batch` and wake every waiter.
    ///
    /// Returns `false` when the gate was already open or belongs to another
    /// batch; a double or late release is harmless.
    pub fn release(&self, batch: u64) -> bool {
        let mut state = self.lock();
        if state.batch != batch || state.open {
            return false;
        }
        state.outstanding = 0;
        state.open = true;
        self.opened.notify_all();
        true
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Block until the gate opens or `timeout` elapses (`None` = unbounded).
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let state = self.lock();
        match timeout {
            None => {
                let state = self
                    .opened
                    .wait_while(state, |s| !s.open)
                    .unwrap_or_else(PoisonError::into_inner);
                state.open
            }
            Some(limit) => {
                let (state, _) = self
                    .opened
                    .wait_timeout_while(state, limit, |s| !s.open)
                    .unwrap_or_else(PoisonError::into_inner);
                state.open
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn starts_open() {
        let gate = CompletionGate::new();
        assert!(gate.is_open());
        assert!(gate.wait(Some(Duration::ZERO)));
    }

    #[test]
    fn armed_gate_times_out() {
        let gate = CompletionGate::new();
        gate.arm(1, 3);
        assert!(!gate.is_open());
        assert!(!gate.wait(Some(Duration::from_millis(10))));
        assert_eq!(gate.job_finished(1), 2);
        assert_eq!(gate.outstanding(), 2);
    }

    #[test]
    fn arming_zero_jobs_keeps_it_open() {
        let gate = CompletionGate::new();
        gate.arm(1, 0);
        assert!(gate.is_open());
    }

    #[test]
    fn double_release_is_harmless() {
        let gate = CompletionGate::new();
        gate.arm(1, 1);
        assert!(gate.release(1));
        assert!(!gate.release(1));
        assert!(gate.is_open());
    }

    #[test]
    fn job_finished_saturates() {
        let gate = CompletionGate::new();
        assert_eq!(gate.job_finished(0), 0);
    }

    #[test]
    fn superseded_batch_cannot_open_gate() {
        let gate = CompletionGate::new();
        gate.arm(1, 1);
        gate.arm(2, 2);
        assert_eq!(gate.batch(), 2);
        assert!(!gate.release(1));
        assert_eq!(gate.job_finished(1), 2);
        assert!(!gate.is_open());
        assert!(!gate.wait(Some(Duration::ZERO)));

        assert!(gate.release(2));
        assert!(gate.wait(Some(Duration::ZERO)));
    }

    #[test]
    fn release_wakes_waiters() {
        let gate = Arc::new(CompletionGate::new());
        gate.arm(7, 2);
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait(None))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        gate.release(7);
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }
}
