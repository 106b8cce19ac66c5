//! Single send credit
//!
//! One line may be outstanding at a time. Senders take the credit before
//! choosing what to send; the reader gives it back on every acknowledgement.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Binary send permit
#[derive(Debug)]
pub struct Credit {
    available: Mutex<bool>,
    changed: Condvar,
}

impl Default for Credit {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Credit {
    /// Create a credit, initially available or not
    pub fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            changed: Condvar::new(),
        }
    }

    /// Take the credit, waking every `poll` to consult `cancelled`.
    ///
    /// Returns false when cancelled before the credit became free.
    pub fn acquire(&self, poll: Duration, cancelled: impl Fn() -> bool) -> bool {
        let mut available = self.available.lock();
        loop {
            if *available {
                *available = false;
                return true;
            }
            if cancelled() {
                return false;
            }
            self.changed.wait_for(&mut available, poll);
        }
    }

    /// Take the credit only if it is free right now
    pub fn try_acquire(&self) -> bool {
        let mut available = self.available.lock();
        std::mem::replace(&mut *available, false)
    }

    /// Give the credit back
    pub fn release(&self) {
        *self.available.lock() = true;
        self.changed.notify_all();
    }

    /// Whether a send may start now
    pub fn is_available(&self) -> bool {
        *self.available.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_consumes_until_release() {
        let credit = Credit::default();
        assert!(credit.try_acquire());
        assert!(!credit.try_acquire());
        assert!(!credit.acquire(Duration::from_millis(1), || true));
        credit.release();
        assert!(credit.acquire(Duration::from_millis(1), || false));
    }

    #[test]
    fn release_wakes_waiter() {
        let credit = Arc::new(Credit::new(false));
        let waiter = {
            let credit = Arc::clone(&credit);
            thread::spawn(move || credit.acquire(Duration::from_millis(5), || false))
        };
        thread::sleep(Duration::from_millis(20));
        credit.release();
        assert!(waiter.join().unwrap());
        assert!(!credit.is_available());
    }

    #[test]
    fn cancellation_is_observed_within_a_poll() {
        let credit = Arc::new(Credit::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let waiter = {
            let credit = Arc::clone(&credit);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                credit.acquire(Duration::from_millis(5), || stop.load(Ordering::SeqCst))
            })
        };
        stop.store(true, Ordering::SeqCst);
        assert!(!waiter.join().unwrap());
    }
}
