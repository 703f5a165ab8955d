//! Binary event with manual or automatic reset

use parking_lot::{Condvar, Mutex};

/// Reset behaviour of an [`Event`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventMode {
    /// Stays signaled until [`Event::reset`] is called; wakes every waiter
    ManualReset,
    /// Cleared by the single waiter that observes it
    AutoReset,
}

/// Binary event
///
/// Waiting blocks the calling thread on a condition variable, it never spins.
#[derive(Debug)]
pub struct Event {
    mode: EventMode,
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Create a new, unsignaled event
    pub fn new(mode: EventMode) -> Self {
        Self {
            mode,
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Create a manual-reset event
    pub fn manual() -> Self {
        Self::new(EventMode::ManualReset)
    }

    /// Create an auto-reset event
    pub fn auto() -> Self {
        Self::new(EventMode::AutoReset)
    }

    /// Reset mode of this event
    pub fn mode(&self) -> EventMode {
        self.mode
    }

    /// Signal the event
    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        match self.mode {
            EventMode::ManualReset => {
                self.cond.notify_all();
            }
            EventMode::AutoReset => {
                self.cond.notify_one();
            }
        }
    }

    /// Clear the event
    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Block until the event is signaled
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
        if self.mode == EventMode::AutoReset {
            *signaled = false;
        }
    }

    /// Non-blocking check; consumes the signal for auto-reset events
    pub fn poll(&self) -> bool {
        let mut signaled = self.signaled.lock();
        if !*signaled {
            return false;
        }
        if self.mode == EventMode::AutoReset {
            *signaled = false;
        }
        true
    }

    /// Whether the event is currently signaled, without consuming it
    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_manual_event_stays_set() {
        let event = Event::manual();
        assert!(!event.poll());

        event.set();
        assert!(event.poll());
        assert!(event.poll());
        assert!(event.is_set());

        event.reset();
        assert!(!event.poll());
    }

    #[test]
    fn test_auto_event_consumed_by_poll() {
        let event = Event::auto();
        event.set();
        assert!(event.poll());
        assert!(!event.poll());
    }

    #[test]
    fn test_auto_event_consumed_by_wait() {
        let event = Event::auto();
        event.set();
        event.wait();
        assert!(!event.is_set());
    }

    #[test]
    fn test_wait_blocks_until_set() {
        let event = Arc::new(Event::manual());
        let woke = Arc::new(AtomicUsize::new(0));

        let handle = {
            let event = Arc::clone(&event);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                event.wait();
                woke.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(woke.load(Ordering::SeqCst), 0);

        event.set();
        handle.join().unwrap();
        assert_eq!(woke.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_event_wakes_all_waiters() {
        let event = Arc::new(Event::manual());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        event.set();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_mode_accessor() {
        assert_eq!(Event::manual().mode(), EventMode::ManualReset);
        assert_eq!(Event::auto().mode(), EventMode::AutoReset);
    }
}
