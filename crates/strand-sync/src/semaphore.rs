//! Counting semaphore

use parking_lot::{Condvar, Mutex};

/// Counting semaphore
///
/// `wait` blocks on a condition variable while no permit is available.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Create a semaphore holding `initial` permits
    pub fn new(initial: usize) -> Self {
        Self {
            permits: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Release one permit
    pub fn signal(&self) {
        self.release(1);
    }

    /// Release `count` permits
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += count;
        if count == 1 {
            self.cond.notify_one();
        } else {
            self.cond.notify_all();
        }
    }

    /// Block until a permit is available and take it
    pub fn wait(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Take a permit if one is available
    pub fn poll(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Number of permits currently available
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_poll_consumes_permits() {
        let sem = Semaphore::new(2);
        assert!(sem.poll());
        assert!(sem.poll());
        assert!(!sem.poll());
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_release_many() {
        let sem = Semaphore::new(0);
        sem.release(3);
        assert_eq!(sem.available(), 3);
        sem.release(0);
        assert_eq!(sem.available(), 3);
    }

    #[test]
    fn test_wait_blocks_until_signal() {
        let sem = Arc::new(Semaphore::new(0));

        let handle = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        sem.signal();
        handle.join().unwrap();
        assert_eq!(sem.available(), 0);
    }

    #[test]
    fn test_permits_are_not_duplicated() {
        let sem = Arc::new(Semaphore::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.wait())
            })
            .collect();

        sem.release(8);
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sem.available(), 0);
    }
}
