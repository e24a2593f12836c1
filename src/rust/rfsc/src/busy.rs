// Copyright 2026 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Tracks how many background-I/O regions (consolidation, the upload timer callback) are
/// currently open, so `wait_while_busy` can block until the cache is quiescent.
#[derive(Clone)]
pub struct BusyTracker {
    count: Arc<Mutex<usize>>,
    condvar: Arc<Condvar>,
}

impl BusyTracker {
    pub fn new() -> BusyTracker {
        BusyTracker {
            count: Arc::new(Mutex::new(0)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Enters a busy region. The returned guard decrements the count and wakes any waiter on
    /// drop, including on an early return or panic unwind through the scope it guards.
    pub fn enter(&self) -> BusyScope {
        *self.count.lock() += 1;
        BusyScope {
            count: self.count.clone(),
            condvar: self.condvar.clone(),
        }
    }

    /// Blocks the calling thread until no busy region is open.
    pub fn wait_while_busy(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.condvar.wait(&mut count);
        }
    }
}

impl Default for BusyTracker {
    fn default() -> Self {
        BusyTracker::new()
    }
}

pub struct BusyScope {
    count: Arc<Mutex<usize>>,
    condvar: Arc<Condvar>,
}

impl Drop for BusyScope {
    fn drop(&mut self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn wait_while_busy_returns_immediately_when_idle() {
        let tracker = BusyTracker::new();
        tracker.wait_while_busy();
    }

    #[test]
    fn wait_while_busy_blocks_until_the_scope_is_dropped() {
        let tracker = BusyTracker::new();
        let scope = tracker.enter();

        let waiter_tracker = tracker.clone();
        let waiter = thread::spawn(move || {
            waiter_tracker.wait_while_busy();
        });

        thread::sleep(Duration::from_millis(20));
        drop(scope);
        waiter.join().unwrap();
    }

    #[test]
    fn nested_scopes_only_release_once_all_have_dropped() {
        let tracker = BusyTracker::new();
        let first = tracker.enter();
        let second = tracker.enter();

        let waiter_tracker = tracker.clone();
        let waiter = thread::spawn(move || {
            waiter_tracker.wait_while_busy();
        });

        drop(first);
        thread::sleep(Duration::from_millis(20));
        drop(second);
        waiter.join().unwrap();
    }
}
