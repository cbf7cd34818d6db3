use std::sync::atomic::{fence, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Sleep/wake point for one direction of a queue.
///
/// Wakers never touch the mutex unless someone is registered as sleeping, so
/// the uncontended push/pop path stays lock free.
pub(crate) struct WaitGate {
    lock: Mutex<()>,
    condvar: Condvar,
    sleepers: AtomicUsize,
}

impl WaitGate {
    pub(crate) fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            sleepers: AtomicUsize::new(0),
        }
    }

    /// Blocks the calling thread until `ready` returns true.
    ///
    /// The sleeper is registered before `ready` is evaluated under the lock,
    /// pairing with the fence in `has_sleepers` so a publish cannot slip between the
    /// check and the wait.
    pub(crate) fn wait_until<F: FnMut() -> bool>(&self, mut ready: F) {
        let mut guard = self.lock.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        fence(Ordering::SeqCst);
        while !ready() {
            self.condvar.wait(&mut guard);
        }
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn notify_one(&self) {
        if self.has_sleepers() {
            let _guard = self.lock.lock();
            self.condvar.notify_one();
        }
    }

    pub(crate) fn notify_all(&self) {
        if self.has_sleepers() {
            let _guard = self.lock.lock();
            self.condvar.notify_all();
        }
    }

    fn has_sleepers(&self) -> bool {
        fence(Ordering::SeqCst);
        self.sleepers.load(Ordering::SeqCst) > 0
    }
}
