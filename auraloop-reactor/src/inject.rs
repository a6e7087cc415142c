//! Cross-thread injection: the only part of the loop touched from threads
//! other than the one running it. A plain `Mutex`-guarded queue, not an
//! intrusive list — injected work is submitted rarely enough (and crosses
//! a thread boundary) that the allocation a `Box` costs here is not worth
//! chasing, unlike the hot scheduling path the coarse timer wheel serves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Job = Box<dyn FnOnce() + Send>;

struct Entry {
    cancelled: Arc<AtomicBool>,
    job: Job,
}

/// The loop-owned side of the cross-thread inject queue. Every field that
/// crosses a thread boundary lives behind `queue`'s mutex; nothing else in
/// the event loop is shared this way.
#[derive(Default)]
pub(crate) struct InjectQueue {
    queue: Mutex<Vec<Entry>>,
    /// Set once `inject_break` has been submitted, checked by the loop
    /// after draining so repeated submissions don't queue multiple quits.
    quit_injected: AtomicBool,
}

impl InjectQueue {
    pub(crate) fn new() -> Self {
        Self { queue: Mutex::new(Vec::new()), quit_injected: AtomicBool::new(false) }
    }

    /// Submits `job` for the next drain. Returns a handle that can cancel
    /// it before it runs (cancellation after the drain has started has no
    /// effect).
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> InjectHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.queue.lock().unwrap().push(Entry { cancelled: Arc::clone(&cancelled), job: Box::new(job) });
        InjectHandle { cancelled }
    }

    pub(crate) fn request_quit(&self) {
        self.quit_injected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_quit_requested(&self) -> bool {
        self.quit_injected.swap(false, Ordering::SeqCst)
    }

    /// Drains the queue into a local `Vec` under the lock, then runs each
    /// non-cancelled job after releasing it, so a job that itself submits
    /// new work doesn't deadlock on the same mutex.
    pub(crate) fn drain(&self) {
        let entries = std::mem::take(&mut *self.queue.lock().unwrap());
        for entry in entries {
            if !entry.cancelled.load(Ordering::SeqCst) {
                (entry.job)();
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }
}

/// A handle returned by submitting work across threads. Dropping it has no
/// effect on an already-submitted job; call [`InjectHandle::cancel`]
/// explicitly to suppress it before the loop drains the queue.
#[derive(Debug, Clone)]
pub struct InjectHandle {
    cancelled: Arc<AtomicBool>,
}

impl InjectHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn drains_in_submission_order() {
        let queue = InjectQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            queue.submit(move || order.lock().unwrap().push(i));
        }
        queue.drain();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_job_does_not_run() {
        let queue = InjectQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let handle = queue.submit(move || ran2.store(true, Ordering::SeqCst));
        handle.cancel();
        queue.drain();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn quit_request_latches_until_taken() {
        let queue = InjectQueue::new();
        assert!(!queue.take_quit_requested());
        queue.request_quit();
        assert!(queue.take_quit_requested());
        assert!(!queue.take_quit_requested());
    }
}
