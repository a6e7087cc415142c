//! Coarse timer wheel: cheap insert/cancel for short-lived timers at
//! roughly 1-second resolution, the common case for network I/O
//! deadlines that are usually cancelled long before they'd fire.

use auraloop_intrusive::list::{Link, Linked};
use auraloop_intrusive::DoublyLinkedList;
use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

/// One bucket spans this much wall-clock time.
pub const RESOLUTION: Duration = Duration::from_secs(1);
/// Number of buckets; together with [`RESOLUTION`] this bounds the span a
/// timer can be scheduled into a specific bucket for (2 minutes).
pub const N_BUCKETS: usize = 120;

type Callback = Box<dyn FnMut()>;

/// A single coarse-resolution timer.
///
/// This is a "plain" intrusive hook (see `auraloop_intrusive::list` module
/// docs): the caller must call [`EventLoop::cancel_coarse_timer`](crate::event_loop::EventLoop::cancel_coarse_timer)
/// before dropping a still-scheduled timer, or before it goes out of scope
/// some other way (e.g. a `panic!` unwinding past it). Letting a linked
/// `CoarseTimerEvent` be dropped while still in the wheel leaves a dangling
/// pointer behind.
pub struct CoarseTimerEvent {
    link: Link<CoarseTimerEvent>,
    due: Cell<Option<Instant>>,
    callback: RefCell<Callback>,
}

// SAFETY: `link` is a plain field never moved while linked; callers keep
// the owning `CoarseTimerEvent` pinned in place (stack frame, `Box`, or
// struct field) for as long as it stays scheduled, mirroring every other
// hook in this crate.
unsafe impl Linked for CoarseTimerEvent {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

impl std::fmt::Debug for CoarseTimerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoarseTimerEvent")
            .field("due", &self.due.get())
            .field("linked", &self.link.is_linked())
            .finish()
    }
}

impl CoarseTimerEvent {
    #[must_use]
    pub fn new(callback: impl FnMut() + 'static) -> Self {
        Self { link: Link::new(), due: Cell::new(None), callback: RefCell::new(Box::new(callback)) }
    }

    #[must_use]
    pub fn due(&self) -> Option<Instant> {
        self.due.get()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.link.is_linked()
    }

    fn fire(&self) {
        self.due.set(None);
        (self.callback.borrow_mut())();
    }
}

/// Bucketed timer set keyed by `due`, plus a ready-list for timers whose
/// deadline has already passed at insertion time.
pub struct CoarseTimerWheel {
    buckets: Vec<DoublyLinkedList<CoarseTimerEvent>>,
    ready: DoublyLinkedList<CoarseTimerEvent>,
    origin: Instant,
    resolution: Duration,
    n_buckets: usize,
    last_time: Instant,
    empty: bool,
}

impl std::fmt::Debug for CoarseTimerWheel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoarseTimerWheel").field("empty", &self.empty).finish()
    }
}

impl CoarseTimerWheel {
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolution(RESOLUTION, N_BUCKETS)
    }

    #[must_use]
    pub fn with_resolution(resolution: Duration, n_buckets: usize) -> Self {
        let now = Instant::now();
        Self {
            buckets: (0..n_buckets).map(|_| DoublyLinkedList::new()).collect(),
            ready: DoublyLinkedList::new(),
            origin: now,
            resolution,
            n_buckets,
            last_time: now,
            empty: true,
        }
    }

    fn span(&self) -> Duration {
        self.resolution * self.n_buckets as u32
    }

    fn bucket_index(&self, due: Instant) -> usize {
        let elapsed = due.saturating_duration_since(self.origin);
        let ticks = elapsed.as_nanos() / self.resolution.as_nanos().max(1);
        (ticks as usize) % self.n_buckets
    }

    /// Schedules `timer` to fire at `due`, evaluated against `now`.
    ///
    /// # Panics
    /// Panics in debug builds if `timer` is already scheduled.
    pub fn insert(&mut self, timer: &CoarseTimerEvent, due: Instant, now: Instant) {
        debug_assert!(!timer.is_scheduled(), "timer already scheduled");
        timer.due.set(Some(due));
        if due <= now {
            self.ready.push_back(timer);
        } else {
            let idx = self.bucket_index(due);
            self.buckets[idx].push_back(timer);
        }
        self.empty = false;
    }

    /// Cancels `timer`. No-op if it was not scheduled.
    pub fn cancel(&mut self, timer: &CoarseTimerEvent) {
        if !timer.is_scheduled() {
            return;
        }
        let due = timer.due();
        timer.due.set(None);
        if self.ready.unlink(timer) {
            return;
        }
        let idx = due.map_or(self.bucket_index(self.last_time), |d| self.bucket_index(d));
        if !self.buckets[idx].unlink(timer) {
            for bucket in &mut self.buckets {
                if bucket.unlink(timer) {
                    break;
                }
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Runs all due timers. Returns the duration until the wheel next has
    /// work, or `None` if nothing is scheduled.
    pub fn run(&mut self, now: Instant) -> Option<Duration> {
        self.ready.clear_and_dispose(CoarseTimerEvent::fire);

        let time_warped = now < self.last_time;
        let gap = now.saturating_duration_since(self.last_time);
        let full_scan = time_warped || gap + self.resolution >= self.span();

        if full_scan {
            for idx in 0..self.n_buckets {
                self.run_one_bucket(idx, now);
            }
        } else {
            // The common case: scan only the buckets whose time range lies
            // between the last processed instant and now.
            let start = self.bucket_index(self.last_time);
            let end = self.bucket_index(now);
            let mut idx = start;
            loop {
                self.run_one_bucket(idx, now);
                if idx == end {
                    break;
                }
                idx = (idx + 1) % self.n_buckets;
            }
        }

        self.last_time = now;
        self.empty = self.ready.is_empty() && self.buckets.iter().all(DoublyLinkedList::is_empty);
        if self.empty {
            return None;
        }
        Some(self.next_wait(now))
    }

    /// Moves every element out of bucket `idx`; fires those now due,
    /// reinserts the rest into the same bucket. Uses a temporary owned
    /// list so a timer's callback firing during the scan (which may
    /// itself schedule a new timer) can't alias this bucket's storage.
    fn run_one_bucket(&mut self, idx: usize, now: Instant) {
        let mut bucket = std::mem::take(&mut self.buckets[idx]);
        let mut pending = DoublyLinkedList::new();
        bucket.clear_and_dispose(|timer| {
            if timer.due().is_some_and(|d| d <= now) {
                timer.fire();
            } else {
                pending.push_back(timer);
            }
        });
        self.buckets[idx] = pending;
    }

    fn next_wait(&self, now: Instant) -> Duration {
        for offset in 0..self.n_buckets {
            let idx = (self.bucket_index(now) + offset) % self.n_buckets;
            if !self.buckets[idx].is_empty() {
                let bucket_start = self.bucket_start_time(idx, now);
                let bucket_end = bucket_start + self.resolution;
                return bucket_end.saturating_duration_since(now);
            }
        }
        self.resolution
    }

    fn bucket_start_time(&self, idx: usize, near: Instant) -> Instant {
        let near_idx = self.bucket_index(near);
        let delta_buckets = if idx >= near_idx { idx - near_idx } else { idx + self.n_buckets - near_idx };
        near + self.resolution * delta_buckets as u32
    }
}

impl Default for CoarseTimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fires_in_due_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let order_a = Rc::clone(&order);
        let order_b = Rc::clone(&order);
        let a = CoarseTimerEvent::new(move || order_a.borrow_mut().push('a'));
        let b = CoarseTimerEvent::new(move || order_b.borrow_mut().push('b'));

        let mut wheel = CoarseTimerWheel::new();
        let t0 = Instant::now();
        wheel.insert(&b, t0 + Duration::from_millis(1500), t0);
        wheel.insert(&a, t0 + Duration::from_millis(500), t0);

        wheel.run(t0 + Duration::from_millis(600));
        assert_eq!(*order.borrow(), vec!['a']);
        wheel.run(t0 + Duration::from_millis(1600));
        assert_eq!(*order.borrow(), vec!['a', 'b']);
        assert!(wheel.is_empty());
    }

    #[test]
    fn cancel_before_due_prevents_fire() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = Rc::clone(&fired);
        let timer = CoarseTimerEvent::new(move || *fired2.borrow_mut() = true);
        let mut wheel = CoarseTimerWheel::new();
        let t0 = Instant::now();
        wheel.insert(&timer, t0 + Duration::from_millis(500), t0);
        wheel.cancel(&timer);
        assert!(!timer.is_scheduled());
        wheel.run(t0 + Duration::from_secs(1));
        assert!(!*fired.borrow());
    }

    #[test]
    fn already_due_timer_goes_to_ready_list() {
        let fired = Rc::new(RefCell::new(false));
        let fired2 = Rc::clone(&fired);
        let timer = CoarseTimerEvent::new(move || *fired2.borrow_mut() = true);
        let mut wheel = CoarseTimerWheel::new();
        let t0 = Instant::now();
        wheel.insert(&timer, t0, t0);
        wheel.run(t0);
        assert!(*fired.borrow());
    }

    #[test]
    fn wraparound_fires_every_bucket() {
        let count = Rc::new(RefCell::new(0usize));
        let timers: Vec<CoarseTimerEvent> = (0..N_BUCKETS - 1)
            .map(|_| {
                let c = Rc::clone(&count);
                CoarseTimerEvent::new(move || *c.borrow_mut() += 1)
            })
            .collect();
        let mut wheel = CoarseTimerWheel::new();
        let t0 = Instant::now();
        for (k, timer) in timers.iter().enumerate() {
            wheel.insert(timer, t0 + Duration::from_secs((k + 1) as u64), t0);
        }
        let mut now = t0;
        for _ in 0..(N_BUCKETS) {
            now += Duration::from_secs(1);
            wheel.run(now);
        }
        assert_eq!(*count.borrow(), N_BUCKETS - 1);
    }
}
