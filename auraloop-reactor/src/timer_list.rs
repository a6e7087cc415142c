//! Fine timer list: an ordered set for precise or long-horizon deadlines
//! that the coarse wheel's ~1 s bucketing can't represent well.

use auraloop_intrusive::rb_tree::{RbHook, RbLinked};
use auraloop_intrusive::RbTree;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnMut()>;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A single fine-resolution timer.
///
/// Like [`crate::timer_wheel::CoarseTimerEvent`], this is a "plain" hook:
/// the caller must cancel a still-scheduled timer before it drops.
pub struct FineTimerEvent {
    hook: RbHook<FineTimerEvent>,
    due: Cell<Option<Instant>>,
    /// Tie-breaker so timers inserted with an equal `due` still come out
    /// of the tree in insertion order.
    sequence: Cell<u64>,
    callback: RefCell<Callback>,
}

impl std::fmt::Debug for FineTimerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FineTimerEvent")
            .field("due", &self.due.get())
            .field("linked", &self.hook.is_linked())
            .finish()
    }
}

impl PartialEq for FineTimerEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due.get() == other.due.get() && self.sequence.get() == other.sequence.get()
    }
}
impl Eq for FineTimerEvent {}

impl PartialOrd for FineTimerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FineTimerEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.get().cmp(&other.due.get()).then_with(|| self.sequence.get().cmp(&other.sequence.get()))
    }
}

// SAFETY: `hook` is a plain field never moved while linked; the caller
// keeps the owning `FineTimerEvent` pinned in place for as long as it
// stays scheduled.
unsafe impl RbLinked for FineTimerEvent {
    fn link(&self) -> &RbHook<Self> {
        &self.hook
    }
}

impl FineTimerEvent {
    #[must_use]
    pub fn new(callback: impl FnMut() + 'static) -> Self {
        Self {
            hook: RbHook::new(),
            due: Cell::new(None),
            sequence: Cell::new(0),
            callback: RefCell::new(Box::new(callback)),
        }
    }

    #[must_use]
    pub fn due(&self) -> Option<Instant> {
        self.due.get()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.hook.is_linked()
    }

    fn fire(&self) {
        self.due.set(None);
        (self.callback.borrow_mut())();
    }
}

/// Ordered set of [`FineTimerEvent`]s, keyed by due time, FIFO on ties.
#[derive(Default)]
pub struct FineTimerList {
    tree: RbTree<FineTimerEvent>,
}

impl std::fmt::Debug for FineTimerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FineTimerList").field("len", &self.tree.len()).finish()
    }
}

impl FineTimerList {
    #[must_use]
    pub fn new() -> Self {
        Self { tree: RbTree::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Schedules `timer` to fire at `due`.
    ///
    /// # Panics
    /// Panics in debug builds if `timer` is already scheduled.
    pub fn insert(&mut self, timer: &FineTimerEvent, due: Instant) {
        debug_assert!(!timer.is_scheduled(), "timer already scheduled");
        timer.due.set(Some(due));
        timer.sequence.set(NEXT_SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed));
        self.tree.insert(timer);
    }

    /// Cancels `timer`. No-op if it was not scheduled.
    pub fn cancel(&mut self, timer: &FineTimerEvent) {
        if self.tree.erase(timer) {
            timer.due.set(None);
        }
    }

    /// Pops and fires every timer whose `due <= now`. Returns the
    /// remaining time until the next deadline, or `None` if empty.
    pub fn run(&mut self, now: Instant) -> Option<Duration> {
        while let Some(front) = self.tree.front() {
            match front.due() {
                Some(d) if d <= now => {
                    let timer = self.tree.pop_front().expect("front just confirmed present");
                    timer.fire();
                }
                _ => break,
            }
        }
        self.tree.front().map(|front| front.due().expect("linked timer always has a due time").saturating_duration_since(now))
    }
}
