//! Defer and idle queues: "run at the top of the next iteration" and "run
//! only when nothing else is pending", respectively. Both are backed by
//! the same intrusive list; an [`IdleEvent`] is just a [`DeferEvent`]
//! scheduled into the loop's idle queue instead of its defer queue.

use crate::event_loop::EventLoop;
use auraloop_intrusive::list::{Link, Linked};
use auraloop_intrusive::DoublyLinkedList;
use std::cell::RefCell;

type Callback = Box<dyn FnMut()>;

pub(crate) struct DeferRecord {
    link: Link<DeferRecord>,
    callback: RefCell<Callback>,
}

// SAFETY: `link` is a plain field never moved while linked; the owning
// `DeferEvent` keeps its `Rc<DeferRecord>` alive for as long as the record
// stays scheduled (the loop's queue holds the other half of that `Rc`).
unsafe impl Linked for DeferRecord {
    fn link(&self) -> &Link<Self> {
        &self.link
    }
}

impl DeferRecord {
    fn fire(&self) {
        (self.callback.borrow_mut())();
    }
}

/// A thin FIFO queue of [`DeferRecord`]s. Used for both the "defer"
/// (drained at the top of every iteration) and "idle" (drained one at a
/// time, only when nothing else is pending) roles described in the event
/// loop's module docs.
#[derive(Default)]
pub(crate) struct DeferQueue {
    list: DoublyLinkedList<DeferRecord>,
}

impl DeferQueue {
    pub(crate) fn new() -> Self {
        Self { list: DoublyLinkedList::new() }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Links `record` if it isn't already linked (idempotent schedule).
    pub(crate) fn schedule(&mut self, record: &DeferRecord) {
        if !record.link.is_linked() {
            self.list.push_back(record);
        }
    }

    pub(crate) fn cancel(&mut self, record: &DeferRecord) -> bool {
        self.list.unlink(record)
    }

    /// Drains every currently-queued record, invoking its callback.
    /// Callbacks may re-schedule themselves or others; those re-schedules
    /// are not visited in this call (they run next iteration).
    pub(crate) fn drain_all(&mut self) {
        self.list.clear_and_dispose(DeferRecord::fire);
    }

    /// Runs at most one record. Returns whether one ran.
    pub(crate) fn run_one(&mut self) -> bool {
        let Some(front) = self.list.front() else { return false };
        let ptr: *const DeferRecord = front;
        // SAFETY: `ptr` was just obtained from `front` and the record
        // stays alive (owned by its `Rc` elsewhere) across the unlink.
        let record = unsafe { &*ptr };
        self.list.unlink(record);
        record.fire();
        true
    }
}

impl std::fmt::Debug for DeferQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferQueue").field("len", &self.list.len()).finish()
    }
}

/// Which queue a [`DeferEvent`] is scheduled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Defer,
    Idle,
}

/// A caller-owned handle for "run this on the next iteration" work.
/// Dropping it cancels any pending schedule.
pub struct DeferEvent {
    record: std::rc::Rc<DeferRecord>,
    event_loop: EventLoop,
    queue: Queue,
}

impl std::fmt::Debug for DeferEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferEvent").field("queue", &self.queue).finish()
    }
}

impl DeferEvent {
    #[must_use]
    pub fn new(event_loop: EventLoop, callback: impl FnMut() + 'static) -> Self {
        Self {
            record: std::rc::Rc::new(DeferRecord { link: Link::new(), callback: RefCell::new(Box::new(callback)) }),
            event_loop,
            queue: Queue::Defer,
        }
    }

    /// Schedules this event to run at the top of the next iteration.
    pub fn schedule(&mut self) {
        self.queue = Queue::Defer;
        self.event_loop.defer_schedule(&self.record);
    }

    /// Schedules this event to run only once nothing else is pending.
    pub fn schedule_idle(&mut self) {
        self.queue = Queue::Idle;
        self.event_loop.idle_schedule(&self.record);
    }

    pub fn cancel(&mut self) {
        match self.queue {
            Queue::Defer => self.event_loop.defer_cancel(&self.record),
            Queue::Idle => self.event_loop.idle_cancel(&self.record),
        };
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.record.link.is_linked()
    }
}

impl Drop for DeferEvent {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A thin façade over [`DeferEvent`] that always schedules into the idle
/// queue, matching the "run only when idle" role from the original
/// reactor's `IdleEvent`.
pub struct IdleEvent {
    inner: DeferEvent,
}

impl IdleEvent {
    #[must_use]
    pub fn new(event_loop: EventLoop, callback: impl FnMut() + 'static) -> Self {
        Self { inner: DeferEvent::new(event_loop, callback) }
    }

    pub fn schedule(&mut self) {
        self.inner.schedule_idle();
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.inner.is_scheduled()
    }
}

impl std::fmt::Debug for IdleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleEvent").field("scheduled", &self.is_scheduled()).finish()
    }
}
