//! Per-descriptor readiness subscription.

use crate::backend::{Mask, IMPLICIT_FLAGS};
use crate::event_loop::EventLoop;
use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;
use std::rc::Rc;

pub(crate) type Callback = Box<dyn FnMut(Mask)>;

/// Shared state the event loop looks up by file descriptor to dispatch a
/// readiness notification; kept separate from [`SocketEvent`] so the loop
/// can hold a reference without borrowing the caller's handle.
pub(crate) struct SocketState {
    pub(crate) scheduled_mask: Cell<Mask>,
    pub(crate) ready_mask: Cell<Mask>,
    pub(crate) callback: RefCell<Callback>,
}

impl SocketState {
    /// Invokes the callback with `ready & scheduled`, then clears ready.
    pub(crate) fn dispatch(&self) {
        let mask = self.ready_mask.get().intersection(self.scheduled_mask.get());
        self.ready_mask.set(Mask::empty());
        if mask.is_empty() {
            return;
        }
        (self.callback.borrow_mut())(mask);
    }
}

/// A caller-owned subscription to readiness events on one file descriptor.
///
/// Dropping a `SocketEvent` cancels it: the backend registration is
/// removed before the descriptor itself goes away, so a careless drop
/// order never leaves a stale registration pointing at freed memory. This
/// is the "auto" hook-unlink convention documented on
/// `auraloop_intrusive::list`, applied to the loop's fd-keyed table
/// instead of an intrusive list.
pub struct SocketEvent {
    fd: Cell<Option<RawFd>>,
    state: Rc<SocketState>,
    event_loop: EventLoop,
}

impl std::fmt::Debug for SocketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketEvent")
            .field("fd", &self.fd.get())
            .field("scheduled_mask", &self.state.scheduled_mask.get())
            .finish()
    }
}

impl SocketEvent {
    /// Creates an unopened subscription bound to `event_loop`. Call
    /// [`Self::open`] before scheduling any readiness.
    #[must_use]
    pub fn new(event_loop: EventLoop, callback: impl FnMut(Mask) + 'static) -> Self {
        Self {
            fd: Cell::new(None),
            state: Rc::new(SocketState {
                scheduled_mask: Cell::new(Mask::empty()),
                ready_mask: Cell::new(Mask::empty()),
                callback: RefCell::new(Box::new(callback)),
            }),
            event_loop,
        }
    }

    /// Associates this subscription with `fd`. `fd` must not already be
    /// associated (use a fresh `SocketEvent` per descriptor).
    pub fn open(&mut self, fd: RawFd) {
        debug_assert!(self.fd.get().is_none(), "SocketEvent::open called twice");
        self.fd.set(Some(fd));
    }

    #[must_use]
    pub fn fd(&self) -> Option<RawFd> {
        self.fd.get()
    }

    #[must_use]
    pub fn scheduled_mask(&self) -> Mask {
        self.state.scheduled_mask.get()
    }

    /// Ensures the backend registration equals `mask | IMPLICIT_FLAGS`. On
    /// a backend failure, or the backend silently forgetting a stale `fd`,
    /// resets `scheduled_mask` to zero instead of leaving it claiming a
    /// registration the kernel no longer has (invariant I2).
    pub fn schedule(&mut self, mask: Mask) {
        let Some(fd) = self.fd.get() else { return };
        let wanted = mask | IMPLICIT_FLAGS;
        let previously_registered = !self.state.scheduled_mask.get().is_empty();
        self.state.scheduled_mask.set(wanted);
        self.event_loop.register_socket_state(fd, Rc::clone(&self.state));
        match self.event_loop.backend_schedule(fd, wanted, previously_registered) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(fd, "SocketEvent::schedule: backend reports an unknown descriptor; resetting");
                self.state.scheduled_mask.set(Mask::empty());
                self.event_loop.unregister_socket_state(fd);
            }
            Err(err) => {
                tracing::warn!(fd, %err, "SocketEvent::schedule: backend registration failed");
                self.state.scheduled_mask.set(Mask::empty());
                self.event_loop.unregister_socket_state(fd);
            }
        }
    }

    pub fn schedule_read(&mut self) {
        self.schedule(self.scheduled_mask() | Mask::READ);
    }

    pub fn schedule_write(&mut self) {
        self.schedule(self.scheduled_mask() | Mask::WRITE);
    }

    pub fn cancel_read(&mut self) {
        let remaining = self.scheduled_mask() - Mask::READ - IMPLICIT_FLAGS;
        if remaining.is_empty() {
            self.cancel();
        } else {
            self.schedule(remaining);
        }
    }

    pub fn cancel_write(&mut self) {
        let remaining = self.scheduled_mask() - Mask::WRITE - IMPLICIT_FLAGS;
        if remaining.is_empty() {
            self.cancel();
        } else {
            self.schedule(remaining);
        }
    }

    /// Removes the backend registration entirely. The subscription stays
    /// associated with its descriptor (use [`Self::close`]/[`Self::abandon`]
    /// to release that too).
    pub fn cancel(&mut self) {
        let Some(fd) = self.fd.get() else { return };
        if !self.state.scheduled_mask.get().is_empty() {
            self.event_loop.backend_remove(fd);
            self.event_loop.unregister_socket_state(fd);
        }
        self.state.scheduled_mask.set(Mask::empty());
    }

    /// Closes the descriptor. The backend registration is dropped for free
    /// by the kernel on `close(2)`, so only bookkeeping is touched here.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.event_loop.backend_abandon(fd);
            self.event_loop.unregister_socket_state(fd);
            // SAFETY: `fd` is owned by this subscription; closing it here
            // is the one and only close site for a fd it was given.
            unsafe {
                libc::close(fd);
            }
        }
        self.state.scheduled_mask.set(Mask::empty());
    }

    /// Drops bookkeeping for a descriptor the caller has already closed
    /// directly.
    pub fn abandon(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.event_loop.backend_abandon(fd);
            self.event_loop.unregister_socket_state(fd);
        }
        self.state.scheduled_mask.set(Mask::empty());
    }
}

impl Drop for SocketEvent {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A thin façade over [`SocketEvent`] for the common case of a raw fd that
/// just needs readiness notification: pipes, FIFOs, inotify fds, signalfd,
/// eventfd, io_uring completion fds.
pub struct PipeEvent {
    inner: SocketEvent,
}

impl PipeEvent {
    #[must_use]
    pub fn new(event_loop: EventLoop, fd: RawFd, mut on_readable: impl FnMut() + 'static) -> Self {
        let mut inner = SocketEvent::new(event_loop, move |_mask| on_readable());
        inner.open(fd);
        inner.schedule(Mask::READ);
        Self { inner }
    }

    pub fn cancel(&mut self) {
        self.inner.cancel();
    }
}

impl std::fmt::Debug for PipeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEvent").field("fd", &self.inner.fd()).finish()
    }
}
