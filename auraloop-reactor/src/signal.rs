//! Signal delivery into the reactor thread.
//!
//! Two strategies, selected by the `self-pipe-signals` feature (the
//! default is `signalfd`):
//!
//! - **signalfd** (default): the handled signals are blocked process-wide
//!   via `sigprocmask`; a `signalfd(2)` descriptor is registered with the
//!   backend, and on readiness the loop reads `signalfd_siginfo` records
//!   and dispatches each to its handler. No handler ever runs in signal
//!   context.
//! - **self-pipe**: a real `sigaction` handler sets an atomic "pending"
//!   bit for the signal number and writes the wake channel; the handler
//!   itself only touches async-signal-safe operations. On readiness the
//!   loop scans the pending bitmap and dispatches.
//!
//! Signal handling is process-wide by nature, so this module keeps one
//! process-wide [`OnceLock`] rather than threading a handle through every
//! caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

pub const MAX_SIGNAL: usize = 64;

type Handler = Box<dyn FnMut() + Send>;

struct SignalState {
    handlers: Mutex<HashMap<i32, Handler>>,
    #[cfg(feature = "self-pipe-signals")]
    pending: [AtomicBool; MAX_SIGNAL],
}

static STATE: OnceLock<SignalState> = OnceLock::new();

#[cfg(feature = "self-pipe-signals")]
static WAKE_FD: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(-1);

fn state() -> &'static SignalState {
    STATE.get_or_init(|| SignalState {
        handlers: Mutex::new(HashMap::new()),
        #[cfg(feature = "self-pipe-signals")]
        pending: std::array::from_fn(|_| AtomicBool::new(false)),
    })
}

/// Registers `handler` to run on the reactor thread whenever `signum` is
/// delivered to this process. Only one handler per signal number; a
/// second registration replaces the first.
pub fn register(signum: i32, handler: impl FnMut() + Send + 'static) {
    let s = state();
    s.handlers.lock().unwrap().insert(signum, Box::new(handler));
    install(signum);
}

/// Removes the handler for `signum`, restoring the default disposition.
pub fn unregister(signum: i32) {
    let s = state();
    s.handlers.lock().unwrap().remove(&signum);
    uninstall(signum);
}

/// Runs the handler, if any, registered for `signum`. Called by the
/// reactor on the owning thread after observing the signal through
/// whichever channel (signalfd record or pending bitmap) this build uses.
fn dispatch(signum: i32) {
    let s = state();
    let mut handlers = s.handlers.lock().unwrap();
    if let Some(handler) = handlers.get_mut(&signum) {
        tracing::debug!(signum, "dispatching signal");
        handler();
    }
}

#[cfg(not(feature = "self-pipe-signals"))]
mod backend {
    use super::*;
    use std::os::unix::io::RawFd;

    static SIGNAL_FD: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(-1);
    static BLOCKED: Mutex<Vec<i32>> = Mutex::new(Vec::new());

    fn rebuild_signalfd() {
        let signals = BLOCKED.lock().unwrap();
        let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
        // SAFETY: `set` is a valid, zero-initialised sigset_t.
        unsafe {
            libc::sigemptyset(&mut set);
        }
        for &sig in signals.iter() {
            // SAFETY: `set` was just initialised above.
            unsafe {
                libc::sigaddset(&mut set, sig);
            }
        }
        // SAFETY: blocking these signals process-wide is the documented
        // precondition for reading them via signalfd.
        unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
        }
        let old = SIGNAL_FD.load(Ordering::SeqCst);
        // SAFETY: `set` above is fully initialised; -1 means "create new".
        let new_fd = unsafe { libc::signalfd(old, &set, libc::SFD_NONBLOCK | libc::SFD_CLOEXEC) };
        if new_fd >= 0 {
            SIGNAL_FD.store(new_fd, Ordering::SeqCst);
        } else {
            tracing::warn!(err = %std::io::Error::last_os_error(), "signalfd() failed");
        }
    }

    pub fn install(signum: i32) {
        let mut signals = BLOCKED.lock().unwrap();
        if !signals.contains(&signum) {
            signals.push(signum);
        }
        drop(signals);
        rebuild_signalfd();
        tracing::info!(signum, "signal registered via signalfd");
    }

    pub fn uninstall(signum: i32) {
        let mut signals = BLOCKED.lock().unwrap();
        signals.retain(|&s| s != signum);
        drop(signals);
        rebuild_signalfd();
    }

    #[must_use]
    pub fn descriptor() -> Option<RawFd> {
        let fd = SIGNAL_FD.load(Ordering::SeqCst);
        (fd >= 0).then_some(fd)
    }

    /// Reads and dispatches every pending `signalfd_siginfo` record.
    pub fn drain() {
        let Some(fd) = descriptor() else { return };
        loop {
            let mut info: libc::signalfd_siginfo = unsafe { std::mem::zeroed() };
            // SAFETY: `info` is sized exactly as signalfd(2) expects.
            let n = unsafe {
                libc::read(
                    fd,
                    (&raw mut info).cast(),
                    std::mem::size_of::<libc::signalfd_siginfo>(),
                )
            };
            if n != std::mem::size_of::<libc::signalfd_siginfo>() as isize {
                break;
            }
            super::dispatch(info.ssi_signo as i32);
        }
    }
}

#[cfg(feature = "self-pipe-signals")]
mod backend {
    use super::*;
    use std::os::unix::io::RawFd;

    extern "C" fn handle(signum: libc::c_int) {
        if (signum as usize) < MAX_SIGNAL {
            state().pending[signum as usize].store(true, Ordering::SeqCst);
        }
        let wake_fd = WAKE_FD.load(Ordering::SeqCst);
        if wake_fd >= 0 {
            let one = 1u64.to_ne_bytes();
            // SAFETY: async-signal-safe write of a constant buffer to an
            // already-open, non-blocking fd; the only operation this
            // handler performs besides the atomic store above.
            unsafe {
                let _ = libc::write(wake_fd, one.as_ptr().cast(), one.len());
            }
        }
    }

    pub fn set_wake_fd(fd: RawFd) {
        WAKE_FD.store(fd, Ordering::SeqCst);
    }

    pub fn install(signum: i32) {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle as usize;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = libc::SA_RESTART;
            libc::sigaction(signum, &action, std::ptr::null_mut());
        }
        tracing::info!(signum, "signal registered via self-pipe");
    }

    pub fn uninstall(signum: i32) {
        unsafe {
            libc::signal(signum, libc::SIG_DFL);
        }
    }

    /// Scans the pending bitmap and dispatches every signal found set,
    /// clearing each bit before running its handler so a re-raise during
    /// dispatch is not lost.
    pub fn drain() {
        let s = state();
        for (signum, flag) in s.pending.iter().enumerate() {
            if flag.swap(false, Ordering::SeqCst) {
                super::dispatch(signum as i32);
            }
        }
    }
}

pub(crate) use backend::drain;
#[cfg(not(feature = "self-pipe-signals"))]
pub(crate) use backend::descriptor as signalfd_descriptor;
#[cfg(feature = "self-pipe-signals")]
pub(crate) use backend::set_wake_fd;

fn install(signum: i32) {
    backend::install(signum);
}

fn uninstall(signum: i32) {
    backend::uninstall(signum);
}

/// A caller-owned subscription to one POSIX signal number.
///
/// Unlike [`crate::socket_event::SocketEvent`] or [`crate::timer_wheel::CoarseTimerEvent`],
/// this does not hold a reference to an [`crate::event_loop::EventLoop`]:
/// signal delivery is process-wide, not per-loop (see the module docs), so
/// dropping the last `SignalMonitor` for a signal number restores its
/// default disposition regardless of which loop is running.
pub struct SignalMonitor {
    signum: i32,
}

impl std::fmt::Debug for SignalMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalMonitor").field("signum", &self.signum).finish()
    }
}

impl SignalMonitor {
    /// Registers `handler` to run on whichever reactor thread is draining
    /// this process's signal channel when `signum` is delivered.
    #[must_use]
    pub fn new(signum: i32, handler: impl FnMut() + Send + 'static) -> Self {
        register(signum, handler);
        Self { signum }
    }

    #[must_use]
    pub fn signal_number(&self) -> i32 {
        self.signum
    }
}

impl Drop for SignalMonitor {
    fn drop(&mut self) {
        unregister(self.signum);
    }
}
