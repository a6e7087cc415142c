//! Poll backend abstraction: one trait, two Linux implementations
//! ([`epoll`] by default, [`poll`] behind a Cargo feature), selected at
//! compile time so the event loop monomorphizes over exactly one backend
//! and pays no dynamic-dispatch cost in the hot path.
//!
//! Mask bits mirror what every POSIX multiplexer agrees on: `READ`,
//! `WRITE`, and the two bits a backend always reports regardless of
//! whether they were requested, `ERROR` and `HANGUP`.

#[cfg(feature = "backend-epoll")]
mod epoll;
#[cfg(feature = "backend-poll")]
mod poll;

#[cfg(feature = "backend-epoll")]
pub use epoll::EpollBackend;
#[cfg(feature = "backend-poll")]
pub use poll::PollBackend;

use crate::error::ReactorResult;
use bitflags::bitflags;
use std::os::unix::io::RawFd;
use std::time::Duration;

bitflags! {
    /// Readiness bitmask. `ERROR` and `HANGUP` are always implicitly
    /// monitored; a backend may set them on a readiness event even if the
    /// caller never requested them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Mask: u32 {
        const READ   = 0b0001;
        const WRITE  = 0b0010;
        const ERROR  = 0b0100;
        const HANGUP = 0b1000;
    }
}

/// Bits every registration implicitly asks for, matching the original
/// reactor's `IMPLICIT_FLAGS`.
pub const IMPLICIT_FLAGS: Mask = Mask::ERROR.union(Mask::HANGUP);

/// One readiness notification returned from [`Backend::wait`].
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub mask: Mask,
    pub token: usize,
}

/// Unified contract over a platform's I/O readiness multiplexer.
pub trait Backend {
    /// Starts monitoring `fd` for `mask`. `token` is returned verbatim on
    /// every [`ReadyEvent`] for this registration.
    fn add(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<()>;

    /// Updates an existing registration's mask. Returns `Ok(true)` if the
    /// backend still knows about `fd`, `Ok(false)` if it has silently
    /// fallen out of registration (e.g. a stale epoll entry) — callers
    /// must treat `Ok(false)` as "this subscription's scheduled mask is no
    /// longer registered with the kernel" and reset their own bookkeeping
    /// to match, per the unknown-fd handling in `SocketEvent::schedule`.
    fn modify(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<bool>;

    /// Stops monitoring `fd`. The descriptor itself is not touched.
    fn remove(&mut self, fd: RawFd);

    /// Drops bookkeeping for `fd` without a syscall, because the caller
    /// has already closed it (closing a descriptor implicitly drops its
    /// epoll registration, and re-registering whatever fd number the
    /// kernel reassigns next would be a bug, not a fix).
    fn abandon(&mut self, fd: RawFd);

    /// Blocks (bounded by `timeout`, or forever if `None`) until at least
    /// one registered descriptor is ready, then returns the batch.
    /// `Duration::ZERO` polls without blocking.
    fn wait(&mut self, timeout: Option<Duration>) -> ReactorResult<Vec<ReadyEvent>>;
}

/// The backend compiled in by this build's feature flags.
#[cfg(feature = "backend-epoll")]
pub type DefaultBackend = EpollBackend;
#[cfg(all(feature = "backend-poll", not(feature = "backend-epoll")))]
pub type DefaultBackend = PollBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_flags_are_error_and_hangup() {
        assert!(IMPLICIT_FLAGS.contains(Mask::ERROR));
        assert!(IMPLICIT_FLAGS.contains(Mask::HANGUP));
        assert!(!IMPLICIT_FLAGS.contains(Mask::READ));
    }

    #[test]
    fn mask_union_and_sub_roundtrip() {
        let m = Mask::READ | Mask::WRITE;
        assert!(m.contains(Mask::READ));
        assert!(m.contains(Mask::WRITE));
        let m2 = m - Mask::WRITE;
        assert!(m2.contains(Mask::READ));
        assert!(!m2.contains(Mask::WRITE));
    }
}
