//! Cross-thread wake-up channel.
//!
//! On Linux this is an `eventfd(2)` counter: writing adds to the counter,
//! reading drains it to zero and reports whether it was non-zero, and
//! multiple writes between reads coalesce into one wake-up. That
//! coalescing is exactly what the reactor wants — it only cares that the
//! owning thread's blocking wait returns, not how many times someone
//! asked it to.

use crate::error::{ReactorError, ReactorResult};
use std::io;
use std::os::unix::io::RawFd;

/// A self-signalling descriptor used to unblock a blocking `wait` from
/// another thread.
pub struct WakeChannel {
    fd: RawFd,
}

impl std::fmt::Debug for WakeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeChannel").field("fd", &self.fd).finish()
    }
}

impl WakeChannel {
    pub fn new() -> ReactorResult<Self> {
        // SAFETY: eventfd(2) with a zero initial value and EFD_NONBLOCK |
        // EFD_CLOEXEC has no further preconditions.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(ReactorError::WakeChannel(io::Error::last_os_error()));
        }
        Ok(Self { fd })
    }

    #[must_use]
    pub fn descriptor(&self) -> RawFd {
        self.fd
    }

    /// Drains the counter. Returns `true` if it was non-zero (i.e. someone
    /// had signalled since the last read). Idempotent: calling this twice
    /// in a row without an intervening [`Self::write`] returns `false` the
    /// second time.
    pub fn read(&self) -> bool {
        let mut buf = [0u8; 8];
        // SAFETY: `buf` is 8 bytes, eventfd reads exactly 8 bytes or fails
        // with EAGAIN when the counter is zero (non-blocking fd).
        let rc = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        rc == 8
    }

    /// Signals the channel, causing a concurrent or future blocking `wait`
    /// on [`Self::descriptor`] to return readable.
    pub fn write(&self) {
        let buf = 1u64.to_ne_bytes();
        // SAFETY: `buf` is a valid 8-byte buffer; EAGAIN (counter already
        // at u64::MAX) is not something this reactor will ever hit and is
        // safe to ignore if it somehow did.
        unsafe {
            let _ = libc::write(self.fd, buf.as_ptr().cast(), buf.len());
        }
    }
}

impl Drop for WakeChannel {
    fn drop(&mut self) {
        // SAFETY: `fd` was opened by this struct and not shared.
        unsafe {
            libc::close(self.fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_false_until_written() {
        let chan = WakeChannel::new().unwrap();
        assert!(!chan.read());
        chan.write();
        assert!(chan.read());
        assert!(!chan.read());
    }

    #[test]
    fn multiple_writes_coalesce() {
        let chan = WakeChannel::new().unwrap();
        chan.write();
        chan.write();
        chan.write();
        assert!(chan.read());
        assert!(!chan.read());
    }
}
