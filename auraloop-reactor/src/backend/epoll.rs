use super::{Backend, Mask, ReadyEvent};
use crate::error::{ReactorError, ReactorResult};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

fn mask_to_epoll(mask: Mask) -> u32 {
    let mut bits = 0u32;
    if mask.contains(Mask::READ) {
        bits |= libc::EPOLLIN as u32;
    }
    if mask.contains(Mask::WRITE) {
        bits |= libc::EPOLLOUT as u32;
    }
    // ERROR and HANGUP are reported unconditionally by the kernel; no bits
    // to request for them.
    bits
}

fn epoll_to_mask(bits: u32) -> Mask {
    let mut mask = Mask::empty();
    if bits & (libc::EPOLLIN as u32) != 0 {
        mask |= Mask::READ;
    }
    if bits & (libc::EPOLLOUT as u32) != 0 {
        mask |= Mask::WRITE;
    }
    if bits & (libc::EPOLLERR as u32) != 0 {
        mask |= Mask::ERROR;
    }
    if bits & (libc::EPOLLHUP as u32) != 0 || bits & (libc::EPOLLRDHUP as u32) != 0 {
        mask |= Mask::HANGUP;
    }
    mask
}

/// Level-triggered `epoll(7)` backend. Registered descriptors remain valid
/// whether or not this struct's internal `token` bookkeeping agrees with
/// the kernel's view, because closing a descriptor always removes it from
/// epoll for free, which [`EpollBackend::abandon`] relies on.
pub struct EpollBackend {
    epoll_fd: RawFd,
    tokens: HashMap<RawFd, usize>,
}

impl std::fmt::Debug for EpollBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpollBackend").field("registered", &self.tokens.len()).finish()
    }
}

impl EpollBackend {
    pub fn new() -> ReactorResult<Self> {
        // SAFETY: epoll_create1 has no preconditions beyond a valid flags
        // argument; 0 is always valid.
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(ReactorError::Backend(io::Error::last_os_error()));
        }
        Ok(Self { epoll_fd, tokens: HashMap::new() })
    }

    fn ctl(&self, op: i32, fd: RawFd, mask: Mask, token: usize) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: mask_to_epoll(mask),
            u64: token as u64,
        };
        // SAFETY: `event` is a valid, fully initialised epoll_event and
        // `self.epoll_fd` is an open epoll instance for the struct's whole
        // lifetime.
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        // SAFETY: `epoll_fd` was opened by this struct and not shared.
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

impl Backend for EpollBackend {
    fn add(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, mask, token).map_err(ReactorError::Backend)?;
        self.tokens.insert(fd, token);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<bool> {
        match self.ctl(libc::EPOLL_CTL_MOD, fd, mask, token) {
            Ok(()) => {
                self.tokens.insert(fd, token);
                Ok(true)
            }
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) || e.raw_os_error() == Some(libc::EBADF) => {
                // Stale descriptor: the fd was already dropped from epoll
                // (probably closed out from under us). Report the downgrade
                // so the caller can reset its own bookkeeping instead of
                // believing a mask is registered that the kernel forgot.
                tracing::debug!(fd, "epoll_ctl(MOD) on stale descriptor; downgrading to unregistered");
                self.tokens.remove(&fd);
                Ok(false)
            }
            Err(e) => Err(ReactorError::Backend(e)),
        }
    }

    fn remove(&mut self, fd: RawFd) {
        let mut event = libc::epoll_event { events: 0, u64: 0 };
        // SAFETY: see `ctl`; EPOLL_CTL_DEL ignores `event` but the kernel
        // still dereferences the pointer on pre-2.6.9 kernels, so we pass
        // a valid one regardless.
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, &mut event) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) && err.raw_os_error() != Some(libc::EBADF) {
                tracing::warn!(fd, %err, "epoll_ctl(DEL) failed");
            }
        }
        self.tokens.remove(&fd);
    }

    fn abandon(&mut self, fd: RawFd) {
        // The descriptor is already closed; the kernel already dropped its
        // epoll registration. Just forget our bookkeeping.
        self.tokens.remove(&fd);
    }

    fn wait(&mut self, timeout: Option<Duration>) -> ReactorResult<Vec<ReadyEvent>> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
        };
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; 64];
        // SAFETY: `raw` is a valid buffer of the given length for the
        // kernel to write into.
        let n = unsafe {
            libc::epoll_wait(self.epoll_fd, raw.as_mut_ptr(), raw.len() as i32, timeout_ms)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            tracing::warn!(%err, "epoll_wait failed");
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(n as usize);
        for ev in &raw[..n as usize] {
            out.push(ReadyEvent { mask: epoll_to_mask(ev.events), token: ev.u64 as usize });
        }
        Ok(out)
    }
}
