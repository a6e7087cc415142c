use super::{Backend, Mask, ReadyEvent};
use crate::error::ReactorResult;
use std::os::unix::io::RawFd;
use std::time::Duration;

fn mask_to_poll(mask: Mask) -> i16 {
    let mut bits = 0i16;
    if mask.contains(Mask::READ) {
        bits |= libc::POLLIN;
    }
    if mask.contains(Mask::WRITE) {
        bits |= libc::POLLOUT;
    }
    bits
}

fn poll_to_mask(bits: i16) -> Mask {
    let mut mask = Mask::empty();
    if bits & libc::POLLIN != 0 {
        mask |= Mask::READ;
    }
    if bits & libc::POLLOUT != 0 {
        mask |= Mask::WRITE;
    }
    if bits & libc::POLLERR != 0 {
        mask |= Mask::ERROR;
    }
    if bits & (libc::POLLHUP | libc::POLLRDHUP) != 0 {
        mask |= Mask::HANGUP;
    }
    mask
}

/// Classic `poll(2)` backend, for hosts or configurations without epoll.
/// `O(n)` per `wait` in the number of registered descriptors, same as the
/// syscall it wraps; removal swaps the removed entry with the last one to
/// avoid shifting the rest of the array.
#[derive(Debug, Default)]
pub struct PollBackend {
    fds: Vec<libc::pollfd>,
    tokens: Vec<usize>,
}

impl PollBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { fds: Vec::new(), tokens: Vec::new() }
    }

    fn index_of(&self, fd: RawFd) -> Option<usize> {
        self.fds.iter().position(|p| p.fd == fd)
    }

    fn swap_remove(&mut self, index: usize) {
        self.fds.swap_remove(index);
        self.tokens.swap_remove(index);
    }
}

impl Backend for PollBackend {
    fn add(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<()> {
        self.fds.push(libc::pollfd { fd, events: mask_to_poll(mask), revents: 0 });
        self.tokens.push(token);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, mask: Mask, token: usize) -> ReactorResult<bool> {
        if let Some(i) = self.index_of(fd) {
            self.fds[i].events = mask_to_poll(mask);
            self.tokens[i] = token;
            Ok(true)
        } else {
            tracing::debug!(fd, "poll backend modify on unregistered fd; downgrading to unregistered");
            Ok(false)
        }
    }

    fn remove(&mut self, fd: RawFd) {
        if let Some(i) = self.index_of(fd) {
            self.swap_remove(i);
        }
    }

    fn abandon(&mut self, fd: RawFd) {
        self.remove(fd);
    }

    fn wait(&mut self, timeout: Option<Duration>) -> ReactorResult<Vec<ReadyEvent>> {
        let timeout_ms = match timeout {
            None => -1,
            Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
        };
        if self.fds.is_empty() {
            // `poll(2)` with an empty set still sleeps for the timeout,
            // which is exactly the behaviour wanted here.
            // SAFETY: a null/zero-length pollfd array with nfds=0 is
            // explicitly supported by poll(2).
            let rc = unsafe { libc::poll(std::ptr::null_mut(), 0, timeout_ms) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::Interrupted {
                    tracing::warn!(%err, "poll failed");
                }
            }
            return Ok(Vec::new());
        }
        // SAFETY: `self.fds` is a valid, initialised array of the given
        // length; poll(2) only reads `events` and writes `revents`.
        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            tracing::warn!(%err, "poll failed");
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (pfd, token) in self.fds.iter_mut().zip(self.tokens.iter()) {
            if pfd.revents != 0 {
                out.push(ReadyEvent { mask: poll_to_mask(pfd.revents), token: *token });
                pfd.revents = 0;
            }
        }
        Ok(out)
    }
}
