//! Runtime configuration for constructing an [`EventLoop`].
//!
//! Most applications only need [`EventLoop::new`]; the builder exists for
//! the handful of knobs worth exposing without growing the constructor's
//! argument list every time one is added.

use crate::error::ReactorResult;
use crate::event_loop::EventLoop;
use crate::signal::MAX_SIGNAL;

/// Configures and constructs an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopBuilder {
    install_signals: Vec<i32>,
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoopBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { install_signals: Vec::new() }
    }

    /// Registers `signum` so the loop delivers it to handlers registered
    /// via [`crate::signal::register`] once built. Building without
    /// calling this still lets callers register signal handlers later;
    /// this only pre-installs the underlying OS plumbing before the
    /// first iteration.
    ///
    /// # Panics
    /// Panics if `signum` is negative or exceeds the handler table's size.
    #[must_use]
    pub fn with_signal(mut self, signum: i32) -> Self {
        assert!((0..MAX_SIGNAL as i32).contains(&signum), "signal number out of range: {signum}");
        self.install_signals.push(signum);
        self
    }

    /// Builds the event loop, performing every OS-level setup (backend
    /// instance, wake channel, any pre-registered signals) eagerly so
    /// errors surface here rather than on the first call to `run`.
    pub fn build(self) -> ReactorResult<EventLoop> {
        let event_loop = EventLoop::new()?;
        for signum in self.install_signals {
            crate::signal::register(signum, || {});
        }
        Ok(event_loop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_builder_builds_a_usable_loop() {
        let event_loop = EventLoopBuilder::new().build().unwrap();
        event_loop.quit();
        event_loop.run().unwrap();
    }
}
