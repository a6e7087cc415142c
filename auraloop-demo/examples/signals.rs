//! Installs a `SignalMonitor` for `SIGUSR1` and `SIGINT`, then raises
//! `SIGUSR1` against this process to show delivery without requiring a
//! human to press Ctrl-C. Exits either way within a second.

use auraloop_demo::tracing_init;
use auraloop_reactor::{EventLoop, SignalMonitor};
use std::time::Duration;

fn main() {
    tracing_init::init_tracing();
    let event_loop = EventLoop::new().expect("failed to construct event loop");

    let el_usr1 = event_loop.clone();
    let _usr1 = SignalMonitor::new(libc::SIGUSR1, move || {
        tracing::info!("received SIGUSR1");
        el_usr1.quit();
    });
    let el_int = event_loop.clone();
    let _int = SignalMonitor::new(libc::SIGINT, move || {
        tracing::info!("received SIGINT");
        el_int.quit();
    });

    let el_timeout = event_loop.clone();
    let mut timeout = auraloop_reactor::CoarseTimerEvent::new(move || {
        tracing::warn!("timed out waiting for a signal; quitting anyway");
        el_timeout.quit();
    });
    event_loop.schedule_coarse_timer(&timeout, Duration::from_secs(1));

    // SAFETY: raising a signal against our own process is always valid.
    unsafe {
        libc::raise(libc::SIGUSR1);
    }

    tracing::info!("running: press Ctrl-C, or wait for the self-raised SIGUSR1");
    event_loop.run().expect("event loop run failed");
    event_loop.cancel_coarse_timer(&timeout);
    let _ = &mut timeout;
}
