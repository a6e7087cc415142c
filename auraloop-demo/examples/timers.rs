//! Schedules a coarse and a fine timer side by side and logs firing order.
//! The fine timer is due first despite being scheduled second, showing
//! that the two timer structures are evaluated against the same clock
//! reading each iteration.

use auraloop_demo::tracing_init;
use auraloop_reactor::{CoarseTimerEvent, EventLoop, FineTimerEvent};
use std::time::Duration;

fn main() {
    tracing_init::init_tracing();
    let event_loop = EventLoop::new().expect("failed to construct event loop");

    let el_coarse = event_loop.clone();
    let mut coarse = CoarseTimerEvent::new(move || {
        tracing::info!("coarse timer fired");
        el_coarse.quit();
    });
    event_loop.schedule_coarse_timer(&coarse, Duration::from_millis(200));

    let mut fine = FineTimerEvent::new(|| {
        tracing::info!("fine timer fired");
    });
    event_loop.schedule_fine_timer(&fine, Duration::from_millis(20));

    tracing::info!("running: expect fine timer before coarse timer");
    event_loop.run().expect("event loop run failed");

    event_loop.cancel_coarse_timer(&coarse);
    event_loop.cancel_fine_timer(&fine);
    let _ = (&mut coarse, &mut fine);
}
