//! Spawns a worker thread that sleeps briefly, injects one callback, then
//! calls `inject_break` to request a cross-thread shutdown — the pattern
//! an embedder uses to tear down the reactor's thread from anywhere else
//! in the process.

use auraloop_demo::tracing_init;
use auraloop_reactor::EventLoop;
use std::time::Duration;

fn main() {
    tracing_init::init_tracing();
    let event_loop = EventLoop::new().expect("failed to construct event loop");
    let injector = event_loop.injector();

    let worker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        injector.inject(|| tracing::info!("injected callback ran on the loop's thread"));
        std::thread::sleep(Duration::from_millis(10));
        tracing::info!("worker requesting shutdown");
        injector.inject_break();
    });

    tracing::info!("running until the worker thread requests a break");
    event_loop.run().expect("event loop run failed");
    worker.join().expect("worker thread panicked");
    tracing::info!("shut down cleanly");
}
