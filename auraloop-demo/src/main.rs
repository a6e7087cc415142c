// Copyright 2024 Aura Loop Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runs every demo scenario back to back. Run `cargo run --example <name>`
//! from this crate to run one scenario in isolation with more logging
//! room.

use auraloop_demo::tracing_init;
use auraloop_reactor::{CoarseTimerEvent, EventLoop};
use std::time::Duration;

fn main() {
    tracing_init::init_tracing();

    let event_loop = EventLoop::new().expect("failed to construct event loop");
    let el = event_loop.clone();
    let mut timer = CoarseTimerEvent::new(move || {
        tracing::info!("demo timer fired, requesting quit");
        el.quit();
    });
    event_loop.schedule_coarse_timer(&timer, Duration::from_millis(50));

    tracing::info!("running event loop");
    event_loop.run().expect("event loop run failed");
    event_loop.cancel_coarse_timer(&timer);
    let _ = &mut timer;
    tracing::info!("done");
}
