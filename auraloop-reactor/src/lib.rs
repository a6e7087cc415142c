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

//! A single-threaded reactor: one event loop per thread, multiplexing
//! socket readiness, timers, deferred work, and cross-thread injection
//! behind one blocking syscall.
//!
//! # Iteration order
//!
//! Each pass through [`EventLoop::run`]'s loop:
//!
//! 1. Drain the defer queue completely.
//! 2. Drain the inject queue (cross-thread submissions), picking up any
//!    pending [`Injector::inject_break`] request.
//! 3. Run every coarse and fine timer due by now.
//! 4. If the defer and inject queues are still empty and no timer was due
//!    just now, run at most one idle callback.
//! 5. Otherwise, block in the poll backend until a descriptor is ready,
//!    the wake channel fires, or the nearer of the two timer structures'
//!    next deadline elapses, then dispatch whatever became ready.
//!
//! Socket callbacks, timers, and defer/idle callbacks are all free to
//! reschedule themselves or anything else; a reschedule made during one
//! phase is visited on a later pass, never the current one, which is
//! what keeps `clear_and_dispose`-style draining in the underlying
//! containers sound.
//!
//! # Threading
//!
//! [`EventLoop`] is an `Rc`-backed handle: cheap to clone, and usable only
//! from the thread that created it (every entry point checks this and
//! returns [`error::ReactorError::WrongThread`] otherwise). The lone
//! exception is [`Injector`], a `Send + Sync` handle obtained via
//! [`EventLoop::injector`] for submitting work from other threads.

pub mod backend;
mod builder;
mod defer;
pub mod error;
mod event_loop;
mod inject;
mod signal;
mod socket_event;
mod timer_list;
mod timer_wheel;
mod wake;

pub use backend::Mask;
pub use builder::EventLoopBuilder;
pub use defer::{DeferEvent, IdleEvent};
pub use error::{ReactorError, ReactorResult};
pub use event_loop::{EventLoop, Injector};
pub use inject::InjectHandle;
pub use socket_event::{PipeEvent, SocketEvent};
pub use signal::SignalMonitor;
pub use timer_list::FineTimerEvent;
pub use timer_wheel::CoarseTimerEvent;
