// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Event loop abstraction.
//!
//! Data threads post [`LoopEvent`]s; the thread that owns the topology
//! drains them. The scheduler is passed in explicitly so tests can swap the
//! channel-backed [`MainLoop`] for a [`ManualScheduler`].

mod event;
mod main_loop;
mod manual;

use std::time::Duration;

pub use event::{BusMessage, DiscoveryEvent, LoopEvent, TimerTask};
pub use main_loop::MainLoop;
pub use manual::ManualScheduler;

pub trait Scheduler: Send + Sync {
    /// Queue an event for the next dispatch.
    fn post(&self, event: LoopEvent);

    /// Queue an event once `delay` has elapsed.
    fn post_after(&self, delay: Duration, event: LoopEvent);

    /// Next ready event, waiting at most `timeout`.
    fn next_event(&self, timeout: Duration) -> Option<LoopEvent>;
}
