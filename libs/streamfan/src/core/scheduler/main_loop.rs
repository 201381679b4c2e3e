// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::event::LoopEvent;
use super::Scheduler;

/// Channel-backed event loop. Any thread may post; one thread drains.
///
/// Delayed events are delivered by a short-lived helper thread that sleeps
/// for the delay and then posts.
pub struct MainLoop {
    tx: Sender<LoopEvent>,
    rx: Receiver<LoopEvent>,
}

impl MainLoop {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Number of events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for MainLoop {
    fn post(&self, event: LoopEvent) {
        // The receiver lives as long as self, so send cannot fail here.
        let _ = self.tx.send(event);
    }

    fn post_after(&self, delay: Duration, event: LoopEvent) {
        let tx = self.tx.clone();
        let spawned = std::thread::Builder::new()
            .name("streamfan-timer".into())
            .spawn(move || {
                std::thread::sleep(delay);
                // Loop may have shut down meanwhile.
                let _ = tx.send(event);
            });
        if let Err(e) = spawned {
            tracing::warn!("[MainLoop] Failed to spawn timer thread: {}", e);
        }
    }

    fn next_event(&self, timeout: Duration) -> Option<LoopEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}
