// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use super::event::LoopEvent;
use super::Scheduler;

#[derive(Default)]
struct ManualState {
    ready: VecDeque<LoopEvent>,
    /// (due, sequence, event); sequence keeps equal deadlines in post order.
    delayed: Vec<(Duration, u64, LoopEvent)>,
    now: Duration,
    seq: u64,
}

/// Deterministic scheduler driven by the caller.
///
/// Nothing happens on its own: `next_event` never blocks and delayed events
/// only become ready when virtual time is moved with [`advance`](Self::advance).
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward, releasing every delayed event that
    /// becomes due.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += by;
        let now = state.now;

        let mut due: Vec<(Duration, u64, LoopEvent)> = Vec::new();
        let mut i = 0;
        while i < state.delayed.len() {
            if state.delayed[i].0 <= now {
                due.push(state.delayed.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by_key(|(at, seq, _)| (*at, *seq));
        state.ready.extend(due.into_iter().map(|(_, _, event)| event));
    }

    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn delayed_len(&self) -> usize {
        self.state.lock().delayed.len()
    }
}

impl Scheduler for ManualScheduler {
    fn post(&self, event: LoopEvent) {
        self.state.lock().ready.push_back(event);
    }

    fn post_after(&self, delay: Duration, event: LoopEvent) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.delayed.push((due, seq, event));
    }

    fn next_event(&self, _timeout: Duration) -> Option<LoopEvent> {
        self.state.lock().ready.pop_front()
    }
}
