// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Run-state shared by a pipeline and its member nodes.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a pipeline.
///
/// # State Transitions
///
/// ```text
/// ┌──────┐ start() ┌─────────┐ EOS / error / stop() ┌──────────┐ ┌─────────┐
/// │ Idle │────────►│ Running │─────────────────────►│ Draining │►│ Stopped │
/// └──┬───┘         └─────────┘                      └──────────┘ └─────────┘
///    │                                                                 ▲
///    └─────────────────────────────────────────────────────────────────┘
/// ```
///
/// Nodes carry their own copy of the state. Setting the pipeline state
/// propagates to every member; a node added afterwards stays `Idle` until
/// it is explicitly synchronized with its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Draining,
    Stopped,
}

impl RunState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Stopped)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Stopped)
        )
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}
