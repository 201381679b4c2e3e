// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::core::graph::LinkEndpoint;
use crate::core::media::MediaDescriptor;
use crate::core::node::NodeId;

/// A node exposed a new output port at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEvent {
    pub node: NodeId,
    pub port: String,
    /// Caps the node negotiated for the port, if any.
    pub caps: Option<MediaDescriptor>,
}

impl DiscoveryEvent {
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
            caps: None,
        }
    }

    pub fn with_caps(mut self, caps: MediaDescriptor) -> Self {
        self.caps = Some(caps);
        self
    }

    pub fn endpoint(&self) -> LinkEndpoint {
        LinkEndpoint::new(self.node.clone(), self.port.clone())
    }
}

/// Runtime signals posted by data threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// Every input is exhausted.
    EndOfStream,
    /// A single input ran out while others continue.
    StreamEnded { stream_index: u32 },
    Error { source: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    DumpGraph,
}

/// Everything the event loop dispatches.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    OutputDiscovered(DiscoveryEvent),
    Bus(BusMessage),
    Timer(TimerTask),
    Quit,
}

impl From<DiscoveryEvent> for LoopEvent {
    fn from(event: DiscoveryEvent) -> Self {
        Self::OutputDiscovered(event)
    }
}

impl From<BusMessage> for LoopEvent {
    fn from(message: BusMessage) -> Self {
        Self::Bus(message)
    }
}
