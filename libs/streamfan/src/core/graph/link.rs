// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::node::NodeId;

/// Unique link identifier within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(u64);

impl LinkId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link_{}", self.0)
    }
}

/// One endpoint of a link (source or target)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEndpoint {
    /// Node ID
    pub node: NodeId,
    /// Port name on the node
    pub port: String,
}

impl LinkEndpoint {
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Convert to port address format "node.port"
    pub fn to_address(&self) -> String {
        format!("{}.{}", self.node, self.port)
    }
}

impl fmt::Display for LinkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Directed connection from a source port to a sink port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub source: LinkEndpoint,
    pub target: LinkEndpoint,
}

impl Link {
    /// Get source port address in "node.port" format
    pub fn from_port(&self) -> String {
        self.source.to_address()
    }

    /// Get target port address in "node.port" format
    pub fn to_port(&self) -> String {
        self.target.to_address()
    }
}
