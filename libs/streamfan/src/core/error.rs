// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// The requested node type is not available in the node catalog, or the
    /// node name is already taken.
    #[error("Node creation failed for '{node_type}': {reason}")]
    Creation { node_type: String, reason: String },

    /// A link could not be made (port already linked, unknown port,
    /// non-member node, incompatible media kinds).
    #[error("Link {from} -> {to} failed: {reason}")]
    Link {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Invalid caps '{0}'")]
    InvalidCaps(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    pub(crate) fn link(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Link {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn creation(node_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Creation {
            node_type: node_type.into(),
            reason: reason.into(),
        }
    }

    /// True for the failures that abort startup but stay local to a branch
    /// once the pipeline is running.
    pub fn is_topology_error(&self) -> bool {
        matches!(self, Self::Creation { .. } | Self::Link { .. })
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
