// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::error::StreamError;
use crate::core::graph::LinkId;
use crate::core::media::MediaKind;
use crate::core::node::NodeId;

/// Nodes and links created for one stream index.
///
/// Does not own anything: the nodes belong to the registry and live until
/// the pipeline is torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub stream_index: u32,
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
}

/// Why a discovered output was dropped without creating anything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("output carries {kind}, not video")]
    NotVideo { kind: MediaKind },

    #[error("no stream index in port name '{port}'")]
    UnparseableIndex { port: String },

    #[error("stream {index} already has a branch")]
    DuplicateIndex { index: u32 },

    #[error("no media descriptor on '{port}'")]
    MissingDescriptor { port: String },

    #[error("'{port}' is already linked")]
    AlreadyLinked { port: String },
}

/// Terminal state of one discovered output.
#[derive(Debug)]
pub enum BranchOutcome {
    Synchronized(Branch),
    Rejected(RejectReason),
    Failed { stream_index: u32, error: StreamError },
}

impl BranchOutcome {
    pub fn is_synchronized(&self) -> bool {
        matches!(self, Self::Synchronized(_))
    }

    pub fn branch(&self) -> Option<&Branch> {
        match self {
            Self::Synchronized(branch) => Some(branch),
            _ => None,
        }
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}
