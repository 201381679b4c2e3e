// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#[allow(clippy::module_inception)]
mod graph;
mod link;
mod snapshot;

pub use graph::Graph;
pub use link::{Link, LinkEndpoint, LinkId};
pub use snapshot::{GraphSnapshot, LinkSnapshot, NodeSnapshot, DUMP_DIR_ENV, DUMP_FILE_NAME};
