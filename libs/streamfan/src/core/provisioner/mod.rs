// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Reactions to outputs that appear while the pipeline is running.

mod branch;
mod linker;
mod outcome;

pub use branch::{BranchProvisioner, parse_stream_index};
pub use linker::RequestPortLinker;
pub use outcome::{Branch, BranchOutcome, RejectReason};

use crate::core::runtime::Pipeline;
use crate::core::scheduler::DiscoveryEvent;

/// Called on the event-loop thread for every discovered output, after the
/// port has been exposed on its node.
pub trait DiscoveryHandler: Send {
    fn on_output_discovered(
        &mut self,
        pipeline: &mut Pipeline,
        event: &DiscoveryEvent,
    ) -> BranchOutcome;

    /// Every branch that reached `Synchronized`, by stream index.
    fn branches(&self) -> Vec<Branch>;
}
