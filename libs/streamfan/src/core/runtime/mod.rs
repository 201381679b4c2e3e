// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod lifecycle;
mod pipeline;
mod state;

pub use lifecycle::{
    EXIT_STARTUP_FAILURE, LifecycleController, ProvisionStats, RunOutcome, ShutdownReport,
};
pub use pipeline::{Pipeline, SharedPipeline};
pub use state::RunState;
