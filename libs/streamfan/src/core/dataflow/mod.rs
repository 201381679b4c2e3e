// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod plane;
mod probe;
mod route;

pub use plane::{DataPlane, DataPlaneContext, DataPlaneSettings, DataPlaneStats, UriDataPlane};
pub use probe::{ProbedSource, probe};
pub use route::{Route, RouteSink, resolve};
