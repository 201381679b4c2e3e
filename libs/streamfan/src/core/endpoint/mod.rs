// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stream endpoints: one mount per potential stream slot and the server
//! that publishes them.

mod mounts;
mod registrar;
mod server;

pub use mounts::{MountEntry, MountPoints, RelayDescription};
pub use registrar::EndpointRegistrar;
pub use server::{RelayStatus, ServerHandle, StreamServer};
