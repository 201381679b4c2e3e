// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Dynamic fan-out video pipelines.
//!
//! A fixed upstream segment (batched multi-source ingest, inference, stream
//! demultiplexer) feeds per-stream branches that are provisioned while the
//! pipeline is already running. Every potential stream slot is exposed as a
//! relay endpoint up front, whether or not its branch ever appears.

#![allow(clippy::type_complexity)] // Complex types are clear in context

pub mod core;

pub use core::{
    Branch, BranchOutcome, BranchProvisioner, BranchTemplate, BusMessage, DataPlane,
    DataPlaneSettings, DiscoveryEvent, DiscoveryHandler, EXIT_STARTUP_FAILURE, EndpointRegistrar,
    LifecycleController, LinkEndpoint, LoopEvent, MainLoop, ManualScheduler, MediaDescriptor,
    MediaKind, MountEntry, MountPoints, NodeCatalog, NodeId, NodeRegistry, NodeSpec, OptionValue,
    Pipeline, PipelineConfig, PipelineMode, RejectReason, RelayStatus, RequestPortLinker, Result,
    RunOutcome, RunState, Scheduler, ServerHandle, Session, SharedPipeline, ShutdownReport,
    StaticGraphBuilder, StreamError, StreamServer, UriDataPlane,
};
