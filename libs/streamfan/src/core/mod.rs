// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod builder;
pub mod config;
pub mod dataflow;
pub mod endpoint;
pub mod error;
pub mod graph;
pub mod media;
pub mod node;
pub mod provisioner;
pub mod runtime;
pub mod scheduler;
pub mod session;

pub use builder::{BranchTemplate, NodeSpec, StaticGraphBuilder};
pub use config::{PipelineConfig, PipelineMode};
pub use dataflow::{DataPlane, DataPlaneContext, DataPlaneSettings, UriDataPlane};
pub use endpoint::{
    EndpointRegistrar, MountEntry, MountPoints, RelayDescription, RelayStatus, ServerHandle,
    StreamServer,
};
pub use error::{Result, StreamError};
pub use graph::{Graph, GraphSnapshot, Link, LinkEndpoint, LinkId};
pub use media::{MediaDescriptor, MediaKind};
pub use node::{Node, NodeCatalog, NodeId, NodeOptions, NodeRegistry, NodeRole, OptionValue};
pub use provisioner::{
    Branch, BranchOutcome, BranchProvisioner, DiscoveryHandler, RejectReason, RequestPortLinker,
};
pub use runtime::{
    EXIT_STARTUP_FAILURE, LifecycleController, Pipeline, ProvisionStats, RunOutcome, RunState,
    SharedPipeline, ShutdownReport,
};
pub use scheduler::{BusMessage, DiscoveryEvent, LoopEvent, MainLoop, ManualScheduler, Scheduler};
pub use session::Session;
