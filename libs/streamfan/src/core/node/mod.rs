// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod catalog;
#[allow(clippy::module_inception)]
mod node;
mod options;
mod registry;

pub use catalog::{
    NodeCatalog, NodeRole, NodeTypeDescriptor, PortDirection, PortPresence, PortTemplate,
};
pub use node::{Node, NodeId, Port};
pub use options::{NodeOptions, OptionKind, OptionValue};
pub use registry::NodeRegistry;
