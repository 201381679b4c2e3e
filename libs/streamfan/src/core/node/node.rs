// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::catalog::{NodeRole, NodeTypeDescriptor, PortDirection, PortPresence};
use super::options::OptionValue;
use crate::core::error::{Result, StreamError};
use crate::core::media::{MediaDescriptor, MediaKind};
use crate::core::runtime::RunState;

/// Unique node identifier (the node's name within its registry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Concrete port on a node instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub direction: PortDirection,
    pub presence: PortPresence,
    /// Caps negotiated for this port, set for ports exposed at discovery.
    pub caps: Option<MediaDescriptor>,
    /// Media kind accepted/produced by the port's template.
    pub kind: Option<MediaKind>,
}

impl Port {
    /// Effective media kind: negotiated caps first, then the template kind.
    pub fn media_kind(&self) -> Option<MediaKind> {
        self.caps
            .as_ref()
            .map(MediaDescriptor::kind)
            .or_else(|| self.kind.clone())
    }
}

/// Processing node owned by a [`NodeRegistry`](super::NodeRegistry).
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    descriptor: Arc<NodeTypeDescriptor>,
    options: BTreeMap<String, OptionValue>,
    ports: Vec<Port>,
    state: RunState,
}

impl Node {
    pub(crate) fn new(id: NodeId, descriptor: Arc<NodeTypeDescriptor>) -> Self {
        let ports = descriptor
            .ports
            .iter()
            .filter(|t| t.presence == PortPresence::Always)
            .map(|t| Port {
                name: t.name.clone(),
                direction: t.direction,
                presence: t.presence,
                caps: None,
                kind: t.kind.clone(),
            })
            .collect();

        Self {
            id,
            descriptor,
            options: BTreeMap::new(),
            ports,
            state: RunState::Idle,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.descriptor.name
    }

    pub fn role(&self) -> NodeRole {
        self.descriptor.role
    }

    pub fn descriptor(&self) -> &NodeTypeDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub fn options(&self) -> &BTreeMap<String, OptionValue> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options.get(key)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(OptionValue::as_str)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.option(key).and_then(OptionValue::as_u64)
    }

    pub fn option_i64(&self, key: &str) -> Option<i64> {
        self.option(key).and_then(OptionValue::as_i64)
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.option(key).and_then(OptionValue::as_bool)
    }

    pub(crate) fn set_option(&mut self, key: String, value: OptionValue) {
        self.options.insert(key, value);
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn src_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Src)
    }

    pub fn sink_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports
            .iter()
            .filter(|p| p.direction == PortDirection::Sink)
    }

    /// Expose a port that the node discovered at runtime.
    ///
    /// The name must match one of the type's `Sometimes` templates. Exposing
    /// an existing port again only refreshes its caps.
    pub(crate) fn expose_port(
        &mut self,
        name: &str,
        caps: Option<MediaDescriptor>,
    ) -> Result<()> {
        if let Some(existing) = self.ports.iter_mut().find(|p| p.name == name) {
            existing.caps = caps;
            return Ok(());
        }

        let template = self
            .descriptor
            .template_for(name)
            .filter(|t| t.presence == PortPresence::Sometimes)
            .ok_or_else(|| {
                StreamError::Runtime(format!(
                    "{} has no sometimes-port template matching '{}'",
                    self.id, name
                ))
            })?;

        self.ports.push(Port {
            name: name.to_string(),
            direction: template.direction,
            presence: PortPresence::Sometimes,
            caps,
            kind: template.kind.clone(),
        });
        Ok(())
    }

    /// Instantiate a request port by name (`sink_0`) or, when `name` is
    /// `None`, the next free instance of the request template.
    pub(crate) fn request_port(
        &mut self,
        direction: PortDirection,
        name: Option<&str>,
    ) -> Result<String> {
        let template = self
            .descriptor
            .request_template(direction)
            .cloned()
            .ok_or_else(|| {
                StreamError::Runtime(format!(
                    "{} ({}) has no request {:?} ports",
                    self.id,
                    self.node_type(),
                    direction
                ))
            })?;

        let port_name = match name {
            Some(name) if template.matches(name) => name.to_string(),
            Some(name) => {
                return Err(StreamError::Runtime(format!(
                    "'{}' is not a valid request port of {} (template {})",
                    name, self.id, template.name
                )))
            }
            None => (0..)
                .map(|i| template.instance_name(i))
                .find(|candidate| self.port(candidate).is_none())
                .unwrap_or_else(|| template.instance_name(0)),
        };

        if self.port(&port_name).is_none() {
            self.ports.push(Port {
                name: port_name.clone(),
                direction,
                presence: PortPresence::Request,
                caps: None,
                kind: template.kind.clone(),
            });
        }
        Ok(port_name)
    }
}
