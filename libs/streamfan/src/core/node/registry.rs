// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node registry: creates, configures and owns every node.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::catalog::NodeCatalog;
use super::node::{Node, NodeId};
use super::options::NodeOptions;
use crate::core::error::{Result, StreamError};

/// Owner of all node instances. Graphs and branches refer to nodes by id.
#[derive(Debug)]
pub struct NodeRegistry {
    catalog: Arc<NodeCatalog>,
    nodes: BTreeMap<NodeId, Node>,
    name_counters: HashMap<String, u64>,
}

impl NodeRegistry {
    pub fn new(catalog: Arc<NodeCatalog>) -> Self {
        Self {
            catalog,
            nodes: BTreeMap::new(),
            name_counters: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &NodeCatalog {
        &self.catalog
    }

    /// Create a node of `node_type`.
    ///
    /// Without a name the node is called `<type><n>` with a per-type
    /// counter. Fails with [`StreamError::Creation`] when the type is not in
    /// the catalog or the name is already taken.
    pub fn create(&mut self, node_type: &str, name: Option<&str>) -> Result<NodeId> {
        let descriptor = self.catalog.lookup(node_type).ok_or_else(|| {
            StreamError::creation(node_type, "node type not available in this environment")
        })?;

        let id = match name {
            Some(name) => NodeId::from(name),
            None => self.next_name(node_type),
        };

        if self.nodes.contains_key(&id) {
            return Err(StreamError::creation(
                node_type,
                format!("name '{}' is already in use", id),
            ));
        }

        self.nodes.insert(id.clone(), Node::new(id.clone(), descriptor));
        tracing::debug!("[NodeRegistry] Created {} ({})", id, node_type);
        Ok(id)
    }

    fn next_name(&mut self, node_type: &str) -> NodeId {
        loop {
            let counter = self.name_counters.entry(node_type.to_string()).or_insert(0);
            let candidate = NodeId::from(format!("{}{}", node_type, counter));
            *counter += 1;
            if !self.nodes.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Apply `options` to a node.
    ///
    /// Unrecognized keys and values of the wrong kind are logged and
    /// skipped; the rejected keys are returned. Only a missing node is an
    /// error.
    pub fn configure(&mut self, id: &NodeId, options: &NodeOptions) -> Result<Vec<String>> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| StreamError::NodeNotFound(id.to_string()))?;

        let mut rejected = Vec::new();
        for (key, value) in options.iter() {
            let Some(kind) = node.descriptor().option_kind(key) else {
                tracing::warn!(
                    "[NodeRegistry] {} ({}) has no option '{}', ignoring",
                    id,
                    node.node_type(),
                    key
                );
                rejected.push(key.clone());
                continue;
            };

            match kind.coerce(value) {
                Some(coerced) => node.set_option(key.clone(), coerced),
                None => {
                    tracing::warn!(
                        "[NodeRegistry] {}: value {} is not a valid {:?} for '{}', ignoring",
                        id,
                        value,
                        kind,
                        key
                    );
                    rejected.push(key.clone());
                }
            }
        }
        Ok(rejected)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Release one node.
    pub(crate) fn destroy(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    /// Release every node.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.nodes.len();
        self.nodes.clear();
        count
    }
}
