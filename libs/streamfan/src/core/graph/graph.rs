// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline topology: member nodes, links and the shared run-state.

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use super::link::{Link, LinkEndpoint, LinkId};
use crate::core::error::{Result, StreamError};
use crate::core::node::NodeId;
use crate::core::runtime::RunState;

/// Topology graph (DAG) over node ids.
///
/// Invariants: both endpoints of every link are members; a port carries at
/// most one link.
#[derive(Debug, Default)]
pub struct Graph {
    graph: StableDiGraph<NodeId, LinkId>,
    node_indices: HashMap<NodeId, NodeIndex>,
    /// Members in the order they joined.
    members: Vec<NodeId>,
    links: BTreeMap<LinkId, Link>,
    next_link: u64,
    state: RunState,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    /// Add a member. Returns false if it was already a member.
    pub fn add_node(&mut self, id: NodeId) -> bool {
        if self.node_indices.contains_key(&id) {
            return false;
        }
        let index = self.graph.add_node(id.clone());
        self.node_indices.insert(id.clone(), index);
        self.members.push(id);
        true
    }

    /// Remove a member and every link touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Vec<Link> {
        let Some(index) = self.node_indices.remove(id) else {
            return Vec::new();
        };
        self.graph.remove_node(index);
        self.members.retain(|m| m != id);

        let touching: Vec<LinkId> = self
            .links
            .values()
            .filter(|l| &l.source.node == id || &l.target.node == id)
            .map(|l| l.id)
            .collect();
        touching
            .into_iter()
            .filter_map(|link_id| self.links.remove(&link_id))
            .collect()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Member ids in join order.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn node_count(&self) -> usize {
        self.members.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Link leaving a source port, if any.
    pub fn link_from(&self, source: &LinkEndpoint) -> Option<&Link> {
        self.links.values().find(|l| &l.source == source)
    }

    /// Link entering a sink port, if any.
    pub fn link_into(&self, target: &LinkEndpoint) -> Option<&Link> {
        self.links.values().find(|l| &l.target == target)
    }

    pub fn is_linked(&self, endpoint: &LinkEndpoint) -> bool {
        self.links
            .values()
            .any(|l| &l.source == endpoint || &l.target == endpoint)
    }

    /// Whether any link touches the node.
    pub fn has_links(&self, id: &NodeId) -> bool {
        self.links
            .values()
            .any(|l| &l.source.node == id || &l.target.node == id)
    }

    /// Add a link between two member ports.
    ///
    /// A port already carrying a link is refused with
    /// [`StreamError::Link`]; the existing link is left untouched.
    pub fn add_link(&mut self, source: LinkEndpoint, target: LinkEndpoint) -> Result<LinkId> {
        let (Some(&from_idx), Some(&to_idx)) = (
            self.node_indices.get(&source.node),
            self.node_indices.get(&target.node),
        ) else {
            return Err(StreamError::link(
                source.to_address(),
                target.to_address(),
                "both nodes must be members of the graph",
            ));
        };

        if let Some(existing) = self.link_into(&target) {
            return Err(StreamError::link(
                source.to_address(),
                target.to_address(),
                format!("sink port already linked from {}", existing.source),
            ));
        }
        if let Some(existing) = self.link_from(&source) {
            return Err(StreamError::link(
                source.to_address(),
                target.to_address(),
                format!("source port already linked to {}", existing.target),
            ));
        }

        let id = LinkId::new(self.next_link);
        self.next_link += 1;
        self.graph.add_edge(from_idx, to_idx, id);
        self.links.insert(id, Link { id, source, target });
        Ok(id)
    }

    pub fn remove_link(&mut self, id: LinkId) -> Option<Link> {
        let link = self.links.remove(&id)?;
        if let Some(edge) = self.graph.edge_indices().find(|&e| self.graph[e] == id) {
            self.graph.remove_edge(edge);
        }
        Some(link)
    }

    /// Validate graph structure
    pub fn validate(&self) -> Result<()> {
        if is_cyclic_directed(&self.graph) {
            return Err(StreamError::Runtime("graph contains cycles".into()));
        }
        Ok(())
    }

    /// Drop every member and link.
    pub(crate) fn clear(&mut self) {
        self.graph.clear();
        self.node_indices.clear();
        self.members.clear();
        self.links.clear();
    }
}
