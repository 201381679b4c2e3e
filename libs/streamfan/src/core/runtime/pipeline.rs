// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The running pipeline: node registry plus topology graph.
//!
//! Topology is mutated only from the event-loop thread (startup, discovery
//! callbacks, teardown). Data threads take the read side of
//! [`SharedPipeline`] to follow links and never mutate it.

use std::sync::Arc;

use parking_lot::RwLock;

use super::state::RunState;
use crate::core::builder::NodeSpec;
use crate::core::error::{Result, StreamError};
use crate::core::graph::{Graph, GraphSnapshot, LinkEndpoint, LinkId, LinkSnapshot, NodeSnapshot};
use crate::core::media::MediaDescriptor;
use crate::core::node::{
    Node, NodeCatalog, NodeId, NodeOptions, NodeRegistry, PortDirection, PortPresence,
};

/// Pipeline shared between the event loop (writer) and data threads (readers).
pub type SharedPipeline = Arc<RwLock<Pipeline>>;

#[derive(Debug)]
pub struct Pipeline {
    name: String,
    registry: NodeRegistry,
    graph: Graph,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, catalog: Arc<NodeCatalog>) -> Self {
        Self {
            name: name.into(),
            registry: NodeRegistry::new(catalog),
            graph: Graph::new(),
        }
    }

    pub fn into_shared(self) -> SharedPipeline {
        Arc::new(RwLock::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn state(&self) -> RunState {
        self.graph.state()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.registry.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// First member node of the given type.
    pub fn find_by_type(&self, node_type: &str) -> Option<&Node> {
        self.graph
            .members()
            .iter()
            .filter_map(|id| self.registry.get(id))
            .find(|n| n.node_type() == node_type)
    }

    /// Create a node from a [`NodeSpec`], configure it and add it to the graph.
    pub fn create_node(&mut self, spec: &NodeSpec) -> Result<NodeId> {
        let id = self.registry.create(&spec.node_type, spec.name.as_deref())?;
        self.registry.configure(&id, &spec.options)?;
        self.graph.add_node(id.clone());
        Ok(id)
    }

    /// Reconfigure a node. Refused once the node is linked into a running
    /// pipeline.
    pub fn configure(&mut self, id: &NodeId, options: &NodeOptions) -> Result<Vec<String>> {
        if self.graph.state().is_running() && self.graph.has_links(id) {
            tracing::warn!(
                "[Pipeline {}] Refusing to reconfigure {} while it is wired and running",
                self.name,
                id
            );
            return Err(StreamError::InvalidState(format!(
                "{} is wired into a running pipeline",
                id
            )));
        }
        self.registry.configure(id, options)
    }

    /// Link two ports.
    ///
    /// Request ports (`sink_%u`) are instantiated on demand. The link is
    /// refused when either port is already linked, when a port does not
    /// exist (yet), or when the media kinds on both sides disagree.
    pub fn link(&mut self, source: LinkEndpoint, target: LinkEndpoint) -> Result<LinkId> {
        if self.graph.is_linked(&source) || self.graph.is_linked(&target) {
            // Let the graph produce the precise "already linked" error.
            return self.graph.add_link(source, target);
        }

        self.resolve_port(&source, &target, PortDirection::Src)?;
        self.resolve_port(&source, &target, PortDirection::Sink)?;

        let src_kind = self
            .registry
            .get(&source.node)
            .and_then(|n| n.port(&source.port))
            .and_then(|p| p.media_kind());
        let sink_kind = self
            .registry
            .get(&target.node)
            .and_then(|n| n.port(&target.port))
            .and_then(|p| p.kind.clone());

        if let (Some(src_kind), Some(sink_kind)) = (&src_kind, &sink_kind) {
            if src_kind != sink_kind {
                return Err(StreamError::link(
                    source.to_address(),
                    target.to_address(),
                    format!("incompatible media: {} -> {}", src_kind, sink_kind),
                ));
            }
        }

        let id = self.graph.add_link(source, target)?;
        if let Some(link) = self.graph.link(id) {
            tracing::debug!("[Pipeline {}] Linked {} -> {}", self.name, link.source, link.target);
        }
        Ok(id)
    }

    /// Make sure the port named by the endpoint for `direction` exists,
    /// instantiating a request port if the node type declares one.
    fn resolve_port(
        &mut self,
        source: &LinkEndpoint,
        target: &LinkEndpoint,
        direction: PortDirection,
    ) -> Result<()> {
        let endpoint = match direction {
            PortDirection::Src => source,
            PortDirection::Sink => target,
        };
        let fail = |reason: String| StreamError::link(source.to_address(), target.to_address(), reason);

        if !self.graph.contains(&endpoint.node) {
            return Err(fail(format!("{} is not a member of the graph", endpoint.node)));
        }
        let node = self
            .registry
            .get_mut(&endpoint.node)
            .ok_or_else(|| fail(format!("{} does not exist", endpoint.node)))?;

        if let Some(port) = node.port(&endpoint.port) {
            if port.direction != direction {
                return Err(fail(format!(
                    "{} is not a {:?} port",
                    endpoint,
                    direction
                )));
            }
            return Ok(());
        }

        match node.descriptor().template_for(&endpoint.port).map(|t| t.presence) {
            Some(PortPresence::Request) => {
                node.request_port(direction, Some(&endpoint.port))
                    .map_err(|e| fail(e.to_string()))?;
                Ok(())
            }
            Some(PortPresence::Sometimes) => Err(fail(format!("{} has not appeared yet", endpoint))),
            _ => Err(fail(format!("{} has no port '{}'", endpoint.node, endpoint.port))),
        }
    }

    /// Link two nodes by picking the first free source port of `upstream`
    /// and the first free sink port of `downstream`, requesting new ports
    /// where the node types allow it.
    pub fn link_nodes(&mut self, upstream: &NodeId, downstream: &NodeId) -> Result<LinkId> {
        let src_port = self.free_port(upstream, downstream, PortDirection::Src)?;
        let sink_port = self.free_port(upstream, downstream, PortDirection::Sink)?;
        self.link(
            LinkEndpoint::new(upstream.clone(), src_port),
            LinkEndpoint::new(downstream.clone(), sink_port),
        )
    }

    fn free_port(
        &mut self,
        upstream: &NodeId,
        downstream: &NodeId,
        direction: PortDirection,
    ) -> Result<String> {
        let id = match direction {
            PortDirection::Src => upstream,
            PortDirection::Sink => downstream,
        };
        let node = self.registry.get(id).ok_or_else(|| {
            StreamError::link(upstream.as_str(), downstream.as_str(), format!("{} does not exist", id))
        })?;

        let free = node
            .ports()
            .iter()
            .filter(|p| p.direction == direction && p.presence == PortPresence::Always)
            .find(|p| !self.graph.is_linked(&LinkEndpoint::new(id.clone(), p.name.clone())))
            .map(|p| p.name.clone());
        if let Some(name) = free {
            return Ok(name);
        }

        if node.descriptor().request_template(direction).is_some() {
            if let Some(node) = self.registry.get_mut(id) {
                return node
                    .request_port(direction, None)
                    .map_err(|e| StreamError::link(upstream.as_str(), downstream.as_str(), e.to_string()));
            }
        }

        Err(StreamError::link(
            upstream.as_str(),
            downstream.as_str(),
            format!("{} has no free {:?} port", id, direction),
        ))
    }

    /// Link `nodes` pairwise in order. Stops at the first failing pair.
    pub fn link_many(&mut self, nodes: &[NodeId]) -> Result<Vec<LinkId>> {
        let mut links = Vec::with_capacity(nodes.len().saturating_sub(1));
        for pair in nodes.windows(2) {
            links.push(self.link_nodes(&pair[0], &pair[1])?);
        }
        Ok(links)
    }

    /// Expose a port the node discovered at runtime, with its caps.
    ///
    /// A port that is already linked keeps the caps it was linked with; a
    /// repeated announcement for it leaves the node untouched.
    pub fn expose_port(
        &mut self,
        node: &NodeId,
        port: &str,
        caps: Option<MediaDescriptor>,
    ) -> Result<()> {
        let endpoint = LinkEndpoint::new(node.clone(), port);
        if self.graph.is_linked(&endpoint) {
            tracing::warn!(
                "[Pipeline {}] {} is already linked, keeping its caps",
                self.name,
                endpoint
            );
            return Ok(());
        }

        self.registry
            .get_mut(node)
            .ok_or_else(|| StreamError::NodeNotFound(node.to_string()))?
            .expose_port(port, caps)
    }

    /// Caps currently attached to a port.
    pub fn query_caps(&self, endpoint: &LinkEndpoint) -> Option<MediaDescriptor> {
        self.registry
            .get(&endpoint.node)?
            .port(&endpoint.port)?
            .caps
            .clone()
    }

    /// Move the pipeline to `state` and propagate it to every member node.
    pub fn set_state(&mut self, state: RunState) -> Result<()> {
        let current = self.graph.state();
        if !current.can_transition_to(state) {
            return Err(StreamError::InvalidState(format!(
                "pipeline '{}' cannot go from {} to {}",
                self.name, current, state
            )));
        }

        self.graph.set_state(state);
        for id in self.graph.members() {
            if let Some(node) = self.registry.get_mut(id) {
                node.set_state(state);
            }
        }
        tracing::info!(
            "[Pipeline {}] {} -> {} ({} nodes)",
            self.name,
            current,
            state,
            self.graph.node_count()
        );
        Ok(())
    }

    /// Bring one member node to the pipeline's current state.
    pub fn sync_state_with_parent(&mut self, id: &NodeId) -> Result<RunState> {
        if !self.graph.contains(id) {
            return Err(StreamError::NodeNotFound(id.to_string()));
        }
        let state = self.graph.state();
        let node = self
            .registry
            .get_mut(id)
            .ok_or_else(|| StreamError::NodeNotFound(id.to_string()))?;
        node.set_state(state);
        Ok(state)
    }

    /// Unlink, remove and release a node.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.graph.remove_node(id);
        self.registry.destroy(id)
    }

    /// Release every node and link. Returns the number of nodes released.
    pub fn teardown(&mut self) -> usize {
        self.graph.clear();
        let released = self.registry.clear();
        tracing::debug!("[Pipeline {}] Released {} nodes", self.name, released);
        released
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .graph
            .members()
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|node| NodeSnapshot {
                id: node.id().clone(),
                node_type: node.node_type().to_string(),
                state: node.state(),
                options: node
                    .options()
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect(),
            })
            .collect();

        GraphSnapshot {
            name: self.name.clone(),
            state: self.graph.state(),
            nodes,
            links: self.graph.links().map(LinkSnapshot::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media::MediaKind;

    fn pipeline() -> Pipeline {
        Pipeline::new("test", Arc::new(NodeCatalog::builtin()))
    }

    fn add(p: &mut Pipeline, node_type: &str, name: &str) -> NodeId {
        p.create_node(&NodeSpec::new(node_type, name)).unwrap()
    }

    #[test]
    fn test_link_nodes_uses_always_ports() {
        let mut p = pipeline();
        let q = add(&mut p, "queue", "q");
        let c = add(&mut p, "nvvideoconvert", "conv");
        let id = p.link_nodes(&q, &c).unwrap();
        let link = p.graph().link(id).unwrap();
        assert_eq!(link.from_port(), "q.src");
        assert_eq!(link.to_port(), "conv.sink");
    }

    #[test]
    fn test_link_nodes_requests_sink_ports() {
        let mut p = pipeline();
        let a = add(&mut p, "queue", "a");
        let b = add(&mut p, "queue", "b");
        let mux = add(&mut p, "nvstreammux", "mux");
        p.link_nodes(&a, &mux).unwrap();
        let second = p.link_nodes(&b, &mux).unwrap();
        assert_eq!(p.graph().link(second).unwrap().to_port(), "mux.sink_1");
    }

    #[test]
    fn test_second_link_onto_linked_sink_is_noop_failure() {
        let mut p = pipeline();
        let a = add(&mut p, "queue", "a");
        let b = add(&mut p, "queue", "b");
        let sink = add(&mut p, "fakesink", "sink");

        let first = p
            .link(LinkEndpoint::new(a.clone(), "src"), LinkEndpoint::new(sink.clone(), "sink"))
            .unwrap();
        let err = p
            .link(LinkEndpoint::new(b, "src"), LinkEndpoint::new(sink.clone(), "sink"))
            .unwrap_err();

        assert!(matches!(err, StreamError::Link { .. }));
        assert_eq!(p.graph().link_count(), 1);
        assert_eq!(p.graph().link(first).unwrap().source.node, a);
    }

    #[test]
    fn test_link_to_unexposed_sometimes_port_fails() {
        let mut p = pipeline();
        let demux = add(&mut p, "nvstreamdemux", "demux");
        let q = add(&mut p, "queue", "q");
        let err = p
            .link(LinkEndpoint::new(demux, "src_0"), LinkEndpoint::new(q, "sink"))
            .unwrap_err();
        assert!(err.to_string().contains("has not appeared yet"));
    }

    #[test]
    fn test_incompatible_kinds_refused() {
        let mut p = pipeline();
        let demux = add(&mut p, "nvstreamdemux", "demux");
        let conv = add(&mut p, "nvvideoconvert", "conv");
        p.expose_port(&demux, "src_0", Some(MediaDescriptor::new("audio/x-raw")))
            .unwrap();

        let err = p
            .link(LinkEndpoint::new(demux.clone(), "src_0"), LinkEndpoint::new(conv, "sink"))
            .unwrap_err();
        assert!(err.to_string().contains("incompatible media"));
        assert_eq!(
            p.query_caps(&LinkEndpoint::new(demux, "src_0")).map(|c| c.kind()),
            Some(MediaKind::Audio)
        );
    }

    #[test]
    fn test_linked_port_keeps_caps_on_reexpose() {
        let mut p = pipeline();
        let demux = add(&mut p, "nvstreamdemux", "demux");
        let q = add(&mut p, "queue", "q");
        let out = LinkEndpoint::new(demux.clone(), "src_0");

        // Unlinked ports take the latest caps.
        p.expose_port(&demux, "src_0", Some(MediaDescriptor::new("audio/x-raw")))
            .unwrap();
        p.expose_port(&demux, "src_0", Some(MediaDescriptor::nvmm_video("NV12")))
            .unwrap();
        p.link(out.clone(), LinkEndpoint::new(q, "sink")).unwrap();

        p.expose_port(&demux, "src_0", Some(MediaDescriptor::new("audio/x-raw")))
            .unwrap();
        assert_eq!(p.query_caps(&out).map(|c| c.kind()), Some(MediaKind::Video));
    }

    #[test]
    fn test_find_by_type() {
        let mut p = pipeline();
        add(&mut p, "queue", "q");
        let demux = add(&mut p, "nvstreamdemux", "demux");
        assert_eq!(p.find_by_type("nvstreamdemux").map(|n| n.id()), Some(&demux));
        assert!(p.find_by_type("nvinfer").is_none());
    }

    #[test]
    fn test_set_state_propagates_and_late_nodes_need_sync() {
        let mut p = pipeline();
        let a = add(&mut p, "queue", "a");
        p.set_state(RunState::Running).unwrap();
        assert_eq!(p.node(&a).unwrap().state(), RunState::Running);

        let late = add(&mut p, "queue", "late");
        assert_eq!(p.node(&late).unwrap().state(), RunState::Idle);

        assert_eq!(p.sync_state_with_parent(&late).unwrap(), RunState::Running);
        assert_eq!(p.node(&late).unwrap().state(), RunState::Running);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut p = pipeline();
        assert!(p.set_state(RunState::Draining).is_err());
        assert_eq!(p.state(), RunState::Idle);
    }

    #[test]
    fn test_configure_refused_when_wired_and_running() {
        let mut p = pipeline();
        let a = add(&mut p, "queue", "a");
        let b = add(&mut p, "queue", "b");
        p.link_nodes(&a, &b).unwrap();
        p.set_state(RunState::Running).unwrap();

        let opts = NodeOptions::new().with("max-size-buffers", 10u32);
        assert!(matches!(p.configure(&a, &opts), Err(StreamError::InvalidState(_))));
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut p = pipeline();
        let a = add(&mut p, "queue", "a");
        let b = add(&mut p, "queue", "b");
        p.link_nodes(&a, &b).unwrap();
        assert_eq!(p.teardown(), 2);
        assert_eq!(p.node_count(), 0);
        assert!(p.registry().is_empty());
        assert_eq!(p.graph().link_count(), 0);
    }

    #[test]
    fn test_snapshot_lists_nodes_in_join_order() {
        let mut p = pipeline();
        add(&mut p, "queue", "first");
        add(&mut p, "fakesink", "second");
        let snap = p.snapshot();
        let ids: Vec<&str> = snap.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }
}
