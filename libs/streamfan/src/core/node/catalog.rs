// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node type catalog.
//!
//! The catalog stands in for the processing runtime's plugin registry: it
//! lists which node types can be created, the ports each type exposes and
//! the options it recognizes. A type missing from the catalog cannot be
//! created, which is how "element not available in this environment" is
//! modelled.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::options::OptionKind;
use crate::core::media::MediaKind;

/// Direction of a port relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Produces data (output).
    Src,
    /// Consumes data (input).
    Sink,
}

/// When a port comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortPresence {
    /// Created together with the node.
    Always,
    /// Appears at runtime once the node discovers a stream.
    Sometimes,
    /// Created on demand when something links to it.
    Request,
}

/// Port template declared by a node type. Templates for `Sometimes` and
/// `Request` ports use a `%u` placeholder (`src_%u`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortTemplate {
    pub name: String,
    pub direction: PortDirection,
    pub presence: PortPresence,
    /// Media kind the port carries, `None` when any kind is acceptable.
    pub kind: Option<MediaKind>,
}

impl PortTemplate {
    pub fn always(name: &str, direction: PortDirection, kind: Option<MediaKind>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            presence: PortPresence::Always,
            kind,
        }
    }

    pub fn sometimes(name: &str, direction: PortDirection, kind: Option<MediaKind>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            presence: PortPresence::Sometimes,
            kind,
        }
    }

    pub fn request(name: &str, direction: PortDirection, kind: Option<MediaKind>) -> Self {
        Self {
            name: name.to_string(),
            direction,
            presence: PortPresence::Request,
            kind,
        }
    }

    /// Whether a concrete port name is an instance of this template.
    pub fn matches(&self, port_name: &str) -> bool {
        match self.name.split_once("%u") {
            Some((prefix, suffix)) => port_name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .is_some_and(|digits| {
                    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
                }),
            None => self.name == port_name,
        }
    }

    /// Concrete port name for instance `index` of this template.
    pub fn instance_name(&self, index: u32) -> String {
        self.name.replacen("%u", &index.to_string(), 1)
    }
}

/// What a node type does in the pipeline, as far as the data plane cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Multi-URI source that also batches its inputs.
    BatchedSource,
    /// Single-URI source.
    Source,
    /// Batches inputs arriving on request ports.
    Batcher,
    /// Splits a batch back into per-stream outputs.
    Splitter,
    /// Any one-in one-out stage.
    Transform,
    /// Sends units to a UDP host/port.
    NetworkSink,
    /// Appends units to a file.
    FileSink,
    /// Discards units.
    NullSink,
}

impl NodeRole {
    pub fn is_source(self) -> bool {
        matches!(self, Self::BatchedSource | Self::Source)
    }

    pub fn is_sink(self) -> bool {
        matches!(self, Self::NetworkSink | Self::FileSink | Self::NullSink)
    }
}

/// Static description of a node type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeDescriptor {
    pub name: String,
    pub role: NodeRole,
    pub ports: Vec<PortTemplate>,
    pub options: BTreeMap<String, OptionKind>,
}

impl NodeTypeDescriptor {
    pub fn new(name: &str, role: NodeRole) -> Self {
        Self {
            name: name.to_string(),
            role,
            ports: Vec::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn port(mut self, template: PortTemplate) -> Self {
        self.ports.push(template);
        self
    }

    pub fn option(mut self, key: &str, kind: OptionKind) -> Self {
        self.options.insert(key.to_string(), kind);
        self
    }

    /// One-in one-out stage with `sink` and `src` always-ports.
    fn filter(name: &str, kind: Option<MediaKind>) -> Self {
        Self::new(name, NodeRole::Transform)
            .port(PortTemplate::always("sink", PortDirection::Sink, kind.clone()))
            .port(PortTemplate::always("src", PortDirection::Src, kind))
    }

    pub fn option_kind(&self, key: &str) -> Option<OptionKind> {
        self.options.get(key).copied()
    }

    /// Template a concrete port name belongs to.
    pub fn template_for(&self, port_name: &str) -> Option<&PortTemplate> {
        self.ports.iter().find(|t| t.matches(port_name))
    }

    pub fn request_template(&self, direction: PortDirection) -> Option<&PortTemplate> {
        self.ports
            .iter()
            .find(|t| t.direction == direction && t.presence == PortPresence::Request)
    }
}

/// Registry of creatable node types.
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    types: HashMap<String, Arc<NodeTypeDescriptor>>,
}

impl NodeCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every node type the built-in pipelines use.
    pub fn builtin() -> Self {
        use MediaKind::Video;
        use OptionKind::*;
        use PortDirection::{Sink, Src};

        let mut catalog = Self::empty();

        catalog.register(
            NodeTypeDescriptor::new("nvmultiurisrcbin", NodeRole::BatchedSource)
                .port(PortTemplate::always("src", Src, Some(Video)))
                .option("uri-list", Str)
                .option("width", Uint)
                .option("height", Uint)
                .option("enable-padding", Bool)
                .option("batched-push-timeout", Int)
                .option("max-batch-size", Uint)
                .option("batch-size", Uint)
                .option("file-loop", Bool)
                .option("live-source", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::new("nvurisrcbin", NodeRole::Source)
                .port(PortTemplate::sometimes("vsrc_%u", Src, Some(Video)))
                .port(PortTemplate::sometimes("asrc_%u", Src, Some(MediaKind::Audio)))
                .option("uri", Str)
                .option("file-loop", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::new("nvstreammux", NodeRole::Batcher)
                .port(PortTemplate::request("sink_%u", Sink, Some(Video)))
                .port(PortTemplate::always("src", Src, Some(Video)))
                .option("width", Uint)
                .option("height", Uint)
                .option("batch-size", Uint)
                .option("batched-push-timeout", Int)
                .option("live-source", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::filter("nvinfer", Some(Video))
                .option("config-file-path", Str)
                .option("batch-size", Uint)
                .option("unique-id", Uint)
                .option("gpu-id", Uint),
        );
        catalog.register(
            NodeTypeDescriptor::new("nvstreamdemux", NodeRole::Splitter)
                .port(PortTemplate::always("sink", Sink, Some(Video)))
                .port(PortTemplate::sometimes("src_%u", Src, None))
                .option("per-stream-eos", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::filter("queue", None)
                .option("max-size-buffers", Uint)
                .option("max-size-bytes", Uint)
                .option("max-size-time", Uint)
                .option("leaky", Int),
        );
        catalog.register(
            NodeTypeDescriptor::filter("nvvideoconvert", Some(Video))
                .option("gpu-id", Uint)
                .option("nvbuf-memory-type", Int),
        );
        catalog.register(NodeTypeDescriptor::filter("capsfilter", None).option("caps", Caps));
        catalog.register(
            NodeTypeDescriptor::filter("nvdsosd", Some(Video))
                .option("process-mode", Int)
                .option("display-text", Bool)
                .option("display-clock", Bool)
                .option("font-size", Uint)
                .option("gpu-id", Uint)
                .option("show-clock", Bool)
                .option("clock-x-offset", Uint)
                .option("clock-y-offset", Uint)
                .option("clock-text-size", Uint)
                .option("clock-color", Uint),
        );
        catalog.register(
            NodeTypeDescriptor::filter("nvmultistreamtiler", Some(Video))
                .option("rows", Uint)
                .option("columns", Uint)
                .option("width", Uint)
                .option("height", Uint),
        );
        catalog.register(
            NodeTypeDescriptor::filter("nvv4l2h264enc", Some(Video))
                .option("bitrate", Uint)
                .option("preset-level", Uint)
                .option("insert-sps-pps", Bool)
                .option("bufapi-version", Bool)
                .option("iframeinterval", Uint),
        );
        catalog.register(
            NodeTypeDescriptor::filter("rtph264pay", Some(Video))
                .option("pt", Uint)
                .option("config-interval", Int),
        );
        catalog.register(
            NodeTypeDescriptor::filter("h264parse", Some(Video)).option("config-interval", Int),
        );
        catalog.register(
            NodeTypeDescriptor::new("qtmux", NodeRole::Transform)
                .port(PortTemplate::request("video_%u", Sink, Some(Video)))
                .port(PortTemplate::always("src", Src, None))
                .option("faststart", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::new("udpsink", NodeRole::NetworkSink)
                .port(PortTemplate::always("sink", Sink, None))
                .option("host", Str)
                .option("port", Uint)
                .option("sync", Bool)
                .option("async", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::new("filesink", NodeRole::FileSink)
                .port(PortTemplate::always("sink", Sink, None))
                .option("location", Str)
                .option("sync", Bool)
                .option("async", Bool),
        );
        catalog.register(
            NodeTypeDescriptor::new("fakesink", NodeRole::NullSink)
                .port(PortTemplate::always("sink", Sink, None))
                .option("sync", Bool),
        );

        catalog
    }

    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        self.types
            .insert(descriptor.name.clone(), Arc::new(descriptor));
    }

    /// Copy of this catalog without `node_type`, as if its plugin were not
    /// installed.
    pub fn without(mut self, node_type: &str) -> Self {
        self.types.remove(node_type);
        self
    }

    pub fn lookup(&self, node_type: &str) -> Option<Arc<NodeTypeDescriptor>> {
        self.types.get(node_type).cloned()
    }

    pub fn can_create(&self, node_type: &str) -> bool {
        self.types.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_matching() {
        let t = PortTemplate::sometimes("src_%u", PortDirection::Src, None);
        assert!(t.matches("src_0"));
        assert!(t.matches("src_12"));
        assert!(!t.matches("src_"));
        assert!(!t.matches("src_x"));
        assert!(!t.matches("sink_0"));
        assert_eq!(t.instance_name(3), "src_3");

        let fixed = PortTemplate::always("sink", PortDirection::Sink, None);
        assert!(fixed.matches("sink"));
        assert!(!fixed.matches("sink_0"));
    }

    #[test]
    fn test_builtin_catalog_has_branch_types() {
        let catalog = NodeCatalog::builtin();
        for t in [
            "queue",
            "nvvideoconvert",
            "capsfilter",
            "nvdsosd",
            "nvv4l2h264enc",
            "rtph264pay",
            "udpsink",
        ] {
            assert!(catalog.can_create(t), "missing {}", t);
        }
        assert!(!catalog.can_create("UnknownElement"));
    }

    #[test]
    fn test_without_removes_type() {
        let catalog = NodeCatalog::builtin().without("nvinfer");
        assert!(!catalog.can_create("nvinfer"));
        assert!(catalog.can_create("nvstreamdemux"));
    }

    #[test]
    fn test_request_template_lookup() {
        let mux = NodeCatalog::builtin().lookup("nvstreammux").unwrap();
        let t = mux.request_template(PortDirection::Sink).unwrap();
        assert_eq!(t.name, "sink_%u");
        assert!(mux.request_template(PortDirection::Src).is_none());
        assert_eq!(mux.option_kind("batch-size"), Some(OptionKind::Uint));
    }
}
