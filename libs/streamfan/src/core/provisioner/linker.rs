// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::outcome::{Branch, BranchOutcome, RejectReason};
use super::DiscoveryHandler;
use crate::core::graph::LinkEndpoint;
use crate::core::runtime::Pipeline;
use crate::core::scheduler::DiscoveryEvent;

/// Attaches a discovered source output to one fixed request port of an
/// existing node (the muxer's `sink_0`). Creates no nodes.
///
/// A second output arriving while the port is taken is ignored.
#[derive(Debug)]
pub struct RequestPortLinker {
    target: LinkEndpoint,
    attached: Option<Branch>,
}

impl RequestPortLinker {
    pub fn new(target: LinkEndpoint) -> Self {
        Self {
            target,
            attached: None,
        }
    }

    pub fn target(&self) -> &LinkEndpoint {
        &self.target
    }
}

impl DiscoveryHandler for RequestPortLinker {
    fn on_output_discovered(
        &mut self,
        pipeline: &mut Pipeline,
        event: &DiscoveryEvent,
    ) -> BranchOutcome {
        let source = event.endpoint();

        if pipeline.graph().is_linked(&self.target) {
            tracing::info!("[RequestPortLinker] {} linked already", self.target);
            return BranchOutcome::Rejected(RejectReason::AlreadyLinked {
                port: self.target.to_address(),
            });
        }

        let kind = match pipeline.query_caps(&source) {
            Some(caps) => caps.kind(),
            None => {
                return BranchOutcome::Rejected(RejectReason::MissingDescriptor {
                    port: source.to_address(),
                });
            }
        };
        if !kind.is_video() {
            tracing::warn!("[RequestPortLinker] Ignoring {} ({})", source, kind);
            return BranchOutcome::Rejected(RejectReason::NotVideo { kind });
        }

        let stream_index = super::parse_stream_index(&event.port).unwrap_or(0);
        match pipeline.link(source.clone(), self.target.clone()) {
            Ok(link) => {
                tracing::info!("[RequestPortLinker] Linked {} -> {}", source, self.target);
                let branch = Branch {
                    stream_index,
                    nodes: Vec::new(),
                    links: vec![link],
                };
                self.attached = Some(branch.clone());
                BranchOutcome::Synchronized(branch)
            }
            Err(error) => {
                tracing::error!("[RequestPortLinker] Failed to link new output: {}", error);
                BranchOutcome::Failed {
                    stream_index,
                    error,
                }
            }
        }
    }

    fn branches(&self) -> Vec<Branch> {
        self.attached.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{StaticGraphBuilder, presets};
    use crate::core::config::PipelineConfig;
    use crate::core::media::MediaDescriptor;
    use crate::core::node::{NodeCatalog, NodeId};
    use crate::core::runtime::RunState;
    use std::sync::Arc;

    fn tiled() -> Pipeline {
        let config = PipelineConfig::default();
        let mut p = Pipeline::new("tiled", Arc::new(NodeCatalog::builtin()));
        p.create_node(&presets::tiled_source(&config)).unwrap();
        StaticGraphBuilder::new(presets::tiled_layout(&config))
            .build(&mut p)
            .unwrap();
        p.set_state(RunState::Running).unwrap();
        p
    }

    fn linker() -> RequestPortLinker {
        RequestPortLinker::new(LinkEndpoint::new(presets::MUXER, "sink_0"))
    }

    fn expose(p: &mut Pipeline, port: &str, caps: MediaDescriptor) -> DiscoveryEvent {
        let source = NodeId::from(presets::SOURCE);
        p.expose_port(&source, port, Some(caps.clone())).unwrap();
        DiscoveryEvent::new(source, port).with_caps(caps)
    }

    #[test]
    fn test_first_video_output_linked_to_sink_0() {
        let mut p = tiled();
        let nodes = p.node_count();
        let mut l = linker();

        let event = expose(&mut p, "vsrc_0", MediaDescriptor::nvmm_video("NV12"));
        assert!(l.on_output_discovered(&mut p, &event).is_synchronized());
        assert!(p.graph().is_linked(l.target()));
        assert_eq!(p.node_count(), nodes);
    }

    #[test]
    fn test_second_output_is_already_linked_noop() {
        let mut p = tiled();
        let mut l = linker();
        let first = expose(&mut p, "vsrc_0", MediaDescriptor::nvmm_video("NV12"));
        l.on_output_discovered(&mut p, &first);
        let links = p.graph().link_count();

        let second = expose(&mut p, "vsrc_1", MediaDescriptor::nvmm_video("NV12"));
        let outcome = l.on_output_discovered(&mut p, &second);

        assert!(matches!(
            outcome,
            BranchOutcome::Rejected(RejectReason::AlreadyLinked { .. })
        ));
        assert_eq!(p.graph().link_count(), links);
        let into = p.graph().link_into(l.target()).unwrap();
        assert_eq!(into.source.port, "vsrc_0");
    }

    #[test]
    fn test_audio_output_ignored() {
        let mut p = tiled();
        let mut l = linker();
        let event = expose(&mut p, "asrc_0", MediaDescriptor::new("audio/x-raw"));
        assert!(l.on_output_discovered(&mut p, &event).reject_reason().is_some());
        assert!(!p.graph().is_linked(l.target()));
        assert!(l.branches().is_empty());
    }
}
