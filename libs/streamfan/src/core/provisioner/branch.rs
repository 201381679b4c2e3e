// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;

use super::outcome::{Branch, BranchOutcome, RejectReason};
use super::DiscoveryHandler;
use crate::core::builder::BranchTemplate;
use crate::core::error::Result;
use crate::core::graph::{LinkEndpoint, LinkId};
use crate::core::node::NodeId;
use crate::core::runtime::Pipeline;
use crate::core::scheduler::DiscoveryEvent;

/// Stream index carried by an output port name: the decimal suffix after
/// the last `_` (`src_3` -> 3).
pub fn parse_stream_index(port: &str) -> Option<u32> {
    let (_, suffix) = port.rsplit_once('_')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Creates one branch per discovered video output of the splitter.
///
/// Each discovery runs `Discovered -> Validated -> Wired -> Synchronized`
/// to completion inside one call, or stops at `Rejected` / `Failed`. A
/// failed branch removes the nodes it created; other branches are never
/// touched.
#[derive(Debug)]
pub struct BranchProvisioner {
    template: BranchTemplate,
    branches: BTreeMap<u32, Branch>,
    rejected: usize,
    failed: usize,
}

impl BranchProvisioner {
    pub fn new(template: BranchTemplate) -> Self {
        Self {
            template,
            branches: BTreeMap::new(),
            rejected: 0,
            failed: 0,
        }
    }

    pub fn template(&self) -> &BranchTemplate {
        &self.template
    }

    pub fn branch(&self, stream_index: u32) -> Option<&Branch> {
        self.branches.get(&stream_index)
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    pub fn failed_count(&self) -> usize {
        self.failed
    }

    fn validate(
        &self,
        pipeline: &Pipeline,
        event: &DiscoveryEvent,
    ) -> std::result::Result<u32, RejectReason> {
        let index =
            parse_stream_index(&event.port).ok_or_else(|| RejectReason::UnparseableIndex {
                port: event.port.clone(),
            })?;

        if self.branches.contains_key(&index) {
            return Err(RejectReason::DuplicateIndex { index });
        }

        let caps = pipeline
            .query_caps(&event.endpoint())
            .ok_or_else(|| RejectReason::MissingDescriptor {
                port: event.endpoint().to_address(),
            })?;
        let kind = caps.kind();
        if !kind.is_video() {
            return Err(RejectReason::NotVideo { kind });
        }
        Ok(index)
    }

    /// Create, add and link the template nodes behind the discovered port.
    fn wire(
        &self,
        pipeline: &mut Pipeline,
        event: &DiscoveryEvent,
        index: u32,
        created: &mut Vec<NodeId>,
    ) -> Result<Vec<LinkId>> {
        for spec in self.template.instantiate(index)? {
            created.push(pipeline.create_node(&spec)?);
        }

        let mut links = pipeline.link_many(created)?;
        let entry = LinkEndpoint::new(created[0].clone(), "sink");
        links.insert(0, pipeline.link(event.endpoint(), entry)?);
        Ok(links)
    }
}

impl DiscoveryHandler for BranchProvisioner {
    fn on_output_discovered(
        &mut self,
        pipeline: &mut Pipeline,
        event: &DiscoveryEvent,
    ) -> BranchOutcome {
        let endpoint = event.endpoint();
        tracing::debug!("[BranchProvisioner] Discovered {}", endpoint);

        let index = match self.validate(pipeline, event) {
            Ok(index) => index,
            Err(reason) => {
                tracing::warn!("[BranchProvisioner] Rejected {}: {}", endpoint, reason);
                self.rejected += 1;
                return BranchOutcome::Rejected(reason);
            }
        };

        let mut created = Vec::with_capacity(self.template.len());
        let links = match self.wire(pipeline, event, index, &mut created) {
            Ok(links) => links,
            Err(error) => {
                tracing::error!(
                    "[BranchProvisioner] Stream {} could not be wired: {}",
                    index,
                    error
                );
                for id in created.iter().rev() {
                    pipeline.remove_node(id);
                }
                self.failed += 1;
                return BranchOutcome::Failed {
                    stream_index: index,
                    error,
                };
            }
        };

        for id in &created {
            if let Err(error) = pipeline.sync_state_with_parent(id) {
                // Nodes were just added; only an inconsistent graph gets here.
                tracing::error!("[BranchProvisioner] Stream {} sync failed: {}", index, error);
                for id in created.iter().rev() {
                    pipeline.remove_node(id);
                }
                self.failed += 1;
                return BranchOutcome::Failed {
                    stream_index: index,
                    error,
                };
            }
        }

        tracing::info!(
            "[BranchProvisioner] Stream {} synchronized ({} nodes, state {})",
            index,
            created.len(),
            pipeline.state()
        );
        let branch = Branch {
            stream_index: index,
            nodes: created,
            links,
        };
        self.branches.insert(index, branch.clone());
        BranchOutcome::Synchronized(branch)
    }

    fn branches(&self) -> Vec<Branch> {
        self.branches.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{presets, StaticGraphBuilder};
    use crate::core::config::PipelineConfig;
    use crate::core::error::StreamError;
    use crate::core::media::{MediaDescriptor, MediaKind};
    use crate::core::node::NodeCatalog;
    use crate::core::runtime::RunState;
    use std::sync::Arc;

    fn running_pipeline(catalog: NodeCatalog) -> Pipeline {
        let config = PipelineConfig::default();
        let mut p = Pipeline::new("test", Arc::new(catalog));
        StaticGraphBuilder::new(presets::multistream_layout(&config))
            .build(&mut p)
            .unwrap();
        p.set_state(RunState::Running).unwrap();
        p
    }

    fn provisioner() -> BranchProvisioner {
        BranchProvisioner::new(presets::rtp_branch_template(&PipelineConfig::default()).unwrap())
    }

    fn discover(p: &mut Pipeline, port: &str, caps: Option<MediaDescriptor>) -> DiscoveryEvent {
        p.expose_port(&NodeId::from("demux"), port, caps.clone()).unwrap();
        DiscoveryEvent {
            node: NodeId::from("demux"),
            port: port.to_string(),
            caps,
        }
    }

    #[test]
    fn test_parse_stream_index() {
        assert_eq!(parse_stream_index("src_0"), Some(0));
        assert_eq!(parse_stream_index("src_12"), Some(12));
        assert_eq!(parse_stream_index("video_src_3"), Some(3));
        assert_eq!(parse_stream_index("src"), None);
        assert_eq!(parse_stream_index("src_"), None);
        assert_eq!(parse_stream_index("src_x1"), None);
        assert_eq!(parse_stream_index("src_-1"), None);
    }

    #[test]
    fn test_video_output_becomes_synchronized_branch() {
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = provisioner();
        let before = p.node_count();

        let event = discover(&mut p, "src_2", Some(MediaDescriptor::nvmm_video("NV12")));
        let outcome = prov.on_output_discovered(&mut p, &event);

        let branch = outcome.branch().expect("synchronized");
        assert_eq!(branch.stream_index, 2);
        assert_eq!(p.node_count(), before + prov.template().len());
        assert_eq!(branch.links.len(), prov.template().len());
        for id in &branch.nodes {
            assert_eq!(p.node(id).unwrap().state(), RunState::Running);
        }
        let sink = p.node(&NodeId::from("udpsink_2")).unwrap();
        assert_eq!(sink.option_u64("port"), Some(5402));
        assert_eq!(sink.option_str("host"), Some("127.0.0.1"));
    }

    #[test]
    fn test_audio_output_rejected_without_new_nodes() {
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = provisioner();
        let before = p.node_count();

        let event = discover(&mut p, "src_0", Some(MediaDescriptor::new("audio/x-raw")));
        let outcome = prov.on_output_discovered(&mut p, &event);

        assert_eq!(
            outcome.reject_reason(),
            Some(&RejectReason::NotVideo {
                kind: MediaKind::Audio
            })
        );
        assert_eq!(p.node_count(), before);
        assert_eq!(prov.rejected_count(), 1);
    }

    #[test]
    fn test_missing_caps_and_bad_index_rejected() {
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = provisioner();

        let no_caps = discover(&mut p, "src_1", None);
        assert!(matches!(
            prov.on_output_discovered(&mut p, &no_caps),
            BranchOutcome::Rejected(RejectReason::MissingDescriptor { .. })
        ));

        let bad = DiscoveryEvent::new("demux", "src_abc");
        assert!(matches!(
            prov.on_output_discovered(&mut p, &bad),
            BranchOutcome::Rejected(RejectReason::UnparseableIndex { .. })
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = provisioner();
        let video = Some(MediaDescriptor::nvmm_video("NV12"));

        let first = discover(&mut p, "src_0", video.clone());
        assert!(prov.on_output_discovered(&mut p, &first).is_synchronized());
        let count = p.node_count();

        let again = discover(&mut p, "src_0", video);
        assert_eq!(
            prov.on_output_discovered(&mut p, &again).reject_reason(),
            Some(&RejectReason::DuplicateIndex { index: 0 })
        );
        assert_eq!(p.node_count(), count);
    }

    #[test]
    fn test_duplicate_index_wins_over_kind() {
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = provisioner();

        let first = discover(&mut p, "src_0", Some(MediaDescriptor::nvmm_video("NV12")));
        assert!(prov.on_output_discovered(&mut p, &first).is_synchronized());

        let audio = discover(&mut p, "src_0", Some(MediaDescriptor::new("audio/x-raw")));
        assert_eq!(
            prov.on_output_discovered(&mut p, &audio).reject_reason(),
            Some(&RejectReason::DuplicateIndex { index: 0 })
        );
        assert_eq!(prov.branches().len(), 1);
    }

    #[test]
    fn test_branches_in_either_order() {
        for order in [[0u32, 1], [1, 0]] {
            let mut p = running_pipeline(NodeCatalog::builtin());
            let mut prov = provisioner();
            for i in order {
                let event = discover(
                    &mut p,
                    &format!("src_{}", i),
                    Some(MediaDescriptor::nvmm_video("NV12")),
                );
                assert!(prov.on_output_discovered(&mut p, &event).is_synchronized());
            }
            assert_eq!(prov.branches().len(), 2);
        }
    }

    #[test]
    fn test_failed_branch_rolls_back_and_spares_others() {
        let config = PipelineConfig {
            base_udp_port: 65534,
            sources: vec!["videotestsrc://".into()],
            ..Default::default()
        };
        let mut p = running_pipeline(NodeCatalog::builtin());
        let mut prov = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());
        let video = Some(MediaDescriptor::nvmm_video("NV12"));

        let ok = discover(&mut p, "src_1", video.clone());
        assert!(prov.on_output_discovered(&mut p, &ok).is_synchronized());
        let count = p.node_count();

        // 65534 + 2 overflows the relay port range.
        let overflow = discover(&mut p, "src_2", video);
        match prov.on_output_discovered(&mut p, &overflow) {
            BranchOutcome::Failed { stream_index, error } => {
                assert_eq!(stream_index, 2);
                assert!(matches!(error, StreamError::Configuration(_)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(p.node_count(), count);
        assert!(prov.branch(1).is_some());
        assert_eq!(prov.failed_count(), 1);
    }

    #[test]
    fn test_missing_node_type_fails_branch_only() {
        let mut p = running_pipeline(NodeCatalog::builtin().without("nvdsosd"));
        let mut prov = provisioner();
        let before = p.node_count();

        let event = discover(&mut p, "src_0", Some(MediaDescriptor::nvmm_video("NV12")));
        let outcome = prov.on_output_discovered(&mut p, &event);

        assert!(matches!(
            outcome,
            BranchOutcome::Failed {
                error: StreamError::Creation { .. },
                ..
            }
        ));
        assert_eq!(p.node_count(), before);
        assert!(p.node(&NodeId::from("queue_0")).is_none());
        assert_eq!(p.state(), RunState::Running);
    }
}
