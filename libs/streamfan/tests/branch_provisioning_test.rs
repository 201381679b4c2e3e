// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Branch provisioning against the multistream static graph, through the
//! public API only.

use std::sync::Arc;

use streamfan::core::builder::presets;
use streamfan::{
    BranchOutcome, BranchProvisioner, DiscoveryEvent, DiscoveryHandler, LinkEndpoint,
    MediaDescriptor, NodeCatalog, NodeId, Pipeline, PipelineConfig, RejectReason, RunState,
    StaticGraphBuilder, StreamError,
};

// =============================================================================
// Helpers
// =============================================================================

fn running_pipeline(config: &PipelineConfig, catalog: NodeCatalog) -> Pipeline {
    let mut pipeline = Pipeline::new("provisioning", Arc::new(catalog));
    StaticGraphBuilder::new(presets::multistream_layout(config))
        .build(&mut pipeline)
        .unwrap();
    pipeline.set_state(RunState::Running).unwrap();
    pipeline
}

/// Expose `port` on the demuxer and build the matching discovery event.
fn discovered(pipeline: &mut Pipeline, port: &str, caps: MediaDescriptor) -> DiscoveryEvent {
    let demux = NodeId::from(presets::DEMUX);
    pipeline
        .expose_port(&demux, port, Some(caps.clone()))
        .unwrap();
    DiscoveryEvent::new(demux, port).with_caps(caps)
}

fn nv12() -> MediaDescriptor {
    MediaDescriptor::nvmm_video("NV12")
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_valid_video_output_grows_graph_by_template_length() {
    let config = PipelineConfig::default();
    let mut pipeline = running_pipeline(&config, NodeCatalog::builtin());
    let mut provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());
    let before = pipeline.node_count();

    let event = discovered(&mut pipeline, "src_1", nv12());
    let outcome = provisioner.on_output_discovered(&mut pipeline, &event);

    let branch = outcome.branch().expect("branch should be synchronized");
    assert_eq!(branch.stream_index, 1);
    assert_eq!(pipeline.node_count(), before + provisioner.template().len());
    assert!(
        branch
            .nodes
            .iter()
            .all(|id| pipeline.node(id).unwrap().state() == RunState::Running)
    );

    // Demuxer output feeds the first template node.
    let link = pipeline
        .graph()
        .link_from(&LinkEndpoint::new(presets::DEMUX, "src_1"))
        .unwrap();
    assert_eq!(link.target, LinkEndpoint::new("queue_1", "sink"));

    let rtppay = pipeline.node(&NodeId::from("rtppay_1")).unwrap();
    assert_eq!(rtppay.option_u64("pt"), Some(96));
    let encoder = pipeline.node(&NodeId::from("encoder_1")).unwrap();
    assert_eq!(encoder.option_u64("bitrate"), Some(4_000_000));
    assert_eq!(encoder.option_bool("insert-sps-pps"), Some(true));
}

#[test]
fn test_non_video_output_never_creates_nodes() {
    let config = PipelineConfig::default();
    let mut pipeline = running_pipeline(&config, NodeCatalog::builtin());
    let mut provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());
    let before = pipeline.node_count();

    for (port, caps) in [
        ("src_0", MediaDescriptor::new("audio/x-raw")),
        ("src_1", MediaDescriptor::new("application/x-rtp")),
    ] {
        let event = discovered(&mut pipeline, port, caps);
        let outcome = provisioner.on_output_discovered(&mut pipeline, &event);
        assert!(matches!(
            outcome,
            BranchOutcome::Rejected(RejectReason::NotVideo { .. })
        ));
    }

    assert_eq!(pipeline.node_count(), before);
    assert!(provisioner.branches().is_empty());
}

#[test]
fn test_two_indices_in_either_order() {
    let config = PipelineConfig::default();
    for order in [["src_0", "src_3"], ["src_3", "src_0"]] {
        let mut pipeline = running_pipeline(&config, NodeCatalog::builtin());
        let mut provisioner =
            BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());

        for port in order {
            let event = discovered(&mut pipeline, port, nv12());
            assert!(
                provisioner
                    .on_output_discovered(&mut pipeline, &event)
                    .is_synchronized()
            );
        }

        let indices: Vec<u32> = provisioner
            .branches()
            .iter()
            .map(|b| b.stream_index)
            .collect();
        assert_eq!(indices, vec![0, 3]);
    }
}

#[test]
fn test_failed_branch_does_not_revert_sibling() {
    // Relay port for index 1 is the last valid one, index 2 overflows.
    let config = PipelineConfig {
        base_udp_port: 65534,
        sources: vec!["videotestsrc://".into(); 2],
        service_port: 8554,
        ..Default::default()
    };
    let mut pipeline = running_pipeline(&config, NodeCatalog::builtin());
    let mut provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());

    let ok = discovered(&mut pipeline, "src_1", nv12());
    assert!(
        provisioner
            .on_output_discovered(&mut pipeline, &ok)
            .is_synchronized()
    );
    let nodes = pipeline.node_count();

    let overflow = discovered(&mut pipeline, "src_2", nv12());
    let outcome = provisioner.on_output_discovered(&mut pipeline, &overflow);
    assert!(matches!(
        outcome,
        BranchOutcome::Failed {
            stream_index: 2,
            error: StreamError::Configuration(_)
        }
    ));

    assert_eq!(pipeline.node_count(), nodes);
    assert!(provisioner.branch(1).is_some());
    let sink = pipeline.node(&NodeId::from("udpsink_1")).unwrap();
    assert_eq!(sink.option_u64("port"), Some(65535));
    assert_eq!(sink.state(), RunState::Running);
}

#[test]
fn test_second_link_into_linked_sink_keeps_first() {
    let config = PipelineConfig::default();
    let mut pipeline = running_pipeline(&config, NodeCatalog::builtin());
    let mut provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());

    let first = discovered(&mut pipeline, "src_0", nv12());
    provisioner.on_output_discovered(&mut pipeline, &first);
    discovered(&mut pipeline, "src_1", nv12());

    let links = pipeline.graph().link_count();
    let err = pipeline
        .link(
            LinkEndpoint::new(presets::DEMUX, "src_1"),
            LinkEndpoint::new("queue_0", "sink"),
        )
        .unwrap_err();

    assert!(matches!(err, StreamError::Link { .. }));
    assert_eq!(pipeline.graph().link_count(), links);
    let existing = pipeline
        .graph()
        .link_into(&LinkEndpoint::new("queue_0", "sink"))
        .unwrap();
    assert_eq!(existing.source, LinkEndpoint::new(presets::DEMUX, "src_0"));
}

#[test]
fn test_unavailable_branch_type_is_isolated_failure() {
    let config = PipelineConfig::default();
    let mut pipeline = running_pipeline(&config, NodeCatalog::builtin().without("nvv4l2h264enc"));
    let mut provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config).unwrap());
    let before = pipeline.node_count();

    let event = discovered(&mut pipeline, "src_0", nv12());
    let outcome = provisioner.on_output_discovered(&mut pipeline, &event);

    assert!(matches!(
        outcome,
        BranchOutcome::Failed {
            error: StreamError::Creation { .. },
            ..
        }
    ));
    assert_eq!(pipeline.node_count(), before);
    assert_eq!(pipeline.registry().len(), before);
    assert_eq!(pipeline.state(), RunState::Running);
}
