// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Node chains for the built-in layouts.

use super::spec::NodeSpec;
use super::template::BranchTemplate;
use crate::core::config::PipelineConfig;
use crate::core::error::Result;
use crate::core::media::MediaDescriptor;

pub const SOURCE: &str = "source";
pub const INFER: &str = "infer";
pub const DEMUX: &str = "demux";
pub const MUXER: &str = "stream-muxer";

/// Branch sinks always send to the relays on this host.
pub const LOOPBACK: &str = "127.0.0.1";

/// Batched multi-URI source -> inference -> demultiplexer.
pub fn multistream_layout(config: &PipelineConfig) -> Vec<NodeSpec> {
    let batch = config.effective_batch_size();
    vec![
        NodeSpec::new("nvmultiurisrcbin", SOURCE)
            .with_option("uri-list", config.sources.join(","))
            .with_option("width", config.width)
            .with_option("height", config.height)
            .with_option("enable-padding", true)
            .with_option("batched-push-timeout", config.batched_push_timeout_us)
            .with_option("max-batch-size", batch)
            .with_option("file-loop", config.file_loop),
        NodeSpec::new("nvinfer", INFER)
            .with_option("config-file-path", config.infer_config_path.as_str())
            .with_option("batch-size", batch),
        NodeSpec::new("nvstreamdemux", DEMUX),
    ]
}

/// Per-stream branch: convert, overlay, encode and send as RTP over UDP.
pub fn rtp_branch_template(config: &PipelineConfig) -> Result<BranchTemplate> {
    BranchTemplate::new(
        vec![
            NodeSpec::new("queue", "queue"),
            NodeSpec::new("nvvideoconvert", "convert_rgba"),
            NodeSpec::new("capsfilter", "caps_rgba")
                .with_option("caps", MediaDescriptor::nvmm_video("RGBA")),
            NodeSpec::new("nvdsosd", "osd").with_option("display-clock", true),
            NodeSpec::new("nvvideoconvert", "convert_nv12"),
            NodeSpec::new("capsfilter", "caps_nv12")
                .with_option("caps", MediaDescriptor::nvmm_video("NV12")),
            NodeSpec::new("nvv4l2h264enc", "encoder")
                .with_option("bitrate", config.bitrate)
                .with_option("insert-sps-pps", true)
                .with_option("bufapi-version", true),
            NodeSpec::new("rtph264pay", "rtppay")
                .with_option("pt", 96u32)
                .with_option("config-interval", 1i64),
            NodeSpec::new("udpsink", "udpsink")
                .with_option("sync", true)
                .with_option("async", false),
        ],
        config.base_udp_port,
        LOOPBACK,
    )
}

/// Single-source source node for the tiled layout. Its output appears at
/// runtime and is attached to the muxer's `sink_0`.
pub fn tiled_source(config: &PipelineConfig) -> NodeSpec {
    let uri = config.sources.first().cloned().unwrap_or_default();
    NodeSpec::new("nvurisrcbin", SOURCE)
        .with_option("uri", uri)
        .with_option("file-loop", config.file_loop)
}

/// Stream muxer -> inference -> tiler -> overlay -> NV12 -> H.264 -> MP4 file.
pub fn tiled_layout(config: &PipelineConfig) -> Vec<NodeSpec> {
    vec![
        NodeSpec::new("nvstreammux", MUXER)
            .with_option("width", config.width)
            .with_option("height", config.height)
            .with_option("batch-size", 1u32)
            .with_option("batched-push-timeout", config.batched_push_timeout_us)
            .with_option("live-source", false),
        NodeSpec::new("nvinfer", INFER)
            .with_option("config-file-path", config.infer_config_path.as_str()),
        NodeSpec::new("nvmultistreamtiler", "stream-tiler")
            .with_option("rows", 1u32)
            .with_option("columns", 1u32)
            .with_option("width", config.width)
            .with_option("height", config.height),
        NodeSpec::new("nvdsosd", "onscreen-display")
            .with_option("process-mode", 1i64)
            .with_option("display-text", true)
            .with_option("font-size", 12u32)
            .with_option("show-clock", true),
        NodeSpec::new("nvvideoconvert", "video-converter"),
        NodeSpec::new("capsfilter", "caps")
            .with_option("caps", MediaDescriptor::nvmm_video("NV12")),
        NodeSpec::new("nvv4l2h264enc", "h264-encoder")
            .with_option("bitrate", config.bitrate)
            .with_option("preset-level", 1u32)
            .with_option("insert-sps-pps", true)
            .with_option("bufapi-version", true),
        NodeSpec::new("h264parse", "h264-parser"),
        NodeSpec::new("qtmux", "muxer"),
        NodeSpec::new("filesink", "sink")
            .with_option("location", config.output_location.to_string_lossy().into_owned())
            .with_option("sync", false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_template_shape() {
        let template = rtp_branch_template(&PipelineConfig::default()).unwrap();
        let types: Vec<&str> = template.nodes().iter().map(|s| s.node_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "queue",
                "nvvideoconvert",
                "capsfilter",
                "nvdsosd",
                "nvvideoconvert",
                "capsfilter",
                "nvv4l2h264enc",
                "rtph264pay",
                "udpsink"
            ]
        );
        assert_eq!(template.relay_port(2).unwrap(), 5402);
    }

    #[test]
    fn test_branch_sink_targets_loopback() {
        let config = PipelineConfig {
            server_host: "10.0.0.2".to_string(),
            ..Default::default()
        };
        let template = rtp_branch_template(&config).unwrap();
        assert_eq!(template.host(), LOOPBACK);

        let nodes = template.instantiate(1).unwrap();
        let sink = nodes.last().unwrap();
        assert_eq!(sink.options.get("host").and_then(|v| v.as_str()), Some("127.0.0.1"));
        assert_eq!(sink.options.get("port").and_then(|v| v.as_u64()), Some(5401));
    }

    #[test]
    fn test_multistream_layout_carries_uri_list() {
        let config = PipelineConfig {
            sources: vec!["file:///a.mp4".into(), "file:///b.mp4".into()],
            ..Default::default()
        };
        let layout = multistream_layout(&config);
        let uris = layout[0].options.get("uri-list").and_then(|v| v.as_str());
        assert_eq!(uris, Some("file:///a.mp4,file:///b.mp4"));
        assert_eq!(layout[1].options.get("batch-size").and_then(|v| v.as_u64()), Some(2));
    }
}
