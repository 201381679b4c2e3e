// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::spec::NodeSpec;
use crate::core::error::Result;
use crate::core::node::NodeId;
use crate::core::runtime::Pipeline;

/// Builds a fixed node chain into a pipeline.
///
/// Nodes are created and added in order, then linked pairwise. Any failure
/// removes everything this build created, so a failed build never leaves a
/// partial chain behind.
#[derive(Debug, Clone)]
pub struct StaticGraphBuilder {
    chain: Vec<NodeSpec>,
}

impl StaticGraphBuilder {
    pub fn new(chain: Vec<NodeSpec>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &[NodeSpec] {
        &self.chain
    }

    pub fn build(&self, pipeline: &mut Pipeline) -> Result<Vec<NodeId>> {
        let mut created = Vec::with_capacity(self.chain.len());

        let result = self.create_and_link(pipeline, &mut created);
        if let Err(e) = result {
            tracing::error!("[StaticGraphBuilder] Build failed: {}", e);
            for id in created.iter().rev() {
                pipeline.remove_node(id);
            }
            return Err(e);
        }

        tracing::info!(
            "[StaticGraphBuilder] Built {}",
            created
                .iter()
                .map(NodeId::as_str)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(created)
    }

    fn create_and_link(&self, pipeline: &mut Pipeline, created: &mut Vec<NodeId>) -> Result<()> {
        for spec in &self.chain {
            created.push(pipeline.create_node(spec)?);
        }
        pipeline.link_many(created)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StreamError;
    use crate::core::graph::LinkEndpoint;
    use crate::core::node::NodeCatalog;
    use std::sync::Arc;

    fn pipeline(catalog: NodeCatalog) -> Pipeline {
        Pipeline::new("static", Arc::new(catalog))
    }

    #[test]
    fn test_build_links_in_order() {
        let mut p = pipeline(NodeCatalog::builtin());
        let ids = StaticGraphBuilder::new(vec![
            NodeSpec::new("queue", "a"),
            NodeSpec::new("nvvideoconvert", "b"),
            NodeSpec::new("fakesink", "c"),
        ])
        .build(&mut p)
        .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(p.graph().link_count(), 2);
        let into_sink = LinkEndpoint::new("c", "sink");
        assert!(p.graph().link_into(&into_sink).is_some());
    }

    #[test]
    fn test_missing_type_tears_down_partial_graph() {
        let mut p = pipeline(NodeCatalog::builtin().without("nvinfer"));
        let err = StaticGraphBuilder::new(vec![
            NodeSpec::new("queue", "a"),
            NodeSpec::new("nvinfer", "infer"),
        ])
        .build(&mut p)
        .unwrap_err();

        assert!(matches!(err, StreamError::Creation { .. }));
        assert_eq!(p.node_count(), 0);
        assert!(p.registry().is_empty());
    }

    #[test]
    fn test_link_failure_identifies_pair() {
        let mut p = pipeline(NodeCatalog::builtin());
        // A sink has no source port to link from.
        let err = StaticGraphBuilder::new(vec![
            NodeSpec::new("queue", "a"),
            NodeSpec::new("fakesink", "sink"),
            NodeSpec::new("queue", "b"),
        ])
        .build(&mut p)
        .unwrap_err();

        match err {
            StreamError::Link { from, to, .. } => {
                assert_eq!(from, "sink");
                assert_eq!(to, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(p.node_count(), 0);
    }
}
