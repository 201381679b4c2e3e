// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Assembles a ready-to-start pipeline from a [`PipelineConfig`].

use std::sync::Arc;

use crate::core::builder::{StaticGraphBuilder, presets};
use crate::core::config::{PipelineConfig, PipelineMode};
use crate::core::dataflow::{DataPlaneSettings, DataPlaneStats, UriDataPlane};
use crate::core::endpoint::{EndpointRegistrar, MountPoints};
use crate::core::error::Result;
use crate::core::graph::LinkEndpoint;
use crate::core::node::NodeCatalog;
use crate::core::provisioner::{BranchProvisioner, DiscoveryHandler, RequestPortLinker};
use crate::core::runtime::{LifecycleController, Pipeline};
use crate::core::scheduler::Scheduler;

const PIPELINE_NAME: &str = "ds-pipeline";

/// Static graph, discovery handler, data plane and mount table for one run.
pub struct Session {
    config: PipelineConfig,
    controller: LifecycleController,
    mounts: MountPoints,
    data_stats: Arc<DataPlaneStats>,
}

impl Session {
    /// Validate the config, build the static graph and register every
    /// endpoint. Any error here is a startup failure.
    pub fn build(
        config: PipelineConfig,
        catalog: Arc<NodeCatalog>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let mut pipeline = Pipeline::new(PIPELINE_NAME, catalog);

        let (handler, mounts): (Box<dyn DiscoveryHandler>, MountPoints) = match config.mode {
            PipelineMode::Multistream => {
                StaticGraphBuilder::new(presets::multistream_layout(&config))
                    .build(&mut pipeline)?;
                let provisioner = BranchProvisioner::new(presets::rtp_branch_template(&config)?);
                let mounts = EndpointRegistrar::from_config(&config)?.register_all()?;
                (Box::new(provisioner), mounts)
            }
            PipelineMode::Tiled => {
                pipeline.create_node(&presets::tiled_source(&config))?;
                StaticGraphBuilder::new(presets::tiled_layout(&config)).build(&mut pipeline)?;
                let linker =
                    RequestPortLinker::new(LinkEndpoint::new(presets::MUXER, "sink_0"));
                (Box::new(linker), MountPoints::new())
            }
        };

        let data_plane = UriDataPlane::new(DataPlaneSettings::from_config(&config));
        let data_stats = data_plane.stats();

        let mut controller = LifecycleController::new(pipeline.into_shared(), handler, scheduler)
            .with_data_plane(Box::new(data_plane));
        if let Some(dir) = config.resolved_dump_dir() {
            controller = controller.with_graph_dump(dir, config.dump_delay());
        }

        tracing::info!(
            "[Session] {} pipeline ready with {} inputs",
            config.mode,
            config.slot_count()
        );
        Ok(Self {
            config,
            controller,
            mounts,
            data_stats,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mounts(&self) -> &MountPoints {
        &self.mounts
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut LifecycleController {
        &mut self.controller
    }

    pub fn data_stats(&self) -> &DataPlaneStats {
        &self.data_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StreamError;
    use crate::core::scheduler::ManualScheduler;

    fn build(config: PipelineConfig, catalog: NodeCatalog) -> Result<Session> {
        Session::build(config, Arc::new(catalog), Arc::new(ManualScheduler::new()))
    }

    #[test]
    fn test_multistream_session_registers_all_mounts() {
        let session = build(PipelineConfig::default(), NodeCatalog::builtin()).unwrap();
        assert_eq!(session.mounts().len(), 4);
        assert_eq!(session.controller().pipeline().read().node_count(), 3);
    }

    #[test]
    fn test_tiled_session_has_no_mounts() {
        let config = PipelineConfig {
            mode: PipelineMode::Tiled,
            sources: vec!["videotestsrc://".into()],
            ..Default::default()
        };
        let session = build(config, NodeCatalog::builtin()).unwrap();
        assert!(session.mounts().is_empty());
        // source + ten-node chain
        assert_eq!(session.controller().pipeline().read().node_count(), 11);
    }

    #[test]
    fn test_missing_inference_type_is_startup_failure() {
        let err = build(PipelineConfig::default(), NodeCatalog::builtin().without("nvinfer"))
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Creation { .. }));
    }

    #[test]
    fn test_invalid_config_is_startup_failure() {
        let config = PipelineConfig {
            sources: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            build(config, NodeCatalog::builtin()),
            Err(StreamError::Configuration(_))
        ));
    }
}
