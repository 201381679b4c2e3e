// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::pipeline::SharedPipeline;
use super::state::RunState;
use crate::core::dataflow::{DataPlane, DataPlaneContext};
use crate::core::error::{Result, StreamError};
use crate::core::graph::GraphSnapshot;
use crate::core::provisioner::{Branch, BranchOutcome, DiscoveryHandler};
use crate::core::scheduler::{BusMessage, DiscoveryEvent, LoopEvent, Scheduler, TimerTask};

/// Exit code for failures before the pipeline reached `Running`.
pub const EXIT_STARTUP_FAILURE: i32 = 1;

/// Blocking wait per loop iteration in [`LifecycleController::run`].
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why the event loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    EndOfStream,
    Error(String),
    /// Explicit stop request.
    Stopped,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EndOfStream | Self::Stopped => 0,
            Self::Error(_) => 2,
        }
    }
}

/// Discovery tallies since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionStats {
    pub synchronized: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// What `stop()` released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Nodes that reached `Stopped` before release.
    pub stopped_nodes: usize,
    pub released_nodes: usize,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone)]
struct DumpSettings {
    dir: PathBuf,
    delay: Duration,
}

/// Owns the pipeline's run state and the event loop.
///
/// Every topology change happens on the thread calling [`start`](Self::start),
/// [`run`](Self::run) / [`dispatch`](Self::dispatch) and [`stop`](Self::stop).
pub struct LifecycleController {
    pipeline: SharedPipeline,
    handler: Box<dyn DiscoveryHandler>,
    scheduler: Arc<dyn Scheduler>,
    data_plane: Option<Box<dyn DataPlane>>,
    dump: Option<DumpSettings>,
    stats: ProvisionStats,
    report: Option<ShutdownReport>,
}

impl LifecycleController {
    pub fn new(
        pipeline: SharedPipeline,
        handler: Box<dyn DiscoveryHandler>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            pipeline,
            handler,
            scheduler,
            data_plane: None,
            dump: None,
            stats: ProvisionStats::default(),
            report: None,
        }
    }

    pub fn with_data_plane(mut self, data_plane: Box<dyn DataPlane>) -> Self {
        self.data_plane = Some(data_plane);
        self
    }

    /// Write `pipeline_playing.dot` into `dir` once `delay` has passed
    /// after start.
    pub fn with_graph_dump(mut self, dir: PathBuf, delay: Duration) -> Self {
        self.dump = Some(DumpSettings { dir, delay });
        self
    }

    pub fn pipeline(&self) -> &SharedPipeline {
        &self.pipeline
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn state(&self) -> RunState {
        self.pipeline.read().state()
    }

    pub fn stats(&self) -> ProvisionStats {
        self.stats
    }

    pub fn branches(&self) -> Vec<Branch> {
        self.handler.branches()
    }

    /// Move the static graph to `Running` and start the data plane.
    ///
    /// If the data plane cannot start the pipeline is stopped again before
    /// the error is returned.
    pub fn start(&mut self) -> Result<()> {
        {
            let mut pipeline = self.pipeline.write();
            if pipeline.state() != RunState::Idle {
                return Err(StreamError::InvalidState(format!(
                    "cannot start a pipeline that is {}",
                    pipeline.state()
                )));
            }
            if pipeline.node_count() == 0 {
                return Err(StreamError::InvalidState("pipeline has no nodes".into()));
            }
            pipeline.graph().validate()?;
            pipeline.set_state(RunState::Running)?;
        }

        if let Some(dump) = &self.dump {
            self.scheduler
                .post_after(dump.delay, LoopEvent::Timer(TimerTask::DumpGraph));
        }

        if let Some(data_plane) = self.data_plane.as_mut() {
            let ctx = DataPlaneContext {
                pipeline: Arc::clone(&self.pipeline),
                scheduler: Arc::clone(&self.scheduler),
            };
            if let Err(e) = data_plane.start(ctx) {
                tracing::error!("[LifecycleController] Data plane failed to start: {}", e);
                self.stop();
                return Err(e);
            }
        }

        tracing::info!("[LifecycleController] Running");
        Ok(())
    }

    /// Handle one event. Returns the outcome once the loop should end.
    pub fn dispatch(&mut self, event: LoopEvent) -> Option<RunOutcome> {
        match event {
            LoopEvent::OutputDiscovered(discovery) => {
                self.on_output_discovered(&discovery);
                None
            }
            LoopEvent::Bus(BusMessage::EndOfStream) => {
                tracing::info!("[LifecycleController] End of stream");
                Some(RunOutcome::EndOfStream)
            }
            LoopEvent::Bus(BusMessage::StreamEnded { stream_index }) => {
                // Its branch stays in place until global teardown.
                tracing::info!("[LifecycleController] Stream {} ended", stream_index);
                None
            }
            LoopEvent::Bus(BusMessage::Error { source, message }) => {
                tracing::error!("[LifecycleController] Error from {}: {}", source, message);
                Some(RunOutcome::Error(format!("{}: {}", source, message)))
            }
            LoopEvent::Timer(TimerTask::DumpGraph) => {
                self.dump_graph();
                None
            }
            LoopEvent::Quit => {
                tracing::info!("[LifecycleController] Stop requested");
                Some(RunOutcome::Stopped)
            }
        }
    }

    fn on_output_discovered(&mut self, event: &DiscoveryEvent) {
        let mut pipeline = self.pipeline.write();
        if !pipeline.state().is_running() {
            tracing::debug!(
                "[LifecycleController] Ignoring {}.{} while {}",
                event.node,
                event.port,
                pipeline.state()
            );
            return;
        }
        if let Err(e) = pipeline.expose_port(&event.node, &event.port, event.caps.clone()) {
            tracing::warn!(
                "[LifecycleController] Cannot expose {}.{}: {}",
                event.node,
                event.port,
                e
            );
            return;
        }

        match self.handler.on_output_discovered(&mut pipeline, event) {
            BranchOutcome::Synchronized(_) => self.stats.synchronized += 1,
            BranchOutcome::Rejected(_) => self.stats.rejected += 1,
            BranchOutcome::Failed { .. } => self.stats.failed += 1,
        }
    }

    /// Dispatch every ready event without blocking.
    pub fn pump(&mut self) -> Option<RunOutcome> {
        while let Some(event) = self.scheduler.next_event(Duration::ZERO) {
            if let Some(outcome) = self.dispatch(event) {
                return Some(outcome);
            }
        }
        None
    }

    /// Dispatch events until end-of-stream, an error or a stop request.
    pub fn run(&mut self) -> RunOutcome {
        loop {
            if let Some(event) = self.scheduler.next_event(POLL_INTERVAL) {
                if let Some(outcome) = self.dispatch(event) {
                    return outcome;
                }
            }
        }
    }

    /// Drain, stop every node and release the graph. Safe to call again;
    /// later calls return the first report.
    pub fn stop(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        if self.pipeline.read().state() == RunState::Running {
            if let Err(e) = self.pipeline.write().set_state(RunState::Draining) {
                tracing::warn!("[LifecycleController] {}", e);
            }
        }

        // Data threads read the pipeline; never join them under the write lock.
        if let Some(data_plane) = self.data_plane.as_mut() {
            data_plane.stop();
        }

        let mut pipeline = self.pipeline.write();
        if let Err(e) = pipeline.set_state(RunState::Stopped) {
            tracing::warn!("[LifecycleController] {}", e);
        }
        let stopped_nodes = pipeline
            .registry()
            .iter()
            .filter(|n| n.state() == RunState::Stopped)
            .count();
        let branches = self.handler.branches();
        let released_nodes = pipeline.teardown();

        tracing::info!(
            "[LifecycleController] Stopped ({} nodes, {} branches)",
            released_nodes,
            branches.len()
        );
        let report = ShutdownReport {
            stopped_nodes,
            released_nodes,
            branches,
        };
        self.report = Some(report.clone());
        report
    }

    /// Snapshot on the loop thread, write on a helper thread.
    fn dump_graph(&self) {
        let Some(dump) = &self.dump else {
            return;
        };
        let snapshot: GraphSnapshot = self.pipeline.read().snapshot();
        let dir = dump.dir.clone();

        let spawned = std::thread::Builder::new()
            .name("streamfan-dot-dump".into())
            .spawn(move || match snapshot.write_dot(&dir) {
                Ok(path) => {
                    tracing::info!("[LifecycleController] Graph dumped to {}", path.display())
                }
                Err(e) => tracing::debug!("[LifecycleController] Graph dump failed: {}", e),
            });
        if let Err(e) = spawned {
            tracing::debug!("[LifecycleController] Graph dump thread failed: {}", e);
        }
    }
}
