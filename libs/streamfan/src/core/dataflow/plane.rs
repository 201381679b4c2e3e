// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Simulated data plane driving a running pipeline.
//!
//! One thread per input probes its URI, announces the output on the
//! splitter (or on the source itself for single-URI sources) and produces
//! paced media units. A batching thread groups units until the batch is
//! full or the push timeout expires, then routes each unit along the
//! current topology.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::probe::{ProbedSource, probe};
use super::route::{RouteSink, resolve};
use crate::core::config::PipelineConfig;
use crate::core::error::{Result, StreamError};
use crate::core::graph::LinkEndpoint;
use crate::core::media::MediaKind;
use crate::core::node::{NodeId, NodeRole};
use crate::core::runtime::{Pipeline, SharedPipeline};
use crate::core::scheduler::{BusMessage, DiscoveryEvent, LoopEvent, Scheduler};

const DEFAULT_PUSH_TIMEOUT_US: u64 = 400_000;
const RTP_HEADER_LEN: usize = 12;
const UNIT_PAYLOAD_LEN: usize = 1200;
const ROUTE_POLL: Duration = Duration::from_millis(5);

/// What the data plane gets from the controller when the pipeline starts.
pub struct DataPlaneContext {
    pub pipeline: SharedPipeline,
    pub scheduler: Arc<dyn Scheduler>,
}

/// Moves media through a running pipeline.
pub trait DataPlane: Send {
    fn start(&mut self, ctx: DataPlaneContext) -> Result<()>;

    /// Stop producing and join every data thread.
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlaneSettings {
    pub frames_per_source: u32,
    pub frame_interval: Duration,
    /// How long an input waits for its output to be wired before producing.
    pub route_wait: Duration,
}

impl DataPlaneSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            frames_per_source: config.frames_per_source,
            frame_interval: config.frame_interval(),
            route_wait: Duration::from_secs(2),
        }
    }
}

impl Default for DataPlaneSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct DataPlaneStats {
    produced: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    batches: AtomicU64,
}

impl DataPlaneStats {
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct MediaUnit {
    stream_index: u32,
    entry: LinkEndpoint,
    payload: Vec<u8>,
}

/// Per-input work: where to announce the output and where units enter.
#[derive(Debug, Clone)]
struct SlotPlan {
    index: u32,
    uri: String,
    source: NodeId,
    /// Node whose output appears for this input.
    announcer: NodeId,
    batched: bool,
}

impl SlotPlan {
    fn output_port(&self, kind: &MediaKind) -> String {
        match (self.batched, kind) {
            (true, _) => format!("src_{}", self.index),
            (false, MediaKind::Video) => format!("vsrc_{}", self.index),
            (false, _) => format!("asrc_{}", self.index),
        }
    }

    fn entry(&self, output_port: &str) -> LinkEndpoint {
        if self.batched {
            LinkEndpoint::new(self.source.clone(), "src")
        } else {
            LinkEndpoint::new(self.source.clone(), output_port)
        }
    }
}

struct Plan {
    slots: Vec<SlotPlan>,
    file_loop: bool,
    batch_size: usize,
    push_timeout: Duration,
}

fn option_timeout(pipeline: &Pipeline, node: Option<&NodeId>) -> Option<Duration> {
    let us = pipeline.node(node?)?.option_i64("batched-push-timeout")?;
    u64::try_from(us).ok().map(Duration::from_micros)
}

/// Read inputs and batching parameters off the source and batcher nodes.
fn plan(pipeline: &Pipeline) -> Result<Plan> {
    let members = pipeline.graph().members();
    let find = |role: NodeRole| {
        members
            .iter()
            .find(|id| pipeline.node(id).is_some_and(|n| n.role() == role))
            .cloned()
    };

    let (source, batched) = match (find(NodeRole::BatchedSource), find(NodeRole::Source)) {
        (Some(id), _) => (id, true),
        (None, Some(id)) => (id, false),
        (None, None) => return Err(StreamError::Runtime("pipeline has no source node".into())),
    };
    let source_node = pipeline
        .node(&source)
        .ok_or_else(|| StreamError::NodeNotFound(source.to_string()))?;
    let file_loop = source_node.option_bool("file-loop").unwrap_or(false);

    let (uris, announcer, batcher): (Vec<String>, NodeId, Option<NodeId>) = if batched {
        let uris = source_node
            .option_str("uri-list")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();
        let splitter = find(NodeRole::Splitter).ok_or_else(|| {
            StreamError::Runtime(format!("{} has no splitter downstream", source))
        })?;
        (uris, splitter, Some(source.clone()))
    } else {
        let uris = source_node.option_str("uri").map(String::from).into_iter().collect();
        (uris, source.clone(), find(NodeRole::Batcher))
    };

    if uris.is_empty() {
        return Err(StreamError::Runtime(format!("{} has no input URI", source)));
    }

    let batch_size = batcher
        .as_ref()
        .and_then(|id| pipeline.node(id))
        .and_then(|n| n.option_u64("max-batch-size").or_else(|| n.option_u64("batch-size")))
        .and_then(|b| usize::try_from(b).ok())
        .filter(|b| *b > 0)
        .unwrap_or(uris.len());
    let push_timeout = option_timeout(pipeline, batcher.as_ref())
        .unwrap_or(Duration::from_micros(DEFAULT_PUSH_TIMEOUT_US));

    let slots = uris
        .into_iter()
        .enumerate()
        .map(|(i, uri)| SlotPlan {
            index: i as u32,
            uri,
            source: source.clone(),
            announcer: announcer.clone(),
            batched,
        })
        .collect();

    Ok(Plan {
        slots,
        file_loop,
        batch_size,
        push_timeout,
    })
}

/// Data plane for URI-driven sources.
pub struct UriDataPlane {
    settings: DataPlaneSettings,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    stats: Arc<DataPlaneStats>,
}

impl UriDataPlane {
    pub fn new(settings: DataPlaneSettings) -> Self {
        Self {
            settings,
            stop: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            stats: Arc::new(DataPlaneStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DataPlaneStats> {
        Arc::clone(&self.stats)
    }

    fn spawn(&mut self, name: String, f: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = std::thread::Builder::new().name(name).spawn(f)?;
        self.threads.push(handle);
        Ok(())
    }
}

impl DataPlane for UriDataPlane {
    fn start(&mut self, ctx: DataPlaneContext) -> Result<()> {
        let plan = plan(&ctx.pipeline.read())?;
        tracing::info!(
            "[DataPlane] Starting {} inputs (batch {}, timeout {:?})",
            plan.slots.len(),
            plan.batch_size,
            plan.push_timeout
        );

        let capacity = plan.batch_size.saturating_mul(4).clamp(4, 4096);
        let (tx, rx) = crossbeam_channel::bounded::<MediaUnit>(capacity);

        for slot in plan.slots {
            let worker = SlotWorker {
                slot,
                settings: self.settings.clone(),
                file_loop: plan.file_loop,
                pipeline: Arc::clone(&ctx.pipeline),
                scheduler: Arc::clone(&ctx.scheduler),
                stop: Arc::clone(&self.stop),
                stats: Arc::clone(&self.stats),
                tx: tx.clone(),
            };
            self.spawn(format!("streamfan-input-{}", worker.slot.index), move || {
                worker.run()
            })?;
        }
        drop(tx);

        let batcher = Batcher {
            rx,
            batch_size: plan.batch_size,
            push_timeout: plan.push_timeout,
            pipeline: ctx.pipeline,
            scheduler: ctx.scheduler,
            stop: Arc::clone(&self.stop),
            stats: Arc::clone(&self.stats),
            files: HashMap::new(),
        };
        self.spawn("streamfan-batcher".to_string(), move || batcher.run())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("[DataPlane] A data thread panicked");
            }
        }
        tracing::debug!(
            "[DataPlane] Stopped: {} produced, {} delivered, {} dropped",
            self.stats.produced(),
            self.stats.delivered(),
            self.stats.dropped()
        );
    }
}

impl Drop for UriDataPlane {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

struct SlotWorker {
    slot: SlotPlan,
    settings: DataPlaneSettings,
    file_loop: bool,
    pipeline: SharedPipeline,
    scheduler: Arc<dyn Scheduler>,
    stop: Arc<AtomicBool>,
    stats: Arc<DataPlaneStats>,
    tx: Sender<MediaUnit>,
}

impl SlotWorker {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run(self) {
        let probed = match probe(&self.slot.uri) {
            Ok(probed) => probed,
            Err(e) => {
                tracing::error!("[DataPlane] Input {} failed: {}", self.slot.index, e);
                self.scheduler.post(LoopEvent::Bus(BusMessage::Error {
                    source: self.slot.source.to_string(),
                    message: e.to_string(),
                }));
                return;
            }
        };

        let port = self.slot.output_port(&probed.kind());
        self.scheduler.post(LoopEvent::OutputDiscovered(
            DiscoveryEvent::new(self.slot.announcer.clone(), port.as_str())
                .with_caps(probed.caps.clone()),
        ));

        let entry = self.slot.entry(&port);
        self.wait_for_route(&entry);
        self.produce(&probed, entry);

        if !self.stopped() {
            self.scheduler.post(LoopEvent::Bus(BusMessage::StreamEnded {
                stream_index: self.slot.index,
            }));
        }
    }

    /// Block until this input's units can reach a running sink, the wait
    /// bound passes or the plane stops.
    fn wait_for_route(&self, entry: &LinkEndpoint) {
        let deadline = Instant::now() + self.settings.route_wait;
        while !self.stopped() && Instant::now() < deadline {
            let ready = resolve(&self.pipeline.read(), entry, self.slot.index)
                .is_some_and(|route| route.ready);
            if ready {
                return;
            }
            std::thread::sleep(ROUTE_POLL);
        }
        tracing::debug!(
            "[DataPlane] Input {} has no running route, producing anyway",
            self.slot.index
        );
    }

    fn produce(&self, probed: &ProbedSource, entry: LinkEndpoint) {
        let mut sequence: u32 = 0;
        while !self.stopped() && (self.file_loop || sequence < self.settings.frames_per_source) {
            let unit = MediaUnit {
                stream_index: self.slot.index,
                entry: entry.clone(),
                payload: unit_payload(self.slot.index, sequence, &probed.content),
            };
            if self.tx.send(unit).is_err() {
                return;
            }
            self.stats.produced.fetch_add(1, Ordering::Relaxed);
            sequence = sequence.wrapping_add(1);
            std::thread::sleep(self.settings.frame_interval);
        }
    }
}

/// RTP-style header followed by a window of the input content.
fn unit_payload(stream_index: u32, sequence: u32, content: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(RTP_HEADER_LEN + UNIT_PAYLOAD_LEN);
    payload.push(0x80);
    payload.push(96);
    payload.extend_from_slice(&(sequence as u16).to_be_bytes());
    payload.extend_from_slice(&sequence.wrapping_mul(3000).to_be_bytes());
    payload.extend_from_slice(&stream_index.to_be_bytes());

    if content.is_empty() {
        payload.resize(RTP_HEADER_LEN + 188, 0);
    } else {
        let start = (sequence as usize * UNIT_PAYLOAD_LEN) % content.len();
        let end = (start + UNIT_PAYLOAD_LEN).min(content.len());
        payload.extend_from_slice(&content[start..end]);
    }
    payload
}

struct Batcher {
    rx: Receiver<MediaUnit>,
    batch_size: usize,
    push_timeout: Duration,
    pipeline: SharedPipeline,
    scheduler: Arc<dyn Scheduler>,
    stop: Arc<AtomicBool>,
    stats: Arc<DataPlaneStats>,
    files: HashMap<PathBuf, File>,
}

impl Batcher {
    fn run(mut self) {
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(socket) => socket,
            Err(e) => {
                self.scheduler.post(LoopEvent::Bus(BusMessage::Error {
                    source: "batcher".to_string(),
                    message: format!("cannot open send socket: {}", e),
                }));
                return;
            }
        };

        let mut open = true;
        while open && !self.stop.load(Ordering::Acquire) {
            let (batch, still_open) = self.collect();
            open = still_open;
            if !batch.is_empty() {
                self.stats.batches.fetch_add(1, Ordering::Relaxed);
                self.push(&socket, batch);
            }
        }

        if !self.stop.load(Ordering::Acquire) {
            tracing::info!("[DataPlane] All inputs exhausted");
            self.scheduler.post(LoopEvent::Bus(BusMessage::EndOfStream));
        }
    }

    /// Gather up to `batch_size` units. The push timeout starts with the
    /// first unit of the batch. Returns `false` once every input has gone.
    fn collect(&self) -> (Vec<MediaUnit>, bool) {
        let mut batch = Vec::with_capacity(self.batch_size.min(1024));

        let first = match self.rx.recv_timeout(self.push_timeout) {
            Ok(unit) => unit,
            Err(RecvTimeoutError::Timeout) => return (batch, true),
            Err(RecvTimeoutError::Disconnected) => return (batch, false),
        };
        batch.push(first);

        let deadline = Instant::now() + self.push_timeout;
        while batch.len() < self.batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(unit) => batch.push(unit),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return (batch, false),
            }
        }
        (batch, true)
    }

    fn push(&mut self, socket: &UdpSocket, batch: Vec<MediaUnit>) {
        let routes: Vec<_> = {
            let pipeline = self.pipeline.read();
            batch
                .iter()
                .map(|unit| resolve(&pipeline, &unit.entry, unit.stream_index))
                .collect()
        };

        for (unit, route) in batch.into_iter().zip(routes) {
            let delivered = match route {
                Some(route) if route.ready => self.deliver(socket, &route.sink, &unit.payload),
                _ => false,
            };
            let counter = if delivered {
                &self.stats.delivered
            } else {
                &self.stats.dropped
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn deliver(&mut self, socket: &UdpSocket, sink: &RouteSink, payload: &[u8]) -> bool {
        match sink {
            RouteSink::Udp(addr) => match socket.send_to(payload, addr) {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!("[DataPlane] Send to {} failed: {}", addr, e);
                    false
                }
            },
            RouteSink::File(path) => {
                if !self.files.contains_key(path) {
                    match OpenOptions::new().create(true).append(true).open(path) {
                        Ok(file) => {
                            self.files.insert(path.clone(), file);
                        }
                        Err(e) => {
                            tracing::warn!("[DataPlane] Cannot open {}: {}", path.display(), e);
                            return false;
                        }
                    }
                }
                self.files
                    .get_mut(path)
                    .is_some_and(|file| file.write_all(payload).is_ok())
            }
            RouteSink::Discard => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{NodeSpec, StaticGraphBuilder};
    use crate::core::node::NodeCatalog;

    #[test]
    fn test_unit_payload_header() {
        let payload = unit_payload(3, 7, b"abcdef");
        assert_eq!(payload[0], 0x80);
        assert_eq!(payload[1], 96);
        assert_eq!(&payload[2..4], &7u16.to_be_bytes());
        assert_eq!(&payload[8..12], &3u32.to_be_bytes());
        assert_eq!(&payload[12..], b"abcdef");

        assert_eq!(unit_payload(0, 0, &[]).len(), RTP_HEADER_LEN + 188);
    }

    #[test]
    fn test_plan_reads_batched_source() {
        let mut p = Pipeline::new("plan", Arc::new(NodeCatalog::builtin()));
        StaticGraphBuilder::new(vec![
            NodeSpec::new("nvmultiurisrcbin", "source")
                .with_option("uri-list", "videotestsrc://, audiotestsrc://")
                .with_option("max-batch-size", 2u32)
                .with_option("batched-push-timeout", 1000i64),
            NodeSpec::new("nvstreamdemux", "demux"),
        ])
        .build(&mut p)
        .unwrap();

        let plan = plan(&p).unwrap();
        assert_eq!(plan.slots.len(), 2);
        assert_eq!(plan.batch_size, 2);
        assert_eq!(plan.push_timeout, Duration::from_millis(1));
        assert_eq!(plan.slots[1].uri, "audiotestsrc://");
        assert_eq!(plan.slots[1].announcer, NodeId::from("demux"));
        assert_eq!(plan.slots[1].output_port(&MediaKind::Audio), "src_1");
    }

    #[test]
    fn test_plan_single_source_announces_on_itself() {
        let mut p = Pipeline::new("plan", Arc::new(NodeCatalog::builtin()));
        p.create_node(&NodeSpec::new("nvurisrcbin", "source").with_option("uri", "videotestsrc://"))
            .unwrap();

        let plan = plan(&p).unwrap();
        let slot = &plan.slots[0];
        assert_eq!(slot.announcer, NodeId::from("source"));
        assert_eq!(slot.output_port(&MediaKind::Video), "vsrc_0");
        assert_eq!(slot.entry("vsrc_0"), LinkEndpoint::new("source", "vsrc_0"));
        assert_eq!(plan.push_timeout, Duration::from_micros(DEFAULT_PUSH_TIMEOUT_US));
    }

    #[test]
    fn test_plan_without_source_fails() {
        let p = Pipeline::new("plan", Arc::new(NodeCatalog::builtin()));
        assert!(plan(&p).is_err());
    }
}
