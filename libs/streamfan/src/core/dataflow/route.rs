// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use crate::core::graph::LinkEndpoint;
use crate::core::node::{Node, NodeId, NodeRole};
use crate::core::runtime::Pipeline;

/// Longest chain followed before giving up on a route.
const MAX_HOPS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteSink {
    Udp(SocketAddr),
    File(PathBuf),
    Discard,
}

/// Where a unit entering at some port ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub sink_node: NodeId,
    pub sink: RouteSink,
    /// Every node on the way, the entry node included, is running.
    pub ready: bool,
}

fn sink_of(node: &Node) -> Option<RouteSink> {
    match node.role() {
        NodeRole::NetworkSink => {
            let host = node.option_str("host")?;
            let port = u16::try_from(node.option_u64("port")?).ok()?;
            let addr = (host, port).to_socket_addrs().ok()?.next()?;
            Some(RouteSink::Udp(addr))
        }
        NodeRole::FileSink => node
            .option_str("location")
            .map(|l| RouteSink::File(PathBuf::from(l))),
        _ => Some(RouteSink::Discard),
    }
}

/// Follow links from `entry` to a sink node.
///
/// Splitters forward stream `stream_index` through their `src_{index}`
/// port; every other node through its first linked source port. Returns
/// `None` when the chain is broken or a sink lacks its destination options.
pub fn resolve(pipeline: &Pipeline, entry: &LinkEndpoint, stream_index: u32) -> Option<Route> {
    let graph = pipeline.graph();
    let mut ready = pipeline.node(&entry.node)?.state().is_running();
    let mut at = entry.clone();

    for _ in 0..MAX_HOPS {
        let link = graph.link_from(&at)?;
        let node = pipeline.node(&link.target.node)?;
        ready &= node.state().is_running();

        if node.role().is_sink() {
            return Some(Route {
                sink_node: node.id().clone(),
                sink: sink_of(node)?,
                ready,
            });
        }

        let next = if node.role() == NodeRole::Splitter {
            format!("src_{}", stream_index)
        } else {
            node.src_ports()
                .map(|p| p.name.clone())
                .find(|name| graph.is_linked(&LinkEndpoint::new(node.id().clone(), name.clone())))?
        };
        at = LinkEndpoint::new(node.id().clone(), next);
    }
    None
}
