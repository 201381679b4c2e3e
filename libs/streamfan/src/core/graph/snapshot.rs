// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Point-in-time snapshot types for graph observation.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::link::{Link, LinkId};
use crate::core::error::Result;
use crate::core::node::NodeId;
use crate::core::runtime::RunState;

/// File name of the diagnostic dump taken after the pipeline starts.
pub const DUMP_FILE_NAME: &str = "pipeline_playing.dot";

/// Environment variable naming the dump directory when none is configured.
pub const DUMP_DIR_ENV: &str = "STREAMFAN_DEBUG_DUMP_DOT_DIR";

/// Point-in-time snapshot of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub node_type: String,
    pub state: RunState,
    /// Options rendered as `key=value` strings.
    pub options: Vec<String>,
}

/// Point-in-time snapshot of a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSnapshot {
    pub id: LinkId,
    pub source: String,
    pub target: String,
}

impl From<&Link> for LinkSnapshot {
    fn from(link: &Link) -> Self {
        Self {
            id: link.id,
            source: link.from_port(),
            target: link.to_port(),
        }
    }
}

/// Serializable copy of the whole topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub name: String,
    pub state: RunState,
    pub nodes: Vec<NodeSnapshot>,
    pub links: Vec<LinkSnapshot>,
}

impl GraphSnapshot {
    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id.as_str() == id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Render as Graphviz DOT, one cluster-less box per node.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph \"{}\" {{", escape(&self.name));
        let _ = writeln!(dot, "  rankdir=LR;");
        let _ = writeln!(dot, "  label=\"{} [{}]\";", escape(&self.name), self.state);
        let _ = writeln!(dot, "  node [shape=box, style=\"rounded,filled\"];");

        for node in &self.nodes {
            let mut label = format!("{}\\n{}\\n[{}]", node.node_type, node.id, node.state);
            for option in &node.options {
                label.push_str("\\n");
                label.push_str(&escape(option));
            }
            let _ = writeln!(
                dot,
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];",
                escape(node.id.as_str()),
                label,
                state_color(node.state)
            );
        }

        for link in &self.links {
            let (src_node, src_port) = split_address(&link.source);
            let (dst_node, dst_port) = split_address(&link.target);
            let _ = writeln!(
                dot,
                "  \"{}\" -> \"{}\" [taillabel=\"{}\", headlabel=\"{}\"];",
                escape(src_node),
                escape(dst_node),
                escape(src_port),
                escape(dst_port)
            );
        }

        dot.push_str("}\n");
        dot
    }

    /// Write the DOT rendering to `<dir>/pipeline_playing.dot`.
    pub fn write_dot(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DUMP_FILE_NAME);
        std::fs::write(&path, self.to_dot())?;
        Ok(path)
    }
}

fn split_address(address: &str) -> (&str, &str) {
    address.rsplit_once('.').unwrap_or((address, ""))
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn state_color(state: RunState) -> &'static str {
    match state {
        RunState::Idle => "#dddddd",
        RunState::Running => "#aaffaa",
        RunState::Draining => "#ffeeaa",
        RunState::Stopped => "#ffaaaa",
    }
}
