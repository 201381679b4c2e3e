// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::spec::NodeSpec;
use crate::core::error::{Result, StreamError};

/// Ordered node chain instantiated once per discovered stream.
///
/// The last node is the network sink; each instance gets its own relay
/// port `base_port + index` on `host`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTemplate {
    nodes: Vec<NodeSpec>,
    base_port: u16,
    host: String,
}

impl BranchTemplate {
    pub fn new(nodes: Vec<NodeSpec>, base_port: u16, host: impl Into<String>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(StreamError::Configuration(
                "branch template needs at least one node".into(),
            ));
        }
        Ok(Self {
            nodes,
            base_port,
            host: host.into(),
        })
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    /// Number of nodes one branch adds to the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Relay port for stream `index`.
    pub fn relay_port(&self, index: u32) -> Result<u16> {
        u16::try_from(index)
            .ok()
            .and_then(|i| self.base_port.checked_add(i))
            .ok_or_else(|| {
                StreamError::Configuration(format!(
                    "relay port {} + {} exceeds 65535",
                    self.base_port, index
                ))
            })
    }

    /// Concrete node specs for stream `index`: every name gets an `_{index}`
    /// suffix and the sink is pointed at the stream's relay port.
    pub fn instantiate(&self, index: u32) -> Result<Vec<NodeSpec>> {
        let port = self.relay_port(index)?;
        let last = self.nodes.len() - 1;

        Ok(self
            .nodes
            .iter()
            .enumerate()
            .map(|(pos, spec)| {
                let mut spec = spec.clone();
                spec.name = Some(format!("{}_{}", spec.label(), index));
                if pos == last {
                    spec = spec
                        .with_option("host", self.host.as_str())
                        .with_option("port", port);
                }
                spec
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(base: u16) -> BranchTemplate {
        BranchTemplate::new(
            vec![
                NodeSpec::new("queue", "queue"),
                NodeSpec::anonymous("udpsink").with_option("sync", true),
            ],
            base,
            "127.0.0.1",
        )
        .unwrap()
    }

    #[test]
    fn test_instantiate_suffixes_names_and_sets_port() {
        let specs = template(5400).instantiate(3).unwrap();
        assert_eq!(specs[0].name.as_deref(), Some("queue_3"));
        assert_eq!(specs[1].name.as_deref(), Some("udpsink_3"));
        let opts = &specs[1].options;
        assert_eq!(opts.get("port").and_then(|v| v.as_u64()), Some(5403));
        assert_eq!(opts.get("host").and_then(|v| v.as_str()), Some("127.0.0.1"));
        assert_eq!(opts.get("sync").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_port_overflow_is_configuration_error() {
        let t = template(65530);
        assert_eq!(t.relay_port(5).unwrap(), 65535);
        assert!(matches!(t.instantiate(6), Err(StreamError::Configuration(_))));
        assert!(t.relay_port(u32::MAX).is_err());
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(BranchTemplate::new(Vec::new(), 5400, "127.0.0.1").is_err());
    }
}
