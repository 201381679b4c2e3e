// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::node::{NodeOptions, OptionValue};

/// Immutable description of one node to create: type, optional explicit
/// name and options applied right after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: NodeOptions,
}

impl NodeSpec {
    pub fn new(node_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: Some(name.into()),
            options: NodeOptions::new(),
        }
    }

    /// Spec whose name the registry generates.
    pub fn anonymous(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            name: None,
            options: NodeOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.options.set(key, value);
        self
    }

    /// Display label: the explicit name, else the type.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.node_type)
    }
}
