// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Startup configuration, read once and never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, StreamError};

/// Which static layout to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Batched multi-source ingest fanned out into one relayed branch per stream.
    #[default]
    Multistream,
    /// Single source tiled into one encoded file.
    Tiled,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multistream => f.write_str("multistream"),
            Self::Tiled => f.write_str("tiled"),
        }
    }
}

impl FromStr for PipelineMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "multistream" => Ok(Self::Multistream),
            "tiled" => Ok(Self::Tiled),
            other => Err(StreamError::Configuration(format!(
                "unknown mode '{}', expected multistream or tiled",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    /// One URI per stream slot.
    pub sources: Vec<String>,
    /// TCP port of the stream server.
    pub service_port: u16,
    /// Slot `i` relays on `base_udp_port + i`.
    pub base_udp_port: u16,
    pub server_host: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    /// Defaults to the number of sources.
    pub batch_size: Option<u32>,
    pub batched_push_timeout_us: u64,
    pub file_loop: bool,
    pub infer_config_path: String,
    pub dump_dot_dir: Option<PathBuf>,
    pub dump_delay_secs: u64,
    /// Output file of the tiled layout.
    pub output_location: PathBuf,
    /// Media units each simulated source produces before it ends.
    pub frames_per_source: u32,
    pub frame_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Multistream,
            sources: vec!["file:///workspace/data/test.mp4".to_string(); 4],
            service_port: 8554,
            base_udp_port: 5400,
            server_host: "127.0.0.1".to_string(),
            width: 1280,
            height: 720,
            bitrate: 4_000_000,
            batch_size: None,
            batched_push_timeout_us: 400_000,
            file_loop: false,
            infer_config_path: "/workspace/data/multi/config_infer_primary_yolov8.txt".to_string(),
            dump_dot_dir: None,
            dump_delay_secs: 3,
            output_location: PathBuf::from("/workspace/data/output.mp4"),
            frames_per_source: 300,
            frame_interval_ms: 33,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| StreamError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn slot_count(&self) -> usize {
        self.sources.len()
    }

    pub fn effective_batch_size(&self) -> u32 {
        self.batch_size
            .unwrap_or_else(|| u32::try_from(self.sources.len()).unwrap_or(u32::MAX))
    }

    pub fn batched_push_timeout(&self) -> Duration {
        Duration::from_micros(self.batched_push_timeout_us)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn dump_delay(&self) -> Duration {
        Duration::from_secs(self.dump_delay_secs)
    }

    /// Dump directory from the config, else from the environment.
    pub fn resolved_dump_dir(&self) -> Option<PathBuf> {
        self.dump_dot_dir.clone().or_else(|| {
            std::env::var_os(crate::core::graph::DUMP_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
    }

    /// Relay ports `[base_udp_port, base_udp_port + N)`.
    pub fn relay_ports(&self) -> Result<std::ops::Range<u32>> {
        let start = u32::from(self.base_udp_port);
        let end = start + self.sources.len() as u32;
        if end > u32::from(u16::MAX) + 1 {
            return Err(StreamError::Configuration(format!(
                "relay ports {}..{} exceed 65535",
                start, end
            )));
        }
        Ok(start..end)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(StreamError::Configuration(
                "at least one source is required".into(),
            ));
        }
        if let Some(uri) = self.sources.iter().find(|s| s.trim().is_empty()) {
            return Err(StreamError::Configuration(format!("empty source URI '{}'", uri)));
        }
        if self.batch_size == Some(0) {
            return Err(StreamError::Configuration("batch_size must be positive".into()));
        }
        if self.server_host.is_empty() {
            return Err(StreamError::Configuration("server_host is empty".into()));
        }

        if self.mode == PipelineMode::Multistream {
            let ports = self.relay_ports()?;
            if ports.contains(&u32::from(self.service_port)) {
                return Err(StreamError::Configuration(format!(
                    "service port {} collides with relay ports {}..{}",
                    self.service_port, ports.start, ports.end
                )));
            }
        }
        Ok(())
    }
}
