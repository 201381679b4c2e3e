// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::mounts::{MountEntry, MountPoints, RelayDescription};
use crate::core::config::PipelineConfig;
use crate::core::error::{Result, StreamError};

/// Publishes one mount per potential stream slot, before any branch exists.
///
/// Registration consumes the registrar, so it happens exactly once.
#[derive(Debug, Clone)]
pub struct EndpointRegistrar {
    host: String,
    service_port: u16,
    base_port: u16,
    slots: u32,
}

impl EndpointRegistrar {
    pub fn new(host: impl Into<String>, service_port: u16, base_port: u16, slots: u32) -> Self {
        Self {
            host: host.into(),
            service_port,
            base_port,
            slots,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let slots = u32::try_from(config.slot_count())
            .map_err(|_| StreamError::Configuration("too many sources".into()))?;
        Ok(Self::new(
            config.server_host.clone(),
            config.service_port,
            config.base_udp_port,
            slots,
        ))
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("rtsp://{}:{}{}", self.host, self.service_port, path)
    }

    pub fn register_all(self) -> Result<MountPoints> {
        let mut mounts = MountPoints::new();

        for index in 0..self.slots {
            let relay_port = u16::try_from(index)
                .ok()
                .and_then(|i| self.base_port.checked_add(i))
                .ok_or_else(|| {
                    StreamError::Configuration(format!(
                        "relay port for slot {} exceeds 65535",
                        index
                    ))
                })?;
            if relay_port == self.service_port {
                return Err(StreamError::Configuration(format!(
                    "relay port {} collides with the service port",
                    relay_port
                )));
            }

            let entry = MountEntry {
                path: MountEntry::path_for(index),
                relay_port,
                stream_index: index,
                relay: RelayDescription::h264(relay_port),
                shared: true,
            };
            tracing::debug!("[EndpointRegistrar] {} <- {}", entry.path, entry.relay.launch_line());
            let url = self.url_for(&entry.path);
            mounts.add(entry)?;
            tracing::info!("[EndpointRegistrar] RTSP stream ready at {}", url);
        }

        Ok(mounts)
    }
}
