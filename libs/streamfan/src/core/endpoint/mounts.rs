// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, StreamError};

/// How a mount re-serves the RTP stream arriving on its UDP port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayDescription {
    pub udp_port: u16,
    pub encoding: String,
    pub payload_type: u8,
    pub clock_rate: u32,
}

impl RelayDescription {
    pub fn h264(udp_port: u16) -> Self {
        Self {
            udp_port,
            encoding: "H264".to_string(),
            payload_type: 96,
            clock_rate: 90_000,
        }
    }

    /// Launch line of the relay: receive, depayload, re-payload as `pay0`.
    pub fn launch_line(&self) -> String {
        format!(
            "( udpsrc port={} caps=\"application/x-rtp, media=video, clock-rate={}, encoding-name={}, payload={}\" ! rtph264depay ! rtph264pay name=pay0 )",
            self.udp_port, self.clock_rate, self.encoding, self.payload_type
        )
    }

    /// SDP answer for a DESCRIBE of this mount.
    pub fn sdp(&self, host: &str, path: &str) -> String {
        format!(
            "v=0\r\n\
             o=- 0 0 IN IP4 {host}\r\n\
             s={path}\r\n\
             c=IN IP4 {host}\r\n\
             t=0 0\r\n\
             m=video 0 RTP/AVP {pt}\r\n\
             a=rtpmap:{pt} {enc}/{rate}\r\n\
             a=control:pay0\r\n",
            host = host,
            path = path,
            pt = self.payload_type,
            enc = self.encoding,
            rate = self.clock_rate,
        )
    }
}

/// One published stream path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    pub path: String,
    pub relay_port: u16,
    pub stream_index: u32,
    pub relay: RelayDescription,
    /// All clients share one relay instance.
    pub shared: bool,
}

impl MountEntry {
    pub fn path_for(stream_index: u32) -> String {
        format!("/stream{}", stream_index)
    }
}

/// Mount table. Paths and relay ports are unique.
#[derive(Debug, Clone, Default)]
pub struct MountPoints {
    entries: BTreeMap<String, MountEntry>,
}

impl MountPoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: MountEntry) -> Result<()> {
        if self.entries.contains_key(&entry.path) {
            return Err(StreamError::Configuration(format!(
                "mount path {} registered twice",
                entry.path
            )));
        }
        if let Some(other) = self.by_port(entry.relay_port) {
            return Err(StreamError::Configuration(format!(
                "relay port {} already used by {}",
                entry.relay_port, other.path
            )));
        }
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&MountEntry> {
        self.entries.get(path)
    }

    pub fn by_port(&self, port: u16) -> Option<&MountEntry> {
        self.entries.values().find(|e| e.relay_port == port)
    }

    pub fn by_index(&self, stream_index: u32) -> Option<&MountEntry> {
        self.entries.values().find(|e| e.stream_index == stream_index)
    }

    /// Entries ordered by stream index.
    pub fn entries(&self) -> Vec<&MountEntry> {
        let mut entries: Vec<&MountEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.stream_index);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u32, port: u16) -> MountEntry {
        MountEntry {
            path: MountEntry::path_for(index),
            relay_port: port,
            stream_index: index,
            relay: RelayDescription::h264(port),
            shared: true,
        }
    }

    #[test]
    fn test_launch_line() {
        assert_eq!(
            RelayDescription::h264(5401).launch_line(),
            "( udpsrc port=5401 caps=\"application/x-rtp, media=video, clock-rate=90000, \
             encoding-name=H264, payload=96\" ! rtph264depay ! rtph264pay name=pay0 )"
        );
    }

    #[test]
    fn test_sdp_mentions_payload() {
        let sdp = RelayDescription::h264(5400).sdp("127.0.0.1", "/stream0");
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("m=video 0 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
    }

    #[test]
    fn test_duplicate_path_and_port_rejected() {
        let mut mounts = MountPoints::new();
        mounts.add(entry(0, 5400)).unwrap();
        assert!(mounts.add(entry(0, 5401)).is_err());
        assert!(mounts.add(entry(1, 5400)).is_err());
        mounts.add(entry(1, 5401)).unwrap();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts.by_index(1).unwrap().path, "/stream1");
    }

    #[test]
    fn test_entries_sorted_by_index() {
        let mut mounts = MountPoints::new();
        for i in [10u32, 2, 1] {
            mounts.add(entry(i, 5400 + i as u16)).unwrap();
        }
        let order: Vec<u32> = mounts.entries().iter().map(|e| e.stream_index).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }
}
