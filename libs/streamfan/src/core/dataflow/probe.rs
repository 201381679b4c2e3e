// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Input probing: decide what an URI carries before any data flows.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::core::error::{Result, StreamError};
use crate::core::media::{MediaDescriptor, MediaKind};

const VIDEO_TEST_URI: &str = "videotestsrc://";
const AUDIO_TEST_URI: &str = "audiotestsrc://";

/// Upper bound of input bytes kept for payload generation.
const MAX_PROBE_BYTES: u64 = 1 << 20;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "h264", "h265", "avi", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "aac", "flac", "ogg", "opus"];

/// Result of probing one input.
#[derive(Debug, Clone)]
pub struct ProbedSource {
    pub uri: String,
    pub caps: MediaDescriptor,
    /// Bytes cycled through to fill media units.
    pub content: Arc<Vec<u8>>,
}

impl ProbedSource {
    pub fn kind(&self) -> MediaKind {
        self.caps.kind()
    }
}

fn caps_for(kind: &MediaKind) -> MediaDescriptor {
    match kind {
        MediaKind::Video => MediaDescriptor::nvmm_video("NV12"),
        MediaKind::Audio => MediaDescriptor::new("audio/x-raw")
            .with_field("format", "S16LE")
            .with_field("rate", "48000"),
        MediaKind::Other(top_level) => {
            MediaDescriptor::new(format!("{}/octet-stream", top_level))
        }
    }
}

fn kind_from_extension(path: &Path) -> MediaKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Other("application".to_string())
    }
}

fn test_pattern() -> Arc<Vec<u8>> {
    Arc::new((0..4096u32).map(|i| (i % 251) as u8).collect())
}

/// Probe `uri`. `file://` inputs must exist and be readable.
pub fn probe(uri: &str) -> Result<ProbedSource> {
    if uri.starts_with(VIDEO_TEST_URI) || uri.starts_with(AUDIO_TEST_URI) {
        let kind = if uri.starts_with(VIDEO_TEST_URI) {
            MediaKind::Video
        } else {
            MediaKind::Audio
        };
        return Ok(ProbedSource {
            uri: uri.to_string(),
            caps: caps_for(&kind),
            content: test_pattern(),
        });
    }

    let Some(path) = uri.strip_prefix("file://") else {
        return Err(StreamError::Runtime(format!("unsupported URI '{}'", uri)));
    };
    let path = Path::new(path);

    let mut content = Vec::new();
    File::open(path)
        .and_then(|f| f.take(MAX_PROBE_BYTES).read_to_end(&mut content))
        .map_err(|e| StreamError::Runtime(format!("cannot open {}: {}", uri, e)))?;

    let kind = kind_from_extension(path);
    tracing::debug!("[Probe] {} -> {} ({} bytes)", uri, kind, content.len());
    Ok(ProbedSource {
        uri: uri.to_string(),
        caps: caps_for(&kind),
        content: Arc::new(content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_pseudo_uris() {
        assert_eq!(probe("videotestsrc://").unwrap().kind(), MediaKind::Video);
        assert_eq!(probe("audiotestsrc://").unwrap().kind(), MediaKind::Audio);
    }

    #[test]
    fn test_file_kind_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for (name, kind) in [
            ("clip.MP4", MediaKind::Video),
            ("tone.wav", MediaKind::Audio),
            ("notes.txt", MediaKind::Other("application".into())),
        ] {
            let path = dir.path().join(name);
            File::create(&path).unwrap().write_all(b"data").unwrap();
            let probed = probe(&format!("file://{}", path.display())).unwrap();
            assert_eq!(probed.kind(), kind, "{}", name);
            assert_eq!(kind_from_extension(&path), kind, "{}", name);
            assert_eq!(probed.content.as_slice(), b"data");
        }
    }

    #[test]
    fn test_missing_file_and_unknown_scheme() {
        assert!(probe("file:///definitely/not/here.mp4").is_err());
        assert!(probe("rtsp://camera/stream").is_err());
    }
}
