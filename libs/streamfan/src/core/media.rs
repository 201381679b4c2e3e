// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Media capability descriptors.
//!
//! A [`MediaDescriptor`] is the parsed form of a caps string such as
//! `video/x-raw(memory:NVMM), format=RGBA`. Descriptors are immutable; they
//! are attached to ports and used for link compatibility and for the
//! video/non-video decision when a new output is discovered.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, StreamError};

/// Coarse media kind, derived from the media type prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Other(String),
}

impl MediaKind {
    /// Classify a media type (`video/x-raw`, `audio/mpeg`, ...).
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.starts_with("video") {
            Self::Video
        } else if media_type.starts_with("audio") {
            Self::Audio
        } else {
            let prefix = media_type.split('/').next().unwrap_or(media_type);
            Self::Other(prefix.to_string())
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Immutable capability description of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    media_type: String,
    features: Vec<String>,
    fields: BTreeMap<String, String>,
}

impl MediaDescriptor {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            features: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Raw NVMM video in the given pixel format.
    pub fn nvmm_video(format: &str) -> Self {
        Self::new("video/x-raw")
            .with_feature("memory:NVMM")
            .with_field("format", format)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.media_type)
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl fmt::Display for MediaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media_type)?;
        if !self.features.is_empty() {
            write!(f, "({})", self.features.join(", "))?;
        }
        for (key, value) in &self.fields {
            write!(f, ", {}={}", key, value)?;
        }
        Ok(())
    }
}

impl FromStr for MediaDescriptor {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = split_top_level(s);
        let mut parts = parts.into_iter();

        let head = parts
            .next()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StreamError::InvalidCaps(s.to_string()))?;

        let (media_type, features) = match head.split_once('(') {
            Some((media_type, rest)) => {
                let inner = rest
                    .strip_suffix(')')
                    .ok_or_else(|| StreamError::InvalidCaps(s.to_string()))?;
                let features = inner
                    .split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect();
                (media_type.trim(), features)
            }
            None => (head, Vec::new()),
        };

        if !media_type.contains('/') {
            return Err(StreamError::InvalidCaps(s.to_string()));
        }

        let mut fields = BTreeMap::new();
        for part in parts {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| StreamError::InvalidCaps(s.to_string()))?;
            fields.insert(key.trim().to_string(), normalize_value(value));
        }

        Ok(Self {
            media_type: media_type.to_string(),
            features,
            fields,
        })
    }
}

/// Split on commas that are outside parentheses and quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Drop an explicit `(type)` annotation and surrounding quotes.
fn normalize_value(value: &str) -> String {
    let value = value.trim();
    let value = match value.strip_prefix('(') {
        Some(rest) => rest.split_once(')').map(|(_, v)| v.trim()).unwrap_or(value),
        None => value,
    };
    value.trim_matches('"').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nvmm_caps() {
        let caps: MediaDescriptor = "video/x-raw(memory:NVMM), format=RGBA".parse().unwrap();
        assert_eq!(caps.media_type(), "video/x-raw");
        assert_eq!(caps.features(), &["memory:NVMM".to_string()]);
        assert_eq!(caps.field("format"), Some("RGBA"));
        assert_eq!(caps.kind(), MediaKind::Video);
    }

    #[test]
    fn test_parse_rtp_caps_with_typed_and_quoted_values() {
        let caps: MediaDescriptor =
            "application/x-rtp, media=video, clock-rate=(int)90000, encoding-name=\"H264\""
                .parse()
                .unwrap();
        assert_eq!(caps.kind(), MediaKind::Other("application".into()));
        assert_eq!(caps.field("clock-rate"), Some("90000"));
        assert_eq!(caps.field("encoding-name"), Some("H264"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let caps = MediaDescriptor::nvmm_video("NV12");
        let text = caps.to_string();
        assert_eq!(text, "video/x-raw(memory:NVMM), format=NV12");
        assert_eq!(text.parse::<MediaDescriptor>().unwrap(), caps);
    }

    #[test]
    fn test_kind_classification() {
        assert!(MediaKind::from_media_type("video/x-h264").is_video());
        assert_eq!(MediaKind::from_media_type("audio/mpeg"), MediaKind::Audio);
        assert_eq!(
            MediaKind::from_media_type("text/x-raw"),
            MediaKind::Other("text".into())
        );
    }

    #[test]
    fn test_invalid_caps() {
        assert!("".parse::<MediaDescriptor>().is_err());
        assert!("novideo".parse::<MediaDescriptor>().is_err());
        assert!("video/x-raw, format".parse::<MediaDescriptor>().is_err());
        assert!("video/x-raw(memory:NVMM".parse::<MediaDescriptor>().is_err());
    }
}
