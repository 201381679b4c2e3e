// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::media::MediaDescriptor;

/// A single configuration value applied to a node option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(String),
    Caps(MediaDescriptor),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_caps(&self) -> Option<&MediaDescriptor> {
        match self {
            Self::Caps(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "\"{}\"", v),
            Self::Caps(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u16> for OptionValue {
    fn from(v: u16) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<u32> for OptionValue {
    fn from(v: u32) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<u64> for OptionValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<usize> for OptionValue {
    fn from(v: usize) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<MediaDescriptor> for OptionValue {
    fn from(v: MediaDescriptor) -> Self {
        Self::Caps(v)
    }
}

/// Declared kind of a node option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Bool,
    Int,
    Uint,
    Str,
    Caps,
}

impl OptionKind {
    /// Convert `value` to this kind, or `None` when it cannot represent it.
    ///
    /// Integer 0/1 is accepted for booleans, non-negative integers for
    /// unsigned options and caps strings for capability options.
    pub fn coerce(self, value: &OptionValue) -> Option<OptionValue> {
        match (self, value) {
            (Self::Bool, OptionValue::Bool(_)) => Some(value.clone()),
            (Self::Bool, OptionValue::Int(v @ (0 | 1))) => Some(OptionValue::Bool(*v == 1)),
            (Self::Bool, OptionValue::Uint(v @ (0 | 1))) => Some(OptionValue::Bool(*v == 1)),
            (Self::Int, _) => value.as_i64().map(OptionValue::Int),
            (Self::Uint, _) => value.as_u64().map(OptionValue::Uint),
            (Self::Str, OptionValue::Str(_)) => Some(value.clone()),
            (Self::Caps, OptionValue::Caps(_)) => Some(value.clone()),
            (Self::Caps, OptionValue::Str(s)) => s.parse().ok().map(OptionValue::Caps),
            _ => None,
        }
    }
}

/// Ordered set of options applied to a node right after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOptions(BTreeMap<String, OptionValue>);

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_accepts_int_flags() {
        assert_eq!(
            OptionKind::Bool.coerce(&OptionValue::Int(1)),
            Some(OptionValue::Bool(true))
        );
        assert_eq!(
            OptionKind::Bool.coerce(&OptionValue::Int(0)),
            Some(OptionValue::Bool(false))
        );
        assert_eq!(OptionKind::Bool.coerce(&OptionValue::Int(2)), None);
    }

    #[test]
    fn test_uint_rejects_negative() {
        assert_eq!(OptionKind::Uint.coerce(&OptionValue::Int(-1)), None);
        assert_eq!(
            OptionKind::Uint.coerce(&OptionValue::Int(4_000_000)),
            Some(OptionValue::Uint(4_000_000))
        );
    }

    #[test]
    fn test_caps_parses_strings() {
        let coerced = OptionKind::Caps
            .coerce(&OptionValue::from("video/x-raw(memory:NVMM), format=NV12"))
            .unwrap();
        assert_eq!(
            coerced.as_caps().and_then(|c| c.field("format")),
            Some("NV12")
        );
        assert_eq!(OptionKind::Caps.coerce(&OptionValue::from("garbage")), None);
    }

    #[test]
    fn test_str_does_not_accept_numbers() {
        assert_eq!(OptionKind::Str.coerce(&OptionValue::Int(5)), None);
    }
}
