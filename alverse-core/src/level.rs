//! Canonical level identifiers (`level_<n>`).
//!
//! The engine, the map and stored score rows all refer to levels in slightly
//! different shapes: bare numbers, digit strings or the canonical id. Everything
//! entering the progression logic goes through [`sanitise_level_id`] first.

use serde_json::Value;

use crate::constants::LEVEL_ID_PREFIX;
use crate::numbers::integral_f64_to_u64;

/// Loosely-typed reference to a level as supplied by a caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelRef<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

impl<'a> From<&'a Value> for LevelRef<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(LevelRef::Missing, LevelRef::Number),
            Value::String(s) => LevelRef::Text(s),
            _ => LevelRef::Missing,
        }
    }
}

impl<'a> From<Option<&'a Value>> for LevelRef<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        value.map_or(LevelRef::Missing, LevelRef::from)
    }
}

impl<'a> From<&'a str> for LevelRef<'a> {
    fn from(value: &'a str) -> Self {
        LevelRef::Text(value)
    }
}

impl From<u32> for LevelRef<'_> {
    fn from(value: u32) -> Self {
        LevelRef::Number(f64::from(value))
    }
}

/// Canonical id for a level number.
#[must_use]
pub fn level_id_for(level_number: u32) -> String {
    format!("{LEVEL_ID_PREFIX}{level_number}")
}

/// Rewrite a level reference into canonical `level_<n>` form.
///
/// Numbers are prefixed, canonical strings pass through, digit-only strings are
/// prefixed. Any other string is returned unchanged. A missing reference is the
/// first level.
#[must_use]
pub fn sanitise_level_id<'a>(level: impl Into<LevelRef<'a>>) -> String {
    match level.into() {
        LevelRef::Number(n) => match integral_f64_to_u64(n) {
            Some(whole) => format!("{LEVEL_ID_PREFIX}{whole}"),
            None => format!("{LEVEL_ID_PREFIX}{n}"),
        },
        LevelRef::Text(text) => {
            if text.starts_with(LEVEL_ID_PREFIX) {
                text.to_string()
            } else if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
                format!("{LEVEL_ID_PREFIX}{text}")
            } else {
                text.to_string()
            }
        }
        LevelRef::Missing => level_id_for(1),
    }
}

/// Parse the level number out of an id using its first run of digits.
///
/// `None` marks an unusable id. It must never count towards the completed set.
#[must_use]
pub fn parse_level_number(level_id: &str) -> Option<u32> {
    let start = level_id.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = level_id[start..]
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    digits.parse().ok()
}
