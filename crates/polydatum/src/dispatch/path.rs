//! Command path segments.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Leading segment dropped from dotted command strings.
const DAL_PREFIX: &str = "dal";

/// One named hop in a command path, with optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSegment {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, Value>,
}

impl PathSegment {
    /// Creates a segment without metadata.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta: BTreeMap::new(),
        }
    }

    /// Creates a segment carrying `meta`.
    #[must_use]
    pub fn with_meta<I, K>(name: impl Into<String>, meta: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            meta: meta.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        }
    }

    /// Segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment metadata.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Renders `path` as `a.b.c`.
#[must_use]
pub fn dotted(path: &[PathSegment]) -> String {
    path.iter()
        .map(PathSegment::name)
        .collect::<Vec<_>>()
        .join(".")
}

/// Splits `a.b.c` into segments, ignoring a leading `dal.` and empty parts.
#[must_use]
pub fn parse_dotted(path: &str) -> Vec<PathSegment> {
    let mut parts = path.split('.').filter(|part| !part.is_empty()).peekable();
    if parts.peek() == Some(&DAL_PREFIX) {
        parts.next();
    }
    parts.map(PathSegment::new).collect()
}
