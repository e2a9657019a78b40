//! Stream metadata
//!
//! Metadata is sent exactly once per stream, inside the `Open` message and
//! before any data. Keys are case-insensitive and stored lowercase; a key may
//! carry several values.

use serde::{Deserialize, Serialize};

/// Metadata key carrying the target `host:port` of a tunnel stream
pub const ADDR_KEY: &str = "addr";

/// Ordered multi-map of metadata entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(Vec<(String, String)>);

impl Metadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Metadata for a tunnel stream targeting `addr`
    pub fn with_addr(addr: impl Into<String>) -> Self {
        let mut md = Self::new();
        md.append(ADDR_KEY, addr);
        md
    }

    /// Append a value for a key, keeping any existing values
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.0.push((key.to_ascii_lowercase(), value.into()));
    }

    /// All values stored for a key, in insertion order
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        let key = key.to_ascii_lowercase();
        self.0
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut md = Self::new();
        for (k, v) in iter {
            md.append(&k, v);
        }
        md
    }
}
