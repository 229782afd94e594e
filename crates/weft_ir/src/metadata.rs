//! Provenance metadata attached to module declarations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional record attached to a module; copied into the manifest and never
/// consulted by the handshake logic.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// A version string for the module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Free-form key/value pairs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub misc: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version string.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a free-form entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.misc.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_entries() {
        let meta = Metadata::new()
            .version("0.1")
            .with("numWriters", 1)
            .with("style", "stupid");
        assert_eq!(meta.version.as_deref(), Some("0.1"));
        assert_eq!(meta.misc["numWriters"], serde_json::json!(1));
        assert_eq!(meta.misc["style"], serde_json::json!("stupid"));
    }

    #[test]
    fn empty_metadata_serializes_empty() {
        let json = serde_json::to_string(&Metadata::new()).unwrap();
        assert_eq!(json, "{}");
    }
}
