//! Named collection registry.
//!
//! Maps a short name to a collection URI and persists the mapping as a JSON
//! object, e.g. `~/.kvlite/registry.json`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KVError;
use crate::uri::parse_uri;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    entries: BTreeMap<String, String>,
}

impl Registry {
    /// Load a registry from disk, or return an empty one if the file
    /// doesn't exist.
    pub fn load(path: &Path) -> Result<Self, KVError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| KVError::Storage(format!("read {}: {}", path.display(), e)))?;
        let registry: Registry = serde_json::from_str(&content)
            .map_err(|e| KVError::Serialization(format!("{}: {}", path.display(), e)))?;
        debug!("Registry: loaded {} entries from {:?}", registry.len(), path);
        Ok(registry)
    }

    /// Write the registry as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), KVError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KVError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KVError::Serialization(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| KVError::Storage(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Add or replace an entry. The URI must parse and name a collection.
    pub fn insert(&mut self, name: &str, uri: &str) -> Result<(), KVError> {
        parse_uri(uri)?.require_collection()?;
        self.entries.insert(name.to_string(), uri.to_string());
        Ok(())
    }

    /// Remove an entry, returning its URI.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Import every entry of `other`, overwriting on name clashes. Returns
    /// the number of entries imported.
    pub fn merge(&mut self, other: Registry) -> usize {
        let n = other.entries.len();
        self.entries.extend(other.entries);
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
