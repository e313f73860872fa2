use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{CacheError, Result, CACHE_VERSION};

/// Cache manifest: the index of all persisted entries
///
/// Keys are absolute source paths (stored as strings so the manifest is
/// portable JSON). Serialized with stable key ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Schema version for the cache format
    pub version: u32,

    /// Source path -> record
    pub entries: IndexMap<String, ManifestRecord>,
}

/// Index record for a single cached file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Truncated content hash of the preprocessed source
    pub hash: String,

    /// Unix timestamp when the entry was written (for diagnostics)
    pub timestamp: u64,
}

impl CacheManifest {
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: IndexMap::new(),
        }
    }

    pub fn is_version_compatible(&self) -> bool {
        self.version == CACHE_VERSION
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CacheError::from)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(CacheError::from)
    }

    pub fn get(&self, path: &str) -> Option<&ManifestRecord> {
        self.entries.get(path)
    }

    pub fn insert(&mut self, path: String, hash: String) {
        self.entries.insert(path, ManifestRecord::new(hash));
    }

    pub fn remove(&mut self, path: &str) -> Option<ManifestRecord> {
        self.entries.shift_remove(path)
    }

    /// Whether any remaining entry references the given content hash.
    /// Entry blobs are content-addressed and may be shared by several
    /// paths with identical content.
    pub fn references_hash(&self, hash: &str) -> bool {
        self.entries.values().any(|r| r.hash == hash)
    }
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRecord {
    pub fn new(hash: String) -> Self {
        Self {
            hash,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}
