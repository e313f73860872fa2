use serde::{Deserialize, Serialize};

use super::{CacheError, Result};

/// A single persisted compilation result
///
/// Stored as a JSON blob under `entries/`, named by the content hash so
/// replacement is atomic (write to temp, rename over).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskCacheEntry {
    /// Truncated content hash of the preprocessed source this entry
    /// was produced from
    pub content_hash: String,

    /// Finalized module code
    pub code: String,

    /// Optional source map
    pub map: Option<String>,

    /// Unix timestamp when the entry was written
    pub timestamp: u64,
}

impl DiskCacheEntry {
    pub fn new(content_hash: String, code: String, map: Option<String>) -> Self {
        Self {
            content_hash,
            code,
            map,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(CacheError::from)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(CacheError::from)
    }
}
